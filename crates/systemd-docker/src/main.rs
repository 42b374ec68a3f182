use systemd_docker_core::errors::ProxyError;

mod cli;

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();

    if let Err(err) = cli::dispatch(argv).await {
        let usage = matches!(
            err.downcast_ref::<ProxyError>(),
            Some(ProxyError::Usage { .. })
        );

        // Logging may not be up yet when own flags failed to parse.
        if systemd_docker_core::logging::is_initialized() {
            tracing::error!("{:#}", err);
        } else {
            eprintln!("Error: {:#}", err);
        }

        // Exit code 2 for malformed invocations
        std::process::exit(if usage { 2 } else { 1 });
    }
}
