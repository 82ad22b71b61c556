/// Aria Global CLI
///
/// Administrative commands over serialized run-state documents, usable
/// without a driver or provider configured.
use aria_core::cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
