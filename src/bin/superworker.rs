/// Superworker CLI
///
/// Checks definition files, compiles superworkers into record tables, and
/// drains them with a simulated dispatcher.

use superworker_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
