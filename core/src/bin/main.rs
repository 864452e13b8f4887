/// Tempo CLI
///
/// Evaluates reactive programs given as JSON syntax trees and feeds their
/// streams from scripted pushes or a live timer.

use tempo_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
