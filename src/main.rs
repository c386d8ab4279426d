use std::process;

use cypherqa_cli::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
