use clap::Parser;
use tracing_subscriber::EnvFilter;

use embedding_jobs::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // -v forces debug output; otherwise honor RUST_LOG and stay quiet by default
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::dispatch(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
