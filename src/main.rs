use api_console_bridge::application::{config::Args, startup};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(error) = startup::run(args).await {
        error!("bridge session failed: {error}");
        eprintln!("api-console-bridge: {error}");
        std::process::exit(1);
    }
}
