mod fetch;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::fetch::FetchArgs;

#[derive(Debug, Parser)]
#[command(name = "crawlkit-cli")]
#[command(about = "Dispatch HTTP requests through the crawl proxy fleet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch a URL and print the response with its redirect chain
    Fetch(FetchArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("crawlkit-cli: no command given, see --help");
        return Ok(());
    };

    let config = crawlkit_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match command {
        Commands::Fetch(args) => fetch::run_fetch(&config, &args).await,
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
