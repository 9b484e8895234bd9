// ABOUTME: Entry point for the parley-serve binary.
// ABOUTME: Loads config, initializes logging, runs the HTTP server.

use anyhow::Result;
use clap::Parser;
use parley_core::Config;

#[derive(Parser)]
#[command(name = "parley-serve")]
#[command(about = "Chat-bot orchestration server for Slack and direct HTTP chat")]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    parley_log::init_for("parley_serve");

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    parley_serve::server::run(config).await
}
