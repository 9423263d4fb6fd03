mod buildjob;
mod cli;
mod config;
mod error;
mod http;
mod output;
mod service;
mod stages;
mod timestamp;
mod travis;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting buildtrend");
    cli.execute().await?;

    Ok(())
}
