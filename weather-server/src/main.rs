//! Binary crate for the `weather-server` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Running the HTTP server or a one-off lookup

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    weather_server::logging::init_tracing(cmd.log_json);
    cmd.run().await
}
