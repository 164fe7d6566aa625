//! lexpipe CLI — legislative obligation processing pipeline.
//!
//! Ingests jurisdiction legal-text feeds, extracts structured obligations
//! through a text-completion service, validates and publishes them.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
