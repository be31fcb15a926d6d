//! IncidentQA CLI: answer incident questions from logs and runbooks.
//!
//! Extracts signals from a question, searches Splunk for matching errors,
//! pulls the related Confluence pages, and asks the completion service for
//! grounded remediation steps.

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
