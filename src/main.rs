mod config;
mod error;
mod layout;
mod matcher;
mod picker;
mod receipt;
mod report;
mod search;
mod spreadsheet;
mod transaction;

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Match payment receipts (PDF) against spreadsheet rows and flag what was found.
#[derive(Parser, Debug)]
#[command(name = "receipt-matcher", version)]
struct Cli {
    /// Spreadsheet with the transactions; a file dialog opens when omitted
    #[arg(short, long)]
    spreadsheet: Option<PathBuf>,

    /// Base folder holding the receipt PDFs; a folder dialog opens when omitted
    #[arg(short, long)]
    base: Option<PathBuf>,

    /// TOML config (defaults to .config/receipt_matcher.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write a JSON report of every processed row
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = config::Config::load_or_default(cli.config.as_deref())?;

    let Some(spreadsheet) = cli.spreadsheet.or_else(picker::pick_spreadsheet) else {
        println!("No spreadsheet selected. Exiting.");
        return Ok(());
    };
    let Some(base) = cli.base.or_else(picker::pick_base_folder) else {
        println!("No base folder selected. Exiting.");
        return Ok(());
    };
    info!(spreadsheet = %spreadsheet.display(), base = %base.display(), "Inputs selected");

    let summary = match matcher::Matcher::new(&cfg, &spreadsheet, &base).and_then(|m| m.run()) {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Run aborted");
            return Err(e.into());
        }
    };

    println!("\n{summary}");
    if let Some(path) = cli.report {
        summary.write_json(&path)?;
        info!(path = %path.display(), "JSON report written");
    }

    Ok(())
}
