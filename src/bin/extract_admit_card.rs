//! Print the student details found in admit card files as JSON.
//!
//! `.txt` files are read as already extracted text, everything else as a PDF.
//! Useful for checking the field rules against a real card without the bot.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use admit_card_bot::text_processing::StudentRecordExtractor;

#[derive(Parser, Debug)]
#[command(
    name = "extract_admit_card",
    about = "Print the student details found in admit card PDFs as JSON"
)]
struct Cli {
    /// Admit card PDFs, or `.txt` files holding their extracted text
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print one compact JSON line per file instead of a pretty array
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let extractor = StudentRecordExtractor::new();
    let mut results = Vec::with_capacity(cli.files.len());

    for path in &cli.files {
        let record = if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("txt")) {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            extractor.extract_from_text(&text)
        } else {
            extractor.extract_from_document(path)
        };
        results.push(json!({
            "file": path.display().to_string(),
            "fields_found": record.found_count(),
            "record": record,
        }));
    }

    if cli.compact {
        for result in &results {
            println!("{}", serde_json::to_string(result)?);
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}
