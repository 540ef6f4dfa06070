use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use showcrawl::controls::init_tracing;
use showcrawl::{validate, RecordKind};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "showcrawl-validate",
    about = "Check a published dataset against its record schema"
)]
struct ValidateCli {
    /// Dataset to check
    #[arg(default_value = "data/quotes.json")]
    path: PathBuf,

    /// Record schema the dataset follows
    #[arg(long, value_enum, default_value_t = RecordKind::Quotes)]
    kind: RecordKind,
}

fn main() -> Result<()> {
    let cli = ValidateCli::parse();
    init_tracing(false);

    let raw = fs::read_to_string(&cli.path)
        .with_context(|| format!("failed to read {:?}", cli.path))?;
    let dataset: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{:?} is not valid JSON", cli.path))?;

    match validate(cli.kind, &dataset) {
        Ok(()) => {
            let entries = dataset.as_array().map_or(0, Vec::len);
            info!(entries, kind = %cli.kind, "validation passed");
            Ok(())
        }
        Err(violations) => {
            for violation in &violations {
                eprintln!("{violation}");
            }
            eprintln!("{} violation(s) in {:?}", violations.len(), cli.path);
            process::exit(1);
        }
    }
}
