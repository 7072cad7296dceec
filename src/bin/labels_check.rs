//! labels_check - inspect a label manifest before deploying it
//!
//! Reports how many entries parsed, how many ids were duplicated, and
//! optionally resolves class ids the way the detector will.

use anyhow::{bail, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use frame_detect::{CatalogIndex, DuplicateIdPolicy};

#[derive(Parser, Debug)]
#[command(name = "labels_check", about = "Validate a detection label manifest")]
struct Args {
    /// Path to the label manifest
    #[arg(long, env = "DETECT_LABELS_PATH", value_name = "PATH")]
    labels: PathBuf,

    /// Let later duplicate ids replace earlier ones
    #[arg(long)]
    replace_duplicates: bool,

    /// Class ids to resolve
    #[arg(long = "id", value_name = "ID")]
    ids: Vec<u32>,

    /// Fail when any duplicate id is found
    #[arg(long)]
    strict: bool,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let policy = if args.replace_duplicates {
        DuplicateIdPolicy::Replace
    } else {
        DuplicateIdPolicy::Reject
    };
    let catalog = CatalogIndex::load(&args.labels, policy)?;

    let resolved: Vec<(u32, Option<String>)> = args
        .ids
        .iter()
        .map(|&id| (id, catalog.lookup(id).map(|item| item.display_name.clone())))
        .collect();

    if args.json {
        let report = json!({
            "labels": args.labels.display().to_string(),
            "entries": catalog.len(),
            "duplicates": catalog.duplicates(),
            "resolved": resolved
                .iter()
                .map(|(id, label)| json!({ "id": id, "label": label }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("labels_check: {}", args.labels.display());
        println!("  entries:    {}", catalog.len());
        println!("  duplicates: {}", catalog.duplicates());
        for (id, label) in &resolved {
            match label {
                Some(label) => println!("  {:>5} -> {}", id, label),
                None => println!("  {:>5} -> (unknown)", id),
            }
        }
    }

    if catalog.is_empty() {
        bail!("no entries parsed from {}", args.labels.display());
    }
    if args.strict && catalog.duplicates() > 0 {
        bail!("{} duplicate ids found", catalog.duplicates());
    }
    Ok(())
}
