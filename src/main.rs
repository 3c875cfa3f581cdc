use anyhow::{Context, Result};
use clap::Parser;
use lsif_bundle::cache::DataCache;
use lsif_bundle::changes::ChangeSet;
use lsif_bundle::cli::{self, PositionArgs};
use lsif_bundle::config::Config;
use lsif_bundle::db::BundleReader;
use lsif_bundle::model::{Location, Position};
use lsif_bundle::persistence::Reader;
use lsif_bundle::{driver, query};
use serde_json::json;
use std::io::Read;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn open_bundle(path: &Path) -> Result<BundleReader> {
    BundleReader::open(path, DataCache::new(Config::get().cache_capacity))
}

fn read_changes(source: &Path) -> Result<ChangeSet> {
    let raw = if source == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("read changes from stdin")?;
        raw
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("read changes from {}", source.display()))?
    };
    ChangeSet::from_name_status(&raw)
}

fn locations_at(
    at: PositionArgs,
    lookup: fn(&dyn Reader, &str, Position) -> Result<Vec<Location>>,
) -> Result<()> {
    let bundle = open_bundle(&at.bundle)?;
    let locations = lookup(&bundle, &at.path, Position::new(at.line, at.character))?;
    println!("{}", serde_json::to_string_pretty(&locations)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Merge {
            base,
            patch,
            output,
            changes,
        } => {
            let changes = read_changes(&changes)?;
            let stats = driver::merge_bundles(&base, &patch, &output, &changes)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        cli::Command::Stats { bundle } => {
            let reader = open_bundle(&bundle)?;
            let meta = reader.read_meta()?;
            let documents = reader.paths_with_prefix("")?.len();
            let digest = reader.digest()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "num_result_chunks": meta.num_result_chunks,
                    "documents": documents,
                    "result_chunks": digest.result_chunks.rows,
                    "digest": digest,
                }))?
            );
            Ok(())
        }
        cli::Command::Definitions { at } => locations_at(at, query::definitions_at),
        cli::Command::References { at } => locations_at(at, query::references_at),
        cli::Command::Referencing { bundle, paths } => {
            let reader = open_bundle(&bundle)?;
            let referencing = query::documents_referencing(&reader, &paths)?;
            println!("{}", serde_json::to_string_pretty(&referencing)?);
            Ok(())
        }
    }
}
