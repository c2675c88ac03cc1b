use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dictionary_migrate::credentials::ServiceAccount;
use dictionary_migrate::store::JsonFileStore;
use dictionary_migrate::{migrate_collection, DEFAULT_COLLECTION};
use tracing_subscriber::EnvFilter;

/// Normalize the drug dictionary and rebuild its search keywords.
///
/// Run it against a backup copy or a test project first.
#[derive(Parser)]
#[command(name = "migrate-drug-dictionary")]
#[command(author, version, about)]
struct Cli {
    /// Service account key JSON
    #[arg(env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Collection to normalize
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Directory holding the project's collections
    #[arg(long, env = "DICTIONARY_STORE_DIR")]
    store_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let account = ServiceAccount::load(cli.credentials.as_deref())?;
    let store_dir = cli
        .store_dir
        .unwrap_or_else(|| account.default_store_dir());
    tracing::info!(project = %account.project_id, store = %store_dir.display(), "connected");

    let store = JsonFileStore::new(&store_dir);
    let report = migrate_collection(&store, &cli.collection)
        .with_context(|| format!("failed to read collection `{}`", cli.collection))?;
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "some documents were not updated");
    }
    println!("Done");
    Ok(())
}
