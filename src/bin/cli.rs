//! docwatch CLI
//!
//! Local execution entry point, meant to be run on a schedule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use docwatch::{
    error::Result,
    models::{Config, DocumentList},
    pipeline::Monitor,
    services::{HttpFetcher, PdfExtractor, build_notifier},
    storage::{FingerprintStore, JsonFingerprintStore, LocalStorage, local::FINGERPRINTS_KEY},
    utils::http,
};

/// docwatch - Document Change Monitor
#[derive(Parser, Debug)]
#[command(
    name = "docwatch",
    version,
    about = "Detects changes in published PDF documents and archives their text"
)]
struct Cli {
    /// Path to storage directory containing config files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check every listed document once
    Run,

    /// Validate configuration and document list
    Validate,

    /// Show stored fingerprints and the last run
    Status,

    /// Build the document list from an index page
    #[cfg(feature = "discover")]
    Discover {
        /// Index page URL (default: discovery.index_url)
        #[arg(long)]
        index_url: Option<String>,

        /// Output file (default: the configured documents file)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing document list
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(storage_dir: &Path) -> Result<Config> {
    let config = Config::load_or_default(storage_dir.join("config.toml"))?;
    config.validate()?;
    Ok(config)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("docwatch starting...");

    let config = load_config(&cli.storage_dir)?;
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let data_dir = config.paths.data_dir(&cli.storage_dir);
    let documents_path = config.paths.documents_file(&cli.storage_dir);

    match cli.command {
        Command::Run => {
            let documents = DocumentList::load(&documents_path)?;
            log::info!(
                "Loaded {} documents from {}",
                documents.documents.len(),
                documents_path.display()
            );

            let storage = LocalStorage::new(&data_dir);
            let fingerprints = JsonFingerprintStore::open(storage.path(FINGERPRINTS_KEY)).await?;
            let fetcher = HttpFetcher::new(&config.monitor)?;
            let extractor = PdfExtractor::new()?;
            let client = http::create_async_client(&config.monitor)?;
            let notifier = build_notifier(&config.notifier, &cli.storage_dir, client)?;

            let monitor = Monitor::new(
                &config,
                &fetcher,
                &fingerprints,
                &storage,
                &extractor,
                notifier.as_ref(),
            );
            let summary = monitor.run(&documents.documents).await?;

            for failure in &summary.failures {
                log::warn!(
                    "{} failed at {}: {}",
                    failure.document_id,
                    failure.stage,
                    failure.error
                );
            }
            if summary.is_partial() {
                log::warn!(
                    "Run finished with {} of {} documents failing",
                    summary.failures.len(),
                    summary.total_documents
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            log::info!("✓ Config OK");

            match DocumentList::load(&documents_path) {
                Ok(list) => log::info!("✓ {} documents OK", list.documents.len()),
                Err(e) => {
                    log::error!("Document list validation failed: {}", e);
                    return Err(e);
                }
            }

            log::info!("All validations passed!");
        }

        Command::Status => {
            let storage = LocalStorage::new(&data_dir);
            let fingerprints = JsonFingerprintStore::open(storage.path(FINGERPRINTS_KEY)).await?;
            let entries = fingerprints.list().await?;

            log::info!("Data directory: {}", storage.root().display());
            if entries.is_empty() {
                log::info!("No documents observed yet.");
            }
            for (id, fp) in &entries {
                log::info!(
                    "  {:<40} {}  {:>10} bytes  seen {}",
                    id,
                    fp.short_hash(),
                    fp.size,
                    fp.observed_at.format("%Y-%m-%d %H:%M")
                );
            }

            log::info!("Change log entries: {}", storage.load_change_log().await?.len());
            match storage.load_summary().await? {
                Some(last) => log::info!(
                    "Last run with changes: {} ({} new, {} changed, {} failed)",
                    last.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    last.new,
                    last.changed,
                    last.failures.len()
                ),
                None => log::info!("No run with changes recorded yet."),
            }
        }

        #[cfg(feature = "discover")]
        Command::Discover {
            index_url,
            output,
            force,
        } => {
            use docwatch::{error::AppError, services::DocumentDiscovery};

            let output = output.unwrap_or(documents_path);
            if output.exists() && !force {
                log::warn!(
                    "Document list already exists at {}. Use --force to overwrite.",
                    output.display()
                );
                return Ok(());
            }

            let index_url = index_url
                .or_else(|| config.discovery.index_url.clone())
                .ok_or_else(|| AppError::config("No index URL given (--index-url or discovery.index_url)"))?;

            let fetcher = HttpFetcher::new(&config.monitor)?;
            let list = DocumentDiscovery::new(&fetcher, &config.discovery)
                .discover(&index_url)
                .await?;
            if list.documents.is_empty() {
                return Err(AppError::validation(format!(
                    "No matching documents found on {index_url}"
                )));
            }

            list.save(&output)?;
            log::info!(
                "Saved {} documents to {}",
                list.documents.len(),
                output.display()
            );
        }
    }

    log::info!("Done!");

    Ok(())
}
