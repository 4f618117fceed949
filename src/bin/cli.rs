//! Lotwatch CLI
//!
//! One-shot sync passes, a long-lived watch loop, and state inspection.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lotwatch::{
    error::{AppError, Result},
    events::LogSink,
    models::{Config, RunStatus},
    parse::SelectorPageParser,
    store::JsonStore,
    sync::SyncEngine,
    worker::LiveWorker,
};

/// Lotwatch - incremental auction listing crawler
#[derive(Parser, Debug)]
#[command(
    name = "lotwatch",
    version,
    about = "Incremental crawler for paginated auction listings"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "lotwatch.toml")]
    config: PathBuf,

    /// Path to the JSON state file
    #[arg(short, long, default_value = "lotwatch.json")]
    state: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single sync pass and print the result
    Run {
        /// Auction code (overrides [sync] auction_code)
        #[arg(long)]
        auction: Option<String>,

        /// First listing page URL (overrides [sync] listing_url)
        #[arg(long)]
        url: Option<String>,

        /// Cap on listing pages for this pass, first page included
        #[arg(long)]
        max_pages: Option<u32>,

        /// Fetch and diff without writing auctions or lots
        #[arg(long)]
        dry_run: bool,

        /// Refetch every detail page regardless of stored hashes
        #[arg(long)]
        force_detail: bool,

        /// Bulk fetch backend: "cooperative" or "worker-pool"
        #[arg(long)]
        backend: Option<String>,
    },

    /// Sync repeatedly on an interval until interrupted
    Watch {
        /// Auction code (overrides [sync] auction_code)
        #[arg(long)]
        auction: Option<String>,

        /// First listing page URL (overrides [sync] listing_url)
        #[arg(long)]
        url: Option<String>,

        /// Seconds between passes (overrides [worker] interval_secs)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Validate the config file and selector profile
    Validate,

    /// Show a summary of the state file
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Lotwatch starting...");

    let mut config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Run {
            auction,
            url,
            max_pages,
            dry_run,
            force_detail,
            backend,
        } => {
            if let Some(auction) = auction {
                config.sync.auction_code = Some(auction);
            }
            if let Some(url) = url {
                config.sync.listing_url = Some(url);
            }
            if let Some(max_pages) = max_pages {
                config.sync.max_pages = Some(max_pages);
            }
            if dry_run {
                config.sync.dry_run = true;
            }
            if force_detail {
                config.sync.force_detail = true;
            }
            if let Some(backend) = backend {
                config.fetch.backend = backend.parse()?;
            }

            let store = Arc::new(JsonStore::open(&cli.state).await?);
            let parser = Arc::new(SelectorPageParser::new(&config.parser)?);
            let engine = SyncEngine::from_config(&config, store, parser)?;

            let result = engine.run().await?;
            for error in &result.errors {
                log::warn!("  {error}");
            }
            println!("{result}");
            if result.status == RunStatus::Failed {
                log::error!("run {} finished failed", result.run_id);
            }
        }

        Command::Watch {
            auction,
            url,
            interval_secs,
        } => {
            if let Some(auction) = auction {
                config.sync.auction_code = Some(auction);
            }
            if let Some(url) = url {
                config.sync.listing_url = Some(url);
            }
            if let Some(secs) = interval_secs {
                config.worker.interval_secs = Some(secs);
            }
            if config.worker.interval_secs.is_none() {
                return Err(AppError::config(
                    "watch needs an interval: set worker.interval_secs or pass --interval-secs",
                ));
            }

            let store = Arc::new(JsonStore::open(&cli.state).await?);
            let worker = LiveWorker::new(store, Arc::new(LogSink));
            worker.start(config).await?;

            log::info!("Watching; press Ctrl-C to stop.");
            tokio::signal::ctrl_c().await?;
            log::info!("Interrupt received, stopping worker...");
            worker.stop().await?;

            if let Some(result) = worker.status().await.last_result {
                println!("{result}");
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            // Selector and pattern compilation failures should surface here,
            // not on the first pass.
            SelectorPageParser::new(&config.parser)?;
            log::info!("✓ Config OK (fetch, sync, worker, selector profile)");

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Config file: {}", cli.config.display());
            log::info!("State file: {}", cli.state.display());

            if cli.state.exists() {
                let store = JsonStore::open(&cli.state).await?;
                let auctions = store.auctions().await;
                log::info!("{} auction(s) tracked", auctions.len());
                for auction in &auctions {
                    let lots = store.lots_of(&auction.code).await;
                    log::info!(
                        "  {} \"{}\": {} lots, {} discovered pages",
                        auction.code,
                        auction.title,
                        lots.len(),
                        auction.discovered_pages.len()
                    );
                }
                match store.runs().await.last() {
                    Some(run) => log::info!(
                        "Last run {}: {} started {} ({} pages, {} lots, {} updated, {} errors)",
                        run.id,
                        run.status,
                        run.started_at,
                        run.counters.pages_scanned,
                        run.counters.lots_scanned,
                        run.counters.lots_updated,
                        run.error_count
                    ),
                    None => log::info!("No runs recorded yet."),
                }
            } else {
                log::info!("No state file yet.");
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
