//! Bactic scraper - Main entry point

use anyhow::{Context, Result};
use bactic_common::logging::{init_logging, LogConfig, LogLevel};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bactic_scraper::{
    db::{self, MemoryStore, PgStore, Store},
    ingest::{FeedOrchestrator, HttpFetcher},
    Config,
};

#[derive(Parser, Debug)]
#[command(name = "bactic-scraper")]
#[command(author, version, about = "Ingest TFRRS meet results into the bactic database", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Seconds between feed polls
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Poll the feed once, wait for every new meet, then exit
    #[arg(long)]
    once: bool,

    /// Keep everything in memory instead of writing to Postgres
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("bactic-scraper")
        .filter_directives("bactic_scraper=debug,sqlx=info,html5ever=error,selectors=error")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // Dropping the guard stops the file writer
    let _log_guard = init_logging(&log_config)?;

    info!("Starting bactic scraper");

    let mut config = Config::load()?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(secs) = cli.interval_secs {
        config.scrape.interval_secs = secs;
    }
    config.validate()?;

    info!(
        feed = %config.scrape.feed_url,
        interval_secs = config.scrape.interval_secs,
        max_concurrent_pages = config.scrape.max_concurrent_pages,
        "Configuration loaded"
    );

    let memory = cli.dry_run.then(|| Arc::new(MemoryStore::new()));
    let store: Arc<dyn Store> = match &memory {
        Some(memory) => {
            warn!("Dry run: results are kept in memory and discarded on exit");
            memory.clone()
        },
        None => {
            let pool = db::create_pool(&config.database)
                .await
                .context("Failed to connect to the database")?;
            db::migrate(&pool).await?;

            Arc::new(PgStore::new(pool))
        },
    };

    let fetcher = Arc::new(HttpFetcher::new(&config.scrape)?);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let orchestrator = FeedOrchestrator::new(store, fetcher, config.scrape, cancel);

    if cli.once {
        let report = orchestrator.run_once().await?;
        info!(
            items = report.items,
            new_meets = report.new_meets,
            known_meets = report.known_meets,
            resumed_meets = report.resumed_meets,
            "Single poll finished"
        );
    } else {
        orchestrator.start().await??;
    }

    if let Some(memory) = memory {
        info!(
            meets = memory.meet_count().await,
            heats = memory.heat_count().await,
            results = memory.result_count().await,
            athletes = memory.athlete_count().await,
            schools = memory.school_count().await,
            "Dry run totals"
        );
    }

    info!("Bactic scraper stopped");
    Ok(())
}

/// Cancel the token on SIGINT or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, finishing in-flight heats");
    cancel.cancel();
}
