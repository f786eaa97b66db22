// src/main.rs
use anyhow::Context;
use clap::Parser;
use ct_ingest::cli::Cli;
use ct_ingest::config::Config;
use ct_ingest::ct_log::{CrawlOptions, Crawler, CtLogClient, RetryPolicy};
use ct_ingest::database::{
    CertificateStore, JobTracker, MemoryStore, PostgresBackend, ZoneProvider,
};
use ct_ingest::export::{CertificateExporter, DownloadMethod};
use ct_ingest::filter::RelevancyFilter;
use ct_ingest::progress::CrawlProgress;
use ct_ingest::stats::CrawlStats;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    cli.validate()?;

    let mut config = Config::from_file(Path::new(&cli.config))
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    // Apply CLI overrides
    if cli.include_precerts {
        config.crawl.include_precerts = true;
    }
    if let Some(method) = cli.download_method {
        config.export.download_method = method;
    }
    if let Some(ref location) = cli.cert_save_location {
        config.export.save_location = location.display().to_string();
    }
    if let Some(format) = cli.save_type {
        config.export.save_type = format;
    }

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level(&config.logging.level)));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let source = config
        .log_source(&cli.log_source)
        .cloned()
        .with_context(|| format!("Unknown log source: {}", cli.log_source))?;

    tracing::info!("Starting ct-ingest for {} ({})", source.key, source.base_url());

    // Pick the store
    let mut postgres = None;
    let (store, jobs, zone_provider): (
        Arc<dyn CertificateStore>,
        Arc<dyn JobTracker>,
        Arc<dyn ZoneProvider>,
    ) = if config.database.enabled {
        let backend = Arc::new(
            PostgresBackend::new(&config.database)
                .await
                .context("Failed to connect to database")?,
        );
        backend.migrate().await.context("Failed to run migrations")?;
        postgres = Some(backend.clone());
        (
            backend.clone() as Arc<dyn CertificateStore>,
            backend.clone() as Arc<dyn JobTracker>,
            backend as Arc<dyn ZoneProvider>,
        )
    } else {
        tracing::warn!("Database disabled; certificates are kept in memory and lost on exit");
        let memory = Arc::new(MemoryStore::new());
        (
            memory.clone() as Arc<dyn CertificateStore>,
            memory.clone() as Arc<dyn JobTracker>,
            memory as Arc<dyn ZoneProvider>,
        )
    };

    // Tracked zones: config list plus the zone table when requested
    let mut zones = config.tracking.zones.clone();
    if config.tracking.zones_from_database {
        let stored = zone_provider
            .distinct_zones()
            .await
            .context("Failed to load tracked zones")?;
        zones.extend(stored);
    }

    let filter = RelevancyFilter::new(config.tracking.organizations.iter().cloned(), zones);
    tracing::info!(
        "Tracking {} organization(s) and {} zone(s)",
        filter.organization_count(),
        filter.zone_count()
    );

    let policy = RetryPolicy::from_config(&config.retry);
    let client = CtLogClient::new(source.base_url(), policy)?;

    let options = CrawlOptions {
        batch_size: config.crawl.batch_size,
        include_precerts: config.crawl.include_precerts,
        start_override: cli.start_override(),
    };

    let show_progress =
        !cli.no_progress && is_terminal::is_terminal(std::io::stderr());

    let mut crawler = Crawler::new(
        source.clone(),
        client,
        store,
        jobs,
        filter,
        options,
        config.crawl.merge_zones,
    )
    .with_progress(CrawlProgress::new(show_progress));

    if config.export.download_method == DownloadMethod::DbAndSave {
        let exporter = CertificateExporter::prepare(
            &PathBuf::from(&config.export.save_location),
            &source.key,
            config.export.save_type,
        )
        .await?;
        crawler = crawler.with_exporter(exporter);
    }

    let result = crawler.run().await;

    if let Some(backend) = postgres {
        backend.close().await;
    }

    match result {
        Ok(summary) => {
            tracing::info!(
                "{}: Crawled {} -> {} in {} batch(es), {} stored, {} expired ({})",
                source.key,
                summary.start_index,
                summary.final_index,
                summary.batches,
                summary.stats.persisted(),
                summary.expired_marked,
                CrawlStats::format_uptime(summary.stats.elapsed_secs)
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("{}: Fatal: {}", source.key, e);
            std::process::exit(1);
        }
    }
}
