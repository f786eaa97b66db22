// src/ct_log/crawler.rs
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::client::{CtLogClient, FetchError};
use super::leaf::{decode_leaf_input, extract_certificate, LogEntryType};
use super::types::LeafEntry;
use crate::cert_parser::{AttributeParser, X509AttributeParser};
use crate::cursor::resolve_start_index;
use crate::database::{CertificateStore, JobTracker};
use crate::export::CertificateExporter;
use crate::filter::RelevancyFilter;
use crate::progress::CrawlProgress;
use crate::stats::{CrawlStats, StatsSnapshot};
use crate::types::{CtLogType, LogSource};
use crate::upsert::{CertificateUpserter, UpsertOutcome};

/// Failures that abort a run
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("certificate store error: {0:#}")]
    Store(anyhow::Error),

    #[error("job tracking error: {0:#}")]
    Tracking(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    ResolvingCursor,
    FetchingTreeHead,
    IteratingBatches,
    Sweeping,
    Done,
    Fatal,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlState::ResolvingCursor => "resolving cursor",
            CrawlState::FetchingTreeHead => "fetching tree head",
            CrawlState::IteratingBatches => "iterating batches",
            CrawlState::Sweeping => "sweeping",
            CrawlState::Done => "done",
            CrawlState::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub batch_size: u64,
    pub include_precerts: bool,
    /// Negative or absent means resume from the store
    pub start_override: Option<i64>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            include_precerts: false,
            start_override: None,
        }
    }
}

/// Outcome of a run that reached `Done`
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub start_index: u64,
    pub tree_size: u64,
    pub final_index: u64,
    pub batches: u64,
    pub expired_marked: u64,
    pub stats: StatsSnapshot,
}

/// Drives one crawl of a single log from the resume cursor to the tree head
pub struct Crawler {
    source: LogSource,
    client: CtLogClient,
    store: Arc<dyn CertificateStore>,
    jobs: Arc<dyn JobTracker>,
    filter: RelevancyFilter,
    parser: Arc<dyn AttributeParser>,
    upserter: CertificateUpserter,
    exporter: Option<CertificateExporter>,
    progress: CrawlProgress,
    stats: CrawlStats,
    options: CrawlOptions,
    state: CrawlState,
}

impl Crawler {
    pub fn new(
        source: LogSource,
        client: CtLogClient,
        store: Arc<dyn CertificateStore>,
        jobs: Arc<dyn JobTracker>,
        filter: RelevancyFilter,
        options: CrawlOptions,
        merge_zones: bool,
    ) -> Self {
        let upserter = CertificateUpserter::new(store.clone(), merge_zones);

        Self {
            source,
            client,
            store,
            jobs,
            filter,
            parser: Arc::new(X509AttributeParser::new()),
            upserter,
            exporter: None,
            progress: CrawlProgress::disabled(),
            stats: CrawlStats::new(),
            options,
            state: CrawlState::ResolvingCursor,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn AttributeParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_exporter(mut self, exporter: CertificateExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_progress(mut self, progress: CrawlProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    fn transition(&mut self, next: CrawlState) {
        debug!("{}: {} -> {}", self.source.key, self.state, next);
        self.state = next;
    }

    /// Run the crawl with job bookkeeping around it
    pub async fn run(&mut self) -> Result<CrawlSummary, CrawlError> {
        let job_name = self.source.job_name();

        self.jobs
            .start(&job_name)
            .await
            .map_err(CrawlError::Tracking)?;

        match self.crawl().await {
            Ok(summary) => {
                self.jobs
                    .complete(&job_name)
                    .await
                    .map_err(CrawlError::Tracking)?;
                Ok(summary)
            }
            Err(e) => {
                self.transition(CrawlState::Fatal);
                error!("{}: Crawl failed: {}", self.source.key, e);
                if let Err(tracking) = self.jobs.record_error(&job_name).await {
                    error!("{}: Failed to record job error: {:#}", self.source.key, tracking);
                }
                Err(e)
            }
        }
    }

    /// The state machine itself, without job bookkeeping
    pub async fn crawl(&mut self) -> Result<CrawlSummary, CrawlError> {
        self.transition(CrawlState::ResolvingCursor);
        let start_index = resolve_start_index(
            self.store.as_ref(),
            &self.source.key,
            self.options.start_override,
        )
        .await
        .map_err(CrawlError::Store)?;

        self.transition(CrawlState::FetchingTreeHead);
        let tree_size = self.client.get_sth().await?.tree_size;

        info!(
            "{}: Crawling from index {} to tree size {}",
            self.source.key, start_index, tree_size
        );

        self.transition(CrawlState::IteratingBatches);
        self.progress.begin(start_index, tree_size);

        let batch_size = self.options.batch_size.max(1);
        let mut current = start_index;
        let mut batches = 0u64;

        while current < tree_size {
            let end = std::cmp::min(current + batch_size, tree_size);
            debug!("{}: Fetching entries {}-{}", self.source.key, current, end);

            let entries = self.client.get_entries(current, end).await?;
            batches += 1;

            for entry in entries {
                if current >= tree_size {
                    break;
                }
                self.process_entry(&entry, current)
                    .await
                    .map_err(CrawlError::Store)?;
                current += 1;
            }

            self.progress.set_position(current);
            self.progress.set_message(self.stats.format_stats());
        }

        self.progress.finish();

        self.transition(CrawlState::Sweeping);
        let expired_marked = self
            .store
            .mark_expired(Utc::now())
            .await
            .map_err(CrawlError::Store)?;
        info!("{}: Marked {} certificate(s) expired", self.source.key, expired_marked);

        self.transition(CrawlState::Done);

        let stats = self.stats.snapshot();
        info!(
            "{}: Done at index {} ({} processed, {} inserted, {} updated)",
            self.source.key, current, stats.processed, stats.inserted, stats.updated
        );

        Ok(CrawlSummary {
            start_index,
            tree_size,
            final_index: current,
            batches,
            expired_marked,
            stats,
        })
    }

    /// Decode, filter and persist one entry. Only store failures escape.
    async fn process_entry(&self, entry: &LeafEntry, index: u64) -> anyhow::Result<()> {
        self.stats.increment_processed();
        let source = self.source.key.as_str();

        let header = match decode_leaf_input(&entry.leaf_input) {
            Ok(header) => header,
            Err(e) => {
                warn!("{}: Skipping entry {}: {}", source, index, e);
                self.stats.increment_decode_failures();
                return Ok(());
            }
        };

        let ct_log_type = match header.entry_type {
            LogEntryType::Precert => CtLogType::PreCertificate,
            _ => CtLogType::Certificate,
        };

        let der = match extract_certificate(
            &header,
            entry.extra_data.as_deref(),
            self.options.include_precerts,
        ) {
            Ok(Some(der)) => der,
            Ok(None) => {
                if header.entry_type == LogEntryType::Precert {
                    self.stats.increment_precerts_skipped();
                } else {
                    debug!("{}: Unknown entry type at {}", source, index);
                }
                return Ok(());
            }
            Err(e) => {
                warn!("{}: Skipping entry {}: {}", source, index, e);
                self.stats.increment_decode_failures();
                return Ok(());
            }
        };

        let Some(cert) = self.parser.parse(&der, source) else {
            debug!("{}: Unparseable certificate at {}", source, index);
            self.stats.increment_parse_failures();
            return Ok(());
        };

        let Some(zones) = self.filter.evaluate(&cert) else {
            self.stats.increment_irrelevant();
            return Ok(());
        };

        let raw = cert.raw.clone();
        let fingerprint = cert.fingerprint_sha256.clone();
        match self
            .upserter
            .upsert(cert, source, index, ct_log_type, zones)
            .await?
        {
            UpsertOutcome::Inserted => {
                info!("{}: Stored {} at index {}", source, fingerprint, index);
                self.stats.increment_inserted();
            }
            UpsertOutcome::Updated => {
                info!("{}: Updated {} at index {}", source, fingerprint, index);
                self.stats.increment_updated();
            }
        }

        if let Some(ref exporter) = self.exporter {
            if let Err(e) = exporter.write(&raw, index).await {
                error!("{}: Failed to save certificate {}: {:#}", source, index, e);
                self.stats.increment_export_failures();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(CrawlState::IteratingBatches.to_string(), "iterating batches");
        assert_eq!(CrawlState::Fatal.to_string(), "fatal");
    }

    #[test]
    fn test_default_options() {
        let options = CrawlOptions::default();
        assert_eq!(options.batch_size, 256);
        assert!(!options.include_precerts);
        assert!(options.start_override.is_none());
    }

    #[test]
    fn test_fetch_error_converts() {
        let err: CrawlError = FetchError::Timeout {
            url: "http://log".to_string(),
        }
        .into();
        assert!(matches!(err, CrawlError::Fetch(_)));
        assert!(err.to_string().contains("timeouts"));
    }
}
