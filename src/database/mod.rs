// src/database/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{CertificateRecord, CertificateUpdate};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresBackend;

/// Record collection keyed by `fingerprint_sha256`
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Number of records stored under a fingerprint (0 or 1)
    async fn count_fingerprint(&self, fingerprint: &str) -> Result<u64>;

    /// Insert a record for a fingerprint not yet stored
    async fn insert(&self, record: &CertificateRecord) -> Result<()>;

    /// Apply an update to every record with this fingerprint; returns rows touched
    async fn update_existing(&self, fingerprint: &str, update: &CertificateUpdate) -> Result<u64>;

    async fn get(&self, fingerprint: &str) -> Result<Option<CertificateRecord>>;

    /// Highest `{source}_id` across stored records
    async fn highest_source_index(&self, source: &str) -> Result<Option<u64>>;

    /// Flag records with `not_after < now` as expired; returns rows flipped
    async fn mark_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Job bookkeeping status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETE" => Some(JobStatus::Complete),
            "ERROR" => Some(JobStatus::Error),
            _ => None,
        }
    }
}

/// Start / complete / error markers keyed by job name
#[async_trait]
pub trait JobTracker: Send + Sync {
    async fn set_status(&self, job_name: &str, status: JobStatus) -> Result<()>;

    async fn status(&self, job_name: &str) -> Result<Option<JobStatus>>;

    async fn start(&self, job_name: &str) -> Result<()> {
        self.set_status(job_name, JobStatus::Running).await
    }

    async fn complete(&self, job_name: &str) -> Result<()> {
        self.set_status(job_name, JobStatus::Complete).await
    }

    async fn record_error(&self, job_name: &str) -> Result<()> {
        self.set_status(job_name, JobStatus::Error).await
    }
}

/// Source of tracked zone names
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    async fn distinct_zones(&self) -> Result<Vec<String>>;
}
