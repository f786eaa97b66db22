// src/database/memory.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{CertificateStore, JobStatus, JobTracker, ZoneProvider};
use crate::types::{CertificateRecord, CertificateUpdate};

/// In-process store; nothing survives the process
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    certificates: HashMap<String, CertificateRecord>,
    jobs: HashMap<String, JobStatus>,
    zones: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that reports the given tracked zones
    pub fn with_zones(zones: Vec<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                zones,
                ..Default::default()
            })),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.certificates.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn count_fingerprint(&self, fingerprint: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.certificates.contains_key(fingerprint) as u64)
    }

    async fn insert(&self, record: &CertificateRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.certificates.contains_key(&record.fingerprint_sha256) {
            anyhow::bail!("Duplicate fingerprint {}", record.fingerprint_sha256);
        }
        inner
            .certificates
            .insert(record.fingerprint_sha256.clone(), record.clone());
        Ok(())
    }

    async fn update_existing(&self, fingerprint: &str, update: &CertificateUpdate) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        match inner.certificates.get_mut(fingerprint) {
            Some(record) => {
                update.apply(record);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<CertificateRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.certificates.get(fingerprint).cloned())
    }

    async fn highest_source_index(&self, source: &str) -> Result<Option<u64>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .certificates
            .values()
            .filter_map(|record| record.source_id(source))
            .max())
    }

    async fn mark_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut flipped = 0;
        for record in inner.certificates.values_mut() {
            if record.not_after < now && !record.is_expired {
                record.is_expired = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[async_trait]
impl JobTracker for MemoryStore {
    async fn set_status(&self, job_name: &str, status: JobStatus) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.jobs.insert(job_name.to_string(), status);
        Ok(())
    }

    async fn status(&self, job_name: &str) -> Result<Option<JobStatus>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(job_name).copied())
    }
}

#[async_trait]
impl ZoneProvider for MemoryStore {
    async fn distinct_zones(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut zones = Vec::new();
        for zone in &inner.zones {
            if !zones.contains(zone) {
                zones.push(zone.clone());
            }
        }
        Ok(zones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::attributes;
    use crate::types::CtLogType;
    use chrono::Duration;

    fn record(fingerprint: &str, source: &str, index: u64) -> CertificateRecord {
        CertificateRecord::new(
            attributes(fingerprint),
            source,
            index,
            CtLogType::Certificate,
            vec![],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate() {
        let store = MemoryStore::new();
        store.insert(&record("aa", "log", 1)).await.unwrap();
        assert!(store.insert(&record("aa", "log", 2)).await.is_err());
        assert_eq!(store.count_fingerprint("aa").await.unwrap(), 1);
        assert_eq!(store.count_fingerprint("bb").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_highest_source_index() {
        let store = MemoryStore::new();
        assert_eq!(store.highest_source_index("log").await.unwrap(), None);

        store.insert(&record("aa", "log", 5)).await.unwrap();
        store.insert(&record("bb", "log", 12)).await.unwrap();
        store.insert(&record("cc", "log", 9)).await.unwrap();
        store.insert(&record("dd", "other", 400)).await.unwrap();

        assert_eq!(store.highest_source_index("log").await.unwrap(), Some(12));
        assert_eq!(store.highest_source_index("other").await.unwrap(), Some(400));
    }

    #[tokio::test]
    async fn test_mark_expired_is_idempotent() {
        let store = MemoryStore::new();
        let mut expired = record("aa", "log", 1);
        expired.not_after = Utc::now() - Duration::days(1);
        let mut already = record("bb", "log", 2);
        already.not_after = Utc::now() - Duration::days(10);
        already.is_expired = true;
        store.insert(&expired).await.unwrap();
        store.insert(&already).await.unwrap();
        store.insert(&record("cc", "log", 3)).await.unwrap();

        assert_eq!(store.mark_expired(Utc::now()).await.unwrap(), 1);
        assert_eq!(store.mark_expired(Utc::now()).await.unwrap(), 0);

        assert!(store.get("aa").await.unwrap().unwrap().is_expired);
        assert!(store.get("bb").await.unwrap().unwrap().is_expired);
        assert!(!store.get("cc").await.unwrap().unwrap().is_expired);
    }

    #[tokio::test]
    async fn test_job_tracking() {
        let store = MemoryStore::new();
        assert_eq!(store.status("ct_log-x").await.unwrap(), None);
        store.start("ct_log-x").await.unwrap();
        assert_eq!(store.status("ct_log-x").await.unwrap(), Some(JobStatus::Running));
        store.record_error("ct_log-x").await.unwrap();
        assert_eq!(store.status("ct_log-x").await.unwrap(), Some(JobStatus::Error));
    }

    #[test]
    fn test_distinct_zones() {
        let store = MemoryStore::with_zones(vec![
            "a.com".to_string(),
            "b.com".to_string(),
            "a.com".to_string(),
        ]);
        let zones = tokio_test::block_on(store.distinct_zones()).unwrap();
        assert_eq!(zones, vec!["a.com".to_string(), "b.com".to_string()]);
    }
}
