// src/upsert.rs
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::database::CertificateStore;
use crate::types::{CertificateAttributes, CertificateRecord, CertificateUpdate, CtLogType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Merges relevant certificates into the store, one record per fingerprint
pub struct CertificateUpserter {
    store: Arc<dyn CertificateStore>,
    merge_zones: bool,
}

impl CertificateUpserter {
    /// `merge_zones` unions zone sets on update; off keeps the latest match only
    pub fn new(store: Arc<dyn CertificateStore>, merge_zones: bool) -> Self {
        Self { store, merge_zones }
    }

    pub async fn upsert(
        &self,
        cert: CertificateAttributes,
        source: &str,
        index: u64,
        ct_log_type: CtLogType,
        zones: Vec<String>,
    ) -> Result<UpsertOutcome> {
        let now = Utc::now();

        if self.store.count_fingerprint(&cert.fingerprint_sha256).await? == 0 {
            let record = CertificateRecord::new(cert, source, index, ct_log_type, zones, now);
            self.store.insert(&record).await?;
            return Ok(UpsertOutcome::Inserted);
        }

        let update = CertificateUpdate {
            source: source.to_string(),
            index,
            ct_log_type,
            zones,
            merge_zones: self.merge_zones,
            updated_at: now,
        };
        let touched = self
            .store
            .update_existing(&cert.fingerprint_sha256, &update)
            .await?;

        debug!(
            "Updated {} record(s) for {}",
            touched, cert.fingerprint_sha256
        );

        Ok(UpsertOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::types::fixtures::attributes;

    fn zones(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_same_source_twice_updates_without_duplicate() {
        let store = MemoryStore::new();
        let upserter = CertificateUpserter::new(Arc::new(store.clone()), false);

        let outcome = upserter
            .upsert(attributes("aa"), "log_a", 10, CtLogType::Certificate, zones(&["a.com"]))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        let first = store.get("aa").await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let outcome = upserter
            .upsert(attributes("aa"), "log_a", 11, CtLogType::Certificate, zones(&["a.com"]))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        assert_eq!(store.len().await, 1);
        let second = store.get("aa").await.unwrap().unwrap();
        assert_eq!(second.sources, vec!["log_a".to_string()]);
        assert_eq!(second.source_id("log_a"), Some(11));
        assert!(second.marinus_updated > first.marinus_updated);
    }

    #[tokio::test]
    async fn test_second_source_adds_to_sources() {
        let store = MemoryStore::new();
        let upserter = CertificateUpserter::new(Arc::new(store.clone()), false);

        upserter
            .upsert(attributes("aa"), "log_a", 10, CtLogType::Certificate, zones(&["a.com"]))
            .await
            .unwrap();
        upserter
            .upsert(attributes("aa"), "log_b", 99, CtLogType::PreCertificate, zones(&["b.com"]))
            .await
            .unwrap();

        let record = store.get("aa").await.unwrap().unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(record.sources, vec!["log_a".to_string(), "log_b".to_string()]);
        assert_eq!(record.source_id("log_a"), Some(10));
        assert_eq!(record.source_id("log_b"), Some(99));
        assert_eq!(record.ct_log_type, CtLogType::PreCertificate);
        // Overwrite, not union
        assert_eq!(record.zones, zones(&["b.com"]));
    }

    #[tokio::test]
    async fn test_merge_zones_flag_unions() {
        let store = MemoryStore::new();
        let upserter = CertificateUpserter::new(Arc::new(store.clone()), true);

        upserter
            .upsert(attributes("aa"), "log_a", 1, CtLogType::Certificate, zones(&["a.com"]))
            .await
            .unwrap();
        upserter
            .upsert(attributes("aa"), "log_b", 2, CtLogType::Certificate, zones(&["b.com"]))
            .await
            .unwrap();

        let record = store.get("aa").await.unwrap().unwrap();
        assert_eq!(record.zones, zones(&["a.com", "b.com"]));
    }

    #[tokio::test]
    async fn test_new_record_fields() {
        let store = MemoryStore::new();
        let upserter = CertificateUpserter::new(Arc::new(store.clone()), false);

        upserter
            .upsert(attributes("aa"), "log_a", 3, CtLogType::PreCertificate, vec![])
            .await
            .unwrap();

        let record = store.get("aa").await.unwrap().unwrap();
        assert_eq!(record.ct_log_type, CtLogType::PreCertificate);
        assert!(record.zones.is_empty());
        assert!(!record.is_expired);
        assert_eq!(record.subject_organization_name, vec!["Example Inc".to_string()]);
    }
}
