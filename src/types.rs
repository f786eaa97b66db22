// src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A CT log to crawl: the source key used in store fields and job names, plus its base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSource {
    pub key: String,
    pub url: String,
}

impl LogSource {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
        }
    }

    /// Base URL with a scheme and without a trailing slash
    pub fn base_url(&self) -> String {
        let url = self.url.trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        }
    }

    /// Name used for job bookkeeping
    pub fn job_name(&self) -> String {
        format!("ct_log-{}", self.key)
    }

    /// Field name holding this source's log index on a certificate record
    pub fn id_field(&self) -> String {
        format!("{}_id", self.key)
    }
}

/// Whether a stored certificate came from an X.509 entry or a precertificate entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtLogType {
    #[serde(rename = "CERTIFICATE")]
    Certificate,
    #[serde(rename = "PRE-CERTIFICATE")]
    PreCertificate,
}

impl CtLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CtLogType::Certificate => "CERTIFICATE",
            CtLogType::PreCertificate => "PRE-CERTIFICATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CERTIFICATE" => Some(CtLogType::Certificate),
            "PRE-CERTIFICATE" => Some(CtLogType::PreCertificate),
            _ => None,
        }
    }
}

impl fmt::Display for CtLogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes extracted from a DER certificate
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateAttributes {
    pub fingerprint_sha256: String,
    pub subject_organization_name: Vec<String>,
    pub subject_common_names: Vec<String>,
    pub subject_dns_names: Vec<String>,
    pub issuer_common_name: Vec<String>,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Base64 of the DER bytes, re-encodable as PEM
    pub raw: String,
}

/// The persisted unit, keyed by `fingerprint_sha256`
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateRecord {
    pub fingerprint_sha256: String,
    pub subject_organization_name: Vec<String>,
    pub subject_common_names: Vec<String>,
    pub subject_dns_names: Vec<String>,
    pub issuer_common_name: Vec<String>,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub raw: String,
    pub ct_log_type: CtLogType,
    pub zones: Vec<String>,
    pub sources: Vec<String>,
    /// Log index per source key, the `{source}_id` fields of the document form
    pub source_ids: BTreeMap<String, u64>,
    pub is_expired: bool,
    pub marinus_updated: DateTime<Utc>,
}

impl CertificateRecord {
    /// Build a fresh record for the first relevant sighting of a certificate
    pub fn new(
        attributes: CertificateAttributes,
        source: &str,
        index: u64,
        ct_log_type: CtLogType,
        zones: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut source_ids = BTreeMap::new();
        source_ids.insert(source.to_string(), index);

        Self {
            fingerprint_sha256: attributes.fingerprint_sha256,
            subject_organization_name: attributes.subject_organization_name,
            subject_common_names: attributes.subject_common_names,
            subject_dns_names: attributes.subject_dns_names,
            issuer_common_name: attributes.issuer_common_name,
            serial_number: attributes.serial_number,
            not_before: attributes.not_before,
            not_after: attributes.not_after,
            raw: attributes.raw,
            ct_log_type,
            zones,
            sources: vec![source.to_string()],
            source_ids,
            is_expired: false,
            marinus_updated: now,
        }
    }

    /// The `{source}_id` value for a source, if that source has seen this certificate
    pub fn source_id(&self, source: &str) -> Option<u64> {
        self.source_ids.get(source).copied()
    }

    /// Flattened document form with one `{source}_id` key per observing source
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("fingerprint_sha256".into(), Value::from(self.fingerprint_sha256.clone()));
        doc.insert(
            "subject_organization_name".into(),
            Value::from(self.subject_organization_name.clone()),
        );
        doc.insert(
            "subject_common_names".into(),
            Value::from(self.subject_common_names.clone()),
        );
        doc.insert(
            "subject_dns_names".into(),
            Value::from(self.subject_dns_names.clone()),
        );
        doc.insert(
            "issuer_common_name".into(),
            Value::from(self.issuer_common_name.clone()),
        );
        doc.insert("serial_number".into(), Value::from(self.serial_number.clone()));
        doc.insert("not_before".into(), Value::from(self.not_before.to_rfc3339()));
        doc.insert("not_after".into(), Value::from(self.not_after.to_rfc3339()));
        doc.insert("raw".into(), Value::from(self.raw.clone()));
        doc.insert("ct_log_type".into(), Value::from(self.ct_log_type.as_str()));
        doc.insert("zones".into(), Value::from(self.zones.clone()));
        doc.insert("sources".into(), Value::from(self.sources.clone()));
        for (source, index) in &self.source_ids {
            doc.insert(format!("{}_id", source), Value::from(*index));
        }
        doc.insert("isExpired".into(), Value::from(self.is_expired));
        doc.insert(
            "marinus_updated".into(),
            Value::from(self.marinus_updated.to_rfc3339()),
        );
        Value::Object(doc)
    }
}

/// Fields rewritten when an already-stored fingerprint is seen again
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateUpdate {
    pub source: String,
    pub index: u64,
    pub ct_log_type: CtLogType,
    pub zones: Vec<String>,
    /// Union with stored zones instead of overwriting them
    pub merge_zones: bool,
    pub updated_at: DateTime<Utc>,
}

impl CertificateUpdate {
    /// Apply this update to a record, mirroring the store-side update
    pub fn apply(&self, record: &mut CertificateRecord) {
        record.source_ids.insert(self.source.clone(), self.index);
        record.ct_log_type = self.ct_log_type;
        if self.merge_zones {
            for zone in &self.zones {
                if !record.zones.contains(zone) {
                    record.zones.push(zone.clone());
                }
            }
        } else {
            record.zones = self.zones.clone();
        }
        record.marinus_updated = self.updated_at;
        if !record.sources.contains(&self.source) {
            record.sources.push(self.source.clone());
        }
    }
}
