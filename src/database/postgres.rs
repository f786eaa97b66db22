// src/database/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{CertificateStore, JobStatus, JobTracker, ZoneProvider};
use crate::config::DatabaseConfig;
use crate::types::{CertificateRecord, CertificateUpdate, CtLogType};

const SELECT_CERTIFICATE: &str = r#"
    SELECT fingerprint_sha256, subject_organization_name, subject_common_names,
           subject_dns_names, issuer_common_name, serial_number, not_before, not_after,
           raw, ct_log_type, zones, sources, source_ids, is_expired, marinus_updated
    FROM ct_certificates
    WHERE fingerprint_sha256 = $1
"#;

/// PostgreSQL database backend
pub struct PostgresBackend {
    pool: PgPool,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PostgresBackend {
    /// Create new PostgreSQL backend
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let cleaned_url = Self::clean_connection_string(&config.url);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&cleaned_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        info!("Connected to PostgreSQL successfully");

        Ok(Self {
            pool,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    /// Remove connection string parameters sqlx does not recognize
    fn clean_connection_string(url_str: &str) -> String {
        use url::Url;

        let Ok(mut url) = Url::parse(url_str) else {
            return url_str.to_string();
        };

        let unsupported_params = ["channel_binding"];
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !unsupported_params.contains(&key.as_ref()))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        url.to_string()
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        let statements = [
            (
                r#"
                CREATE TABLE IF NOT EXISTS ct_certificates (
                    fingerprint_sha256 TEXT PRIMARY KEY,
                    subject_organization_name TEXT[] NOT NULL DEFAULT '{}',
                    subject_common_names TEXT[] NOT NULL DEFAULT '{}',
                    subject_dns_names TEXT[] NOT NULL DEFAULT '{}',
                    issuer_common_name TEXT[] NOT NULL DEFAULT '{}',
                    serial_number TEXT NOT NULL,
                    not_before BIGINT NOT NULL,
                    not_after BIGINT NOT NULL,
                    raw TEXT NOT NULL,
                    ct_log_type TEXT NOT NULL,
                    zones TEXT[] NOT NULL DEFAULT '{}',
                    sources TEXT[] NOT NULL DEFAULT '{}',
                    source_ids JSONB NOT NULL DEFAULT '{}'::jsonb,
                    is_expired BOOLEAN NOT NULL DEFAULT FALSE,
                    marinus_updated BIGINT NOT NULL
                )
                "#,
                "Failed to create ct_certificates table",
            ),
            (
                r#"
                CREATE INDEX IF NOT EXISTS idx_ct_certificates_source_ids
                ON ct_certificates USING GIN (source_ids)
                "#,
                "Failed to create index on source_ids",
            ),
            (
                r#"
                CREATE INDEX IF NOT EXISTS idx_ct_certificates_unexpired
                ON ct_certificates(not_after)
                WHERE is_expired = FALSE
                "#,
                "Failed to create index on not_after",
            ),
            (
                r#"
                CREATE TABLE IF NOT EXISTS jobs (
                    job_name TEXT PRIMARY KEY,
                    status TEXT NOT NULL,
                    updated BIGINT NOT NULL
                )
                "#,
                "Failed to create jobs table",
            ),
            (
                r#"
                CREATE TABLE IF NOT EXISTS zones (
                    zone TEXT PRIMARY KEY,
                    status TEXT
                )
                "#,
                "Failed to create zones table",
            ),
        ];

        for (sql, failure) in statements {
            sqlx::query(sql).execute(&self.pool).await.context(failure)?;
        }

        info!("Database migrations completed successfully");

        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run `op`, retrying dropped connections up to `max_attempts` times
    async fn with_retry<T, F, Fut>(&self, what: &'static str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if Self::is_connection_error(&e) && attempt < self.max_attempts => {
                    warn!(
                        "Failed to reach the database ({}), attempt {}/{}. Retrying in {:?}",
                        e, attempt, self.max_attempts, self.retry_delay
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) if Self::is_connection_error(&e) => {
                    error!("Exceeded the max number of database connection attempts");
                    return Err(anyhow::Error::new(e).context(what));
                }
                Err(e) => return Err(anyhow::Error::new(e).context(what)),
            }
        }
    }

    fn is_connection_error(e: &sqlx::Error) -> bool {
        matches!(
            e,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
        )
    }

    fn row_to_record(row: &PgRow) -> Result<CertificateRecord> {
        let ct_log_type: String = row.try_get("ct_log_type")?;
        let source_ids: Json<BTreeMap<String, u64>> = row.try_get("source_ids")?;

        Ok(CertificateRecord {
            fingerprint_sha256: row.try_get("fingerprint_sha256")?,
            subject_organization_name: row.try_get("subject_organization_name")?,
            subject_common_names: row.try_get("subject_common_names")?,
            subject_dns_names: row.try_get("subject_dns_names")?,
            issuer_common_name: row.try_get("issuer_common_name")?,
            serial_number: row.try_get("serial_number")?,
            not_before: from_unix(row.try_get("not_before")?)?,
            not_after: from_unix(row.try_get("not_after")?)?,
            raw: row.try_get("raw")?,
            ct_log_type: CtLogType::parse(&ct_log_type)
                .ok_or_else(|| anyhow::anyhow!("Unknown ct_log_type {}", ct_log_type))?,
            zones: row.try_get("zones")?,
            sources: row.try_get("sources")?,
            source_ids: source_ids.0,
            is_expired: row.try_get("is_expired")?,
            marinus_updated: from_unix(row.try_get("marinus_updated")?)?,
        })
    }
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {}", secs))
}

#[async_trait]
impl CertificateStore for PostgresBackend {
    async fn count_fingerprint(&self, fingerprint: &str) -> Result<u64> {
        let pool = &self.pool;
        let row = self
            .with_retry("Failed to count certificates", || {
                sqlx::query(
                    "SELECT COUNT(*) AS total FROM ct_certificates WHERE fingerprint_sha256 = $1",
                )
                .bind(fingerprint)
                .fetch_one(pool)
            })
            .await?;

        Ok(row.try_get::<i64, _>("total")? as u64)
    }

    async fn insert(&self, record: &CertificateRecord) -> Result<()> {
        let pool = &self.pool;
        self.with_retry("Failed to insert certificate", || {
            sqlx::query(
                r#"
                INSERT INTO ct_certificates (
                    fingerprint_sha256, subject_organization_name, subject_common_names,
                    subject_dns_names, issuer_common_name, serial_number, not_before, not_after,
                    raw, ct_log_type, zones, sources, source_ids, is_expired, marinus_updated
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(&record.fingerprint_sha256)
            .bind(&record.subject_organization_name)
            .bind(&record.subject_common_names)
            .bind(&record.subject_dns_names)
            .bind(&record.issuer_common_name)
            .bind(&record.serial_number)
            .bind(record.not_before.timestamp())
            .bind(record.not_after.timestamp())
            .bind(&record.raw)
            .bind(record.ct_log_type.as_str())
            .bind(&record.zones)
            .bind(&record.sources)
            .bind(Json(&record.source_ids))
            .bind(record.is_expired)
            .bind(record.marinus_updated.timestamp())
            .execute(pool)
        })
        .await?;

        debug!("Inserted certificate {}", record.fingerprint_sha256);

        Ok(())
    }

    async fn update_existing(&self, fingerprint: &str, update: &CertificateUpdate) -> Result<u64> {
        let pool = &self.pool;
        let result = self
            .with_retry("Failed to update certificate", || {
                sqlx::query(
                    r#"
                    UPDATE ct_certificates SET
                        source_ids = source_ids || jsonb_build_object($2::TEXT, $3::BIGINT),
                        ct_log_type = $4,
                        zones = CASE WHEN $5::BOOLEAN
                            THEN zones || ARRAY(
                                SELECT z FROM unnest($6::TEXT[]) WITH ORDINALITY AS t(z, ord)
                                WHERE NOT (z = ANY(zones))
                                ORDER BY ord)
                            ELSE $6::TEXT[]
                        END,
                        marinus_updated = $7,
                        sources = CASE WHEN $2::TEXT = ANY(sources)
                            THEN sources
                            ELSE array_append(sources, $2::TEXT)
                        END
                    WHERE fingerprint_sha256 = $1
                    "#,
                )
                .bind(fingerprint)
                .bind(&update.source)
                .bind(update.index as i64)
                .bind(update.ct_log_type.as_str())
                .bind(update.merge_zones)
                .bind(&update.zones)
                .bind(update.updated_at.timestamp())
                .execute(pool)
            })
            .await?;

        Ok(result.rows_affected())
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<CertificateRecord>> {
        let pool = &self.pool;
        let row = self
            .with_retry("Failed to fetch certificate", || {
                sqlx::query(SELECT_CERTIFICATE)
                    .bind(fingerprint)
                    .fetch_optional(pool)
            })
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn highest_source_index(&self, source: &str) -> Result<Option<u64>> {
        let pool = &self.pool;
        let row = self
            .with_retry("Failed to fetch highest source index", || {
                sqlx::query(
                    r#"
                    SELECT MAX((source_ids ->> $1)::BIGINT) AS max_index
                    FROM ct_certificates
                    WHERE source_ids ? $1
                    "#,
                )
                .bind(source)
                .fetch_one(pool)
            })
            .await?;

        Ok(row
            .try_get::<Option<i64>, _>("max_index")?
            .map(|i| i as u64))
    }

    async fn mark_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let pool = &self.pool;
        let result = self
            .with_retry("Failed to mark expired certificates", || {
                sqlx::query(
                    r#"
                    UPDATE ct_certificates SET is_expired = TRUE
                    WHERE not_after < $1 AND is_expired = FALSE
                    "#,
                )
                .bind(now.timestamp())
                .execute(pool)
            })
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JobTracker for PostgresBackend {
    async fn set_status(&self, job_name: &str, status: JobStatus) -> Result<()> {
        let pool = &self.pool;
        let now = Utc::now().timestamp();
        self.with_retry("Failed to update job status", || {
            sqlx::query(
                r#"
                INSERT INTO jobs (job_name, status, updated)
                VALUES ($1, $2, $3)
                ON CONFLICT (job_name)
                DO UPDATE SET status = $2, updated = $3
                "#,
            )
            .bind(job_name)
            .bind(status.as_str())
            .bind(now)
            .execute(pool)
        })
        .await?;

        debug!("Job {} is now {}", job_name, status.as_str());

        Ok(())
    }

    async fn status(&self, job_name: &str) -> Result<Option<JobStatus>> {
        let pool = &self.pool;
        let row = self
            .with_retry("Failed to fetch job status", || {
                sqlx::query("SELECT status FROM jobs WHERE job_name = $1")
                    .bind(job_name)
                    .fetch_optional(pool)
            })
            .await?;

        match row {
            Some(row) => {
                let status: String = row.try_get("status")?;
                Ok(JobStatus::parse(&status))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ZoneProvider for PostgresBackend {
    async fn distinct_zones(&self) -> Result<Vec<String>> {
        let pool = &self.pool;
        let rows = self
            .with_retry("Failed to fetch tracked zones", || {
                sqlx::query(
                    r#"
                    SELECT DISTINCT zone FROM zones
                    WHERE status IS DISTINCT FROM 'false_positive'
                    ORDER BY zone
                    "#,
                )
                .fetch_all(pool)
            })
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("zone").map_err(Into::into))
            .collect()
    }
}
