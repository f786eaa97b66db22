// src/ct_log/retry.rs
use std::time::Duration;

use crate::config::RetryConfig;

/// Transport and application retry settings for CT log requests.
///
/// Built once from configuration and handed to the client; holds no
/// per-request state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Transport-tier retries for connection errors and forcelisted statuses
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
    pub status_forcelist: Vec<u16>,
    pub request_timeout: Duration,
    /// Pause before the single application-tier retry of a failed fetch
    pub failure_retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: Duration::from_secs(config.backoff_factor_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            status_forcelist: config.status_forcelist.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            failure_retry_delay: Duration::from_secs(config.failure_retry_delay_secs),
        }
    }

    /// Sleep before transport retry number `retry` (1-based).
    ///
    /// The first retry is immediate, later ones back off as
    /// `factor * 2^(retry - 1)` up to `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let multiplier = 2u32.saturating_pow(retry - 1);
        std::cmp::min(
            self.backoff_factor.saturating_mul(multiplier),
            self.max_backoff,
        )
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
