// src/ct_log/client.rs
use anyhow::Context;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::retry::RetryPolicy;
use super::types::{GetEntriesResponse, LeafEntry, SignedTreeHead};

/// Failures that end a crawl run
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("too many timeouts requesting {url}")]
    Timeout { url: String },

    #[error("connection error requesting {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("request error for {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("no usable result from {url} after delayed retry")]
    Unavailable { url: String },

    #[error("unparseable response from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// HTTP client for Certificate Transparency log RFC 6962 API
pub struct CtLogClient {
    base_url: String,
    http_client: reqwest::Client,
    policy: RetryPolicy,
}

impl CtLogClient {
    /// Create a new CT log client
    pub fn new(base_url: String, policy: RetryPolicy) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get Signed Tree Head (current log size)
    /// Endpoint: GET {base_url}/ct/v1/get-sth
    pub async fn get_sth(&self) -> Result<SignedTreeHead, FetchError> {
        let url = format!("{}/ct/v1/get-sth", self.base_url);

        let sth: SignedTreeHead = self
            .fetch_usable(&url, |sth: SignedTreeHead| Some(sth))
            .await?;

        debug!(
            "STH received: tree_size={}, timestamp={}",
            sth.tree_size, sth.timestamp
        );

        Ok(sth)
    }

    /// Get entries `start..=end` from the log.
    /// Endpoint: GET {base_url}/ct/v1/get-entries?start={start}&end={end}
    ///
    /// Logs cap the number of entries per response, so fewer than requested
    /// may come back. Indices are assigned from `start` in response order.
    pub async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<LeafEntry>, FetchError> {
        let url = format!(
            "{}/ct/v1/get-entries?start={}&end={}",
            self.base_url, start, end
        );

        debug!("Fetching entries {}-{} from {}", start, end, self.base_url);

        let entries = self
            .fetch_usable(&url, |response: GetEntriesResponse| {
                if response.entries.is_empty() {
                    None
                } else {
                    Some(response.entries)
                }
            })
            .await?;

        debug!(
            "Received {} entries from {}",
            entries.len(),
            self.base_url
        );

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(offset, raw)| LeafEntry::from_raw(start + offset as u64, raw))
            .collect())
    }

    /// Application tier: one delayed retry when a request yields nothing usable,
    /// then give up.
    async fn fetch_usable<T, U, F>(&self, url: &str, usable: F) -> Result<U, FetchError>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Option<U>,
    {
        for attempt in 0..2 {
            if let Some(body) = self.request_with_timeout_retry(url).await? {
                let parsed: T = serde_json::from_str(&body).map_err(|e| FetchError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

                match usable(parsed) {
                    Some(value) => return Ok(value),
                    None => warn!("Empty response from {}", url),
                }
            }

            if attempt == 0 {
                error!(
                    "No usable result from {}. Retrying in {:?}",
                    url, self.policy.failure_retry_delay
                );
                tokio::time::sleep(self.policy.failure_retry_delay).await;
            }
        }

        Err(FetchError::Unavailable {
            url: url.to_string(),
        })
    }

    /// A first timeout is retried immediately, a second one is fatal
    async fn request_with_timeout_retry(&self, url: &str) -> Result<Option<String>, FetchError> {
        match self.request(url).await {
            Err(FetchError::Timeout { .. }) => {
                warn!("Timeout occurred requesting {}. Attempting again...", url);
                self.request(url).await
            }
            other => other,
        }
    }

    /// Transport tier: retry connection errors and forcelisted statuses with
    /// backoff. Returns `Ok(None)` for HTTP error statuses once retries are spent.
    async fn request(&self, url: &str) -> Result<Option<String>, FetchError> {
        let mut retries = 0;

        loop {
            let error = match self.http_client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == reqwest::StatusCode::OK {
                        return response
                            .text()
                            .await
                            .map(Some)
                            .map_err(|e| Self::classify(url, e));
                    }

                    if self.policy.should_retry_status(status.as_u16())
                        && retries < self.policy.max_retries
                    {
                        retries += 1;
                        let backoff = self.policy.backoff(retries);
                        warn!(
                            "Status {} from {} (retry {}/{}). Retrying in {:?}",
                            status, url, retries, self.policy.max_retries, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    warn!("HTTP error {} while fetching {}", status, url);
                    return Ok(None);
                }
                Err(e) => Self::classify(url, e),
            };

            match error {
                FetchError::Connection { .. } if retries < self.policy.max_retries => {
                    retries += 1;
                    let backoff = self.policy.backoff(retries);
                    warn!(
                        "{} (retry {}/{}). Retrying in {:?}",
                        error, retries, self.policy.max_retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return Err(other),
            }
        }
    }

    fn classify(url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            FetchError::Connection {
                url: url.to_string(),
                reason: e.to_string(),
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_factor: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            status_forcelist: vec![408, 500, 502, 503, 504],
            request_timeout: Duration::from_millis(500),
            failure_retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_get_sth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree_size": 300,
                "timestamp": 1700000000000u64,
                "sha256_root_hash": "abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        let sth = client.get_sth().await.unwrap();
        assert_eq!(sth.tree_size, 300);
    }

    #[tokio::test]
    async fn test_get_entries_assigns_indices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .and(query_param("start", "10"))
            .and(query_param("end", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [
                    {"leaf_input": "AAAA", "extra_data": ""},
                    {"leaf_input": "BBBB"}
                ]
            })))
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        let entries = client.get_entries(10, 20).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 10);
        assert_eq!(entries[1].index, 11);
        assert!(entries[1].extra_data.is_none());
    }

    #[tokio::test]
    async fn test_forcelisted_status_retried_then_soft_failure_then_unavailable() {
        let server = MockServer::start().await;
        // 2 application attempts x (1 + 2 transport retries)
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .respond_with(ResponseTemplate::new(503))
            .expect(6)
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        let err = client.get_entries(0, 5).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_non_forcelisted_status_not_retried_at_transport_tier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        let err = client.get_sth().await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_delayed_retry_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"tree_size": 5})),
            )
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        assert_eq!(client.get_sth().await.unwrap().tree_size, 5);
    }

    #[tokio::test]
    async fn test_empty_entries_is_not_usable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"entries": []})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        assert!(matches!(
            client.get_entries(0, 5).await,
            Err(FetchError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_timeout_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"tree_size": 5}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        assert!(matches!(
            client.get_sth().await,
            Err(FetchError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"tree_size": 5}))
                    .set_delay(Duration::from_secs(3)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"tree_size": 9})),
            )
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        assert_eq!(client.get_sth().await.unwrap().tree_size, 9);
    }

    #[tokio::test]
    async fn test_malformed_json_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let client = CtLogClient::new(server.uri(), fast_policy()).unwrap();
        assert!(matches!(
            client.get_sth().await,
            Err(FetchError::Body { .. })
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_fatal_after_retries() {
        // Bind then drop a listener to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CtLogClient::new(format!("http://{}", addr), fast_policy()).unwrap();
        assert!(matches!(
            client.get_sth().await,
            Err(FetchError::Connection { .. })
        ));
    }
}
