// src/cursor.rs
use anyhow::Result;
use tracing::debug;

use crate::database::CertificateStore;

/// Starting log index for a run.
///
/// A non-negative override wins; otherwise resume from the highest
/// `{source}_id` already stored, or 0 for a source never crawled.
pub async fn resolve_start_index(
    store: &dyn CertificateStore,
    source: &str,
    override_index: Option<i64>,
) -> Result<u64> {
    if let Some(index) = override_index.filter(|i| *i >= 0) {
        debug!("{}: Using explicit starting index {}", source, index);
        return Ok(index as u64);
    }

    let resumed = store.highest_source_index(source).await?;
    debug!("{}: Stored high-water mark {:?}", source, resumed);

    Ok(resumed.unwrap_or(0))
}
