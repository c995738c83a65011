use crate::common::error::{EtlError, Result};
use crate::observability::metrics;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

pub mod fdic;

pub use fdic::FdicSource;

/// One source record as fetched: a flat field map, canonicalized downstream
/// by the normalizer.
pub type RawRecord = Map<String, Value>;

/// A paged record source. `total` is the metadata probe; sources without a
/// reliable count return `Ok(None)` and are paged until an empty page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn total(&self) -> Result<Option<u64>>;

    async fn page(&self, limit: u64, offset: u64) -> Result<Vec<RawRecord>>;
}

/// The result of paging a source to exhaustion, or as far as it got.
///
/// `complete == false` means a page failed: `records` holds everything
/// fetched before the failure and `failed_at_offset` names the first offset
/// that was not retrieved. Callers must not treat a partial extract as a full
/// one; the extract manifest persists both fields.
#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub complete: bool,
    pub failed_at_offset: Option<u64>,
    pub total: Option<u64>,
}

/// Build the process-scoped HTTP client. Constructed once at startup and
/// passed into each source; the timeout is the deadline at the network
/// boundary, since the upstream API has none.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Page through `source` and accumulate every record.
///
/// With a known total this issues `ceil(total / page_size)` requests at
/// offsets `0, L, 2L, …`; without one it pages until an empty page comes
/// back. A page failure stops pagination: no further offsets are attempted
/// and the records fetched so far are returned with `complete = false`.
/// Retry is the calling scheduler's concern, not this function's.
pub async fn fetch_all(source: &dyn PageSource, page_size: u64) -> Result<FetchOutcome> {
    if page_size == 0 {
        return Err(EtlError::Config("page size must be positive".to_string()));
    }

    let total = source.total().await?;
    let mut records: Vec<RawRecord> = Vec::new();
    let mut offset = 0u64;

    loop {
        match total {
            Some(t) if offset >= t => break,
            None => {}
            Some(_) => {}
        }

        match source.page(page_size, offset).await {
            Ok(batch) => {
                metrics::fetch::page_success();
                if batch.is_empty() && total.is_none() {
                    break;
                }
                records.extend(batch);
                offset += page_size;
            }
            Err(e) => {
                warn!(offset, error = %e, "page fetch failed, returning partial extract");
                metrics::fetch::page_error();
                metrics::fetch::records_fetched(records.len());
                return Ok(FetchOutcome {
                    records,
                    complete: false,
                    failed_at_offset: Some(offset),
                    total,
                });
            }
        }
    }

    info!(
        records = records.len(),
        total = ?total,
        "pagination complete"
    );
    metrics::fetch::records_fetched(records.len());
    Ok(FetchOutcome {
        records,
        complete: true,
        failed_at_offset: None,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted source: serves `record_count` records in `limit`-sized pages,
    /// optionally failing at one offset, recording every requested offset.
    struct ScriptedSource {
        total: Option<u64>,
        record_count: u64,
        fail_at: Option<u64>,
        requested: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn new(total: Option<u64>, record_count: u64, fail_at: Option<u64>) -> Self {
            Self {
                total,
                record_count,
                fail_at,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn offsets(&self) -> Vec<u64> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn total(&self) -> Result<Option<u64>> {
            Ok(self.total)
        }

        async fn page(&self, limit: u64, offset: u64) -> Result<Vec<RawRecord>> {
            self.requested.lock().unwrap().push(offset);
            if self.fail_at == Some(offset) {
                return Err(EtlError::Fetch {
                    offset,
                    message: "scripted failure".to_string(),
                });
            }
            let remaining = self.record_count.saturating_sub(offset);
            let count = remaining.min(limit);
            Ok((0..count)
                .map(|i| {
                    let mut record = RawRecord::new();
                    record.insert("ID".to_string(), serde_json::json!(offset + i));
                    record
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn issues_ceil_total_over_limit_requests() {
        let source = ScriptedSource::new(Some(25_000), 25_000, None);
        let outcome = fetch_all(&source, 10_000).await.unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.records.len(), 25_000);
        assert_eq!(source.offsets(), vec![0, 10_000, 20_000]);
    }

    #[tokio::test]
    async fn page_failure_returns_partial_and_stops() {
        let source = ScriptedSource::new(Some(25_000), 25_000, Some(10_000));
        let outcome = fetch_all(&source, 10_000).await.unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.records.len(), 10_000);
        assert_eq!(outcome.failed_at_offset, Some(10_000));
        // No page after the failing one is attempted.
        assert_eq!(source.offsets(), vec![0, 10_000]);
    }

    #[tokio::test]
    async fn unknown_total_pages_until_empty_page() {
        let source = ScriptedSource::new(None, 15_000, None);
        let outcome = fetch_all(&source, 10_000).await.unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.records.len(), 15_000);
        // The short page does not terminate; the empty page at 20k does.
        assert_eq!(source.offsets(), vec![0, 10_000, 20_000]);
    }

    #[tokio::test]
    async fn zero_total_fetches_nothing() {
        let source = ScriptedSource::new(Some(0), 0, None);
        let outcome = fetch_all(&source, 10_000).await.unwrap();
        assert!(outcome.complete);
        assert!(outcome.records.is_empty());
        assert!(source.offsets().is_empty());
    }

    #[tokio::test]
    async fn zero_page_size_is_a_config_error() {
        let source = ScriptedSource::new(Some(10), 10, None);
        assert!(matches!(
            fetch_all(&source, 0).await,
            Err(EtlError::Config(_))
        ));
    }
}
