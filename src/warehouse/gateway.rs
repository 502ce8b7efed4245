//! Batched, order-preserving execution against the warehouse provider.
//! Grounded on a semaphore + `join_all` batching shape used elsewhere for
//! LLM query batching, adapted here to database IN-clause chunking
//! instead of model calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// One result row, column name to value, exactly as the provider returned
/// it (dialect-cased column names are normalized by the caller).
pub type Row = HashMap<String, Value>;

/// The warehouse is an external collaborator; the core only depends on
/// this narrow interface. A real implementation adapts a Snowflake or
/// PostgreSQL driver; tests use an in-memory fake.
#[async_trait::async_trait]
pub trait WarehouseProvider: Send + Sync {
    async fn query(&self, sql: &str, binds: &[String]) -> Result<Vec<Row>>;
}

/// Safety multiplier applied to the truncation guard: if concatenated
/// results exceed `inputs.len() * SAFETY_FACTOR`, the engine likely
/// ignored the `IN` clause outright (observed-in-wild defensive behavior).
const SAFETY_FACTOR: usize = 2;

const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Gateway<P: WarehouseProvider> {
    provider: Arc<P>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl<P: WarehouseProvider> Gateway<P> {
    pub fn new(provider: Arc<P>, max_concurrent_queries: usize) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(max_concurrent_queries.max(1))),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a single query, honoring cancellation and the per-call timeout.
    /// `WarehouseUnavailable` and `Timeout` are both fatal to the caller's
    /// investigation.
    pub async fn execute(
        &self,
        sql: &str,
        binds: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::Internal(format!("semaphore closed: {e}")))?;

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = tokio::time::timeout(self.timeout, self.provider.query(sql, binds)) => {
                match res {
                    Ok(Ok(rows)) => Ok(rows),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(Error::timeout("warehouse query", self.timeout.as_millis() as u64)),
                }
            }
        }
    }

    /// Fetch rows keyed by an `IN (...)` list, chunking into independent
    /// queries of at most `batch_size` values each, executed concurrently,
    /// and concatenated preserving the order of `ids` chunk-by-chunk.
    ///
    /// `build_query` receives one chunk and must produce the SQL + binds
    /// for exactly that chunk.
    pub async fn fetch_in_batches(
        &self,
        ids: &[String],
        batch_size: Option<usize>,
        cancel: &CancellationToken,
        build_query: impl Fn(&[String]) -> (String, Vec<String>) + Send + Sync,
    ) -> Result<Vec<Row>> {
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
        let chunks: Vec<&[String]> = ids.chunks(batch_size).collect();

        let futures = chunks.iter().map(|chunk| {
            let (sql, binds) = build_query(chunk);
            async move { self.execute(&sql, &binds, cancel).await }
        });

        let results = join_all(futures).await;
        let mut rows = Vec::new();
        for r in results {
            rows.extend(r?);
        }

        let limit = ids.len().saturating_mul(SAFETY_FACTOR).max(1);
        if rows.len() > limit {
            warn!(
                input_count = ids.len(),
                returned_count = rows.len(),
                limit,
                "warehouse returned far more rows than inputs; IN clause may have been \
                 ignored by the engine, truncating"
            );
            rows.truncate(limit);
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        calls: AtomicUsize,
        rows_per_call: Vec<Row>,
        overproduce: bool,
    }

    #[async_trait::async_trait]
    impl WarehouseProvider for FakeProvider {
        async fn query(&self, _sql: &str, binds: &[String]) -> Result<Vec<Row>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.overproduce {
                // Simulate an engine that ignored the IN clause entirely.
                return Ok((0..2000)
                    .map(|i| {
                        let mut row = Row::new();
                        row.insert("tx_id".into(), Value::String(format!("extra-{i}")));
                        row
                    })
                    .collect());
            }
            Ok(binds
                .iter()
                .map(|id| {
                    let mut row = Row::new();
                    row.insert("tx_id".into(), Value::String(id.clone()));
                    row
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn chunks_in_list_over_batch_size() {
        let provider = Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
            rows_per_call: vec![],
            overproduce: false,
        });
        let gateway = Gateway::new(provider.clone(), 4);
        let ids: Vec<String> = (0..501).map(|i| format!("tx-{i}")).collect();
        let cancel = CancellationToken::new();

        let rows = gateway
            .fetch_in_batches(&ids, Some(500), &cancel, |chunk| {
                (
                    format!("SELECT * FROM t WHERE id IN ({})", chunk.len()),
                    chunk.to_vec(),
                )
            })
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(rows.len(), 501);
    }

    #[tokio::test]
    async fn truncates_when_engine_ignores_in_clause() {
        let provider = Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
            rows_per_call: vec![],
            overproduce: true,
        });
        let gateway = Gateway::new(provider, 4);
        let ids: Vec<String> = (0..501).map(|i| format!("tx-{i}")).collect();
        let cancel = CancellationToken::new();

        let rows = gateway
            .fetch_in_batches(&ids, Some(500), &cancel, |chunk| {
                ("SELECT 1".to_string(), chunk.to_vec())
            })
            .await
            .unwrap();

        // 2 batches x 2000 rows = 4000, truncated to 501 * 2 = 1002.
        assert_eq!(rows.len(), 1002);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_query() {
        struct SlowProvider;
        #[async_trait::async_trait]
        impl WarehouseProvider for SlowProvider {
            async fn query(&self, _sql: &str, _binds: &[String]) -> Result<Vec<Row>> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(vec![])
            }
        }
        let gateway = Gateway::new(Arc::new(SlowProvider), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gateway.execute("SELECT 1", &[], &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
