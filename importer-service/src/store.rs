use std::time::Duration;

use recorder_client::{
    db,
    domain::{StatisticPoint, StatisticsMetadata},
};
use sqlx::PgPool;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("statistics store unavailable: {0}")]
    Unavailable(String),
}

/// Narrow seam over the external statistic store: read the last persisted
/// point, append a batch. Tests substitute an in-memory implementation.
#[async_trait::async_trait]
pub trait StatisticsStore: Send + Sync {
    async fn last_point(&self, statistic_id: &str) -> Result<Option<StatisticPoint>, StoreError>;

    /// Persist a batch atomically: either the whole batch lands or none of it.
    async fn add_batch(
        &self,
        meta: &StatisticsMetadata,
        points: &[StatisticPoint],
    ) -> Result<(), StoreError>;
}

/// Production store backed by the recorder database.
pub struct PgStatisticsStore {
    pool: PgPool,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgStatisticsStore {
    pub fn new(pool: PgPool, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            max_retries,
            retry_backoff,
        }
    }

    async fn write_batch(
        &self,
        meta: &StatisticsMetadata,
        points: &[StatisticPoint],
    ) -> anyhow::Result<()> {
        db::upsert_metadata(&self.pool, meta).await?;
        db::insert_statistics(&self.pool, &meta.statistic_id, points).await
    }
}

#[async_trait::async_trait]
impl StatisticsStore for PgStatisticsStore {
    async fn last_point(&self, statistic_id: &str) -> Result<Option<StatisticPoint>, StoreError> {
        db::last_statistic(&self.pool, statistic_id)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn add_batch(
        &self,
        meta: &StatisticsMetadata,
        points: &[StatisticPoint],
    ) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            match self.write_batch(meta, points).await {
                Ok(()) => {
                    metrics::counter!("statistics_written_total").increment(points.len() as u64);
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "statistics batch write failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "statistics batch write failed, giving up");
                    metrics::counter!("statistics_store_errors_total").increment(1);
                    return Err(StoreError::Unavailable(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    };

    use super::*;

    /// In-memory stand-in for the recorder, shared between importer and
    /// coordinator tests.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub points: Mutex<Vec<StatisticPoint>>,
        pub fail_writes: AtomicBool,
    }

    impl MemoryStore {
        pub fn with_last_point(point: StatisticPoint) -> Self {
            let store = Self::default();
            store.points.lock().unwrap().push(point);
            store
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl StatisticsStore for MemoryStore {
        async fn last_point(
            &self,
            _statistic_id: &str,
        ) -> Result<Option<StatisticPoint>, StoreError> {
            let points = self.points.lock().unwrap();
            Ok(points.iter().max_by_key(|p| p.start).cloned())
        }

        async fn add_batch(
            &self,
            _meta: &StatisticsMetadata,
            points: &[StatisticPoint],
        ) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("writes disabled".to_string()));
            }
            self.points.lock().unwrap().extend_from_slice(points);
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl StatisticsStore for Arc<MemoryStore> {
        async fn last_point(
            &self,
            statistic_id: &str,
        ) -> Result<Option<StatisticPoint>, StoreError> {
            self.as_ref().last_point(statistic_id).await
        }

        async fn add_batch(
            &self,
            meta: &StatisticsMetadata,
            points: &[StatisticPoint],
        ) -> Result<(), StoreError> {
            self.as_ref().add_batch(meta, points).await
        }
    }
}
