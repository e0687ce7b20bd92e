use std::time::{Duration, Instant};

use recorder_client::domain::Reading;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};

use crate::{
    importer::StatisticsImporter,
    influx::{FetchError, ReadingsSource},
    store::{StatisticsStore, StoreError},
};

/// Snapshot of the most recent successful poll, held for presentation.
///
/// `latest_value`/`latest_time` come from the last fetched reading whether
/// or not it produced a statistic point; `imported_count` is the number of
/// points written during this poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub readings: Vec<Reading>,
    pub latest_value: Option<f64>,
    pub latest_time: Option<OffsetDateTime>,
    pub imported_count: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(#[from] FetchError),
    #[error("statistics import failed: {0}")]
    Import(#[from] StoreError),
}

/// Handle for requesting a poll outside the schedule. A request that
/// arrives while one is already pending is dropped.
#[derive(Clone)]
pub struct RefreshHandle(mpsc::Sender<()>);

impl RefreshHandle {
    pub fn request(&self) {
        let _ = self.0.try_send(());
    }
}

/// Drives the fetch → import cycle on a fixed cadence.
///
/// The run loop is a single task, so one poll is in flight at a time and a
/// manual refresh lands between polls, never inside one. A failed poll
/// keeps the previous result and cursor; retry waits for the next tick.
pub struct PollCoordinator<F, S> {
    source: F,
    importer: StatisticsImporter<S>,
    poll_interval: Duration,
    data: Option<PollResult>,
    published: watch::Sender<Option<PollResult>>,
    refresh_tx: mpsc::Sender<()>,
    refresh_rx: mpsc::Receiver<()>,
}

impl<F, S> PollCoordinator<F, S>
where
    F: ReadingsSource,
    S: StatisticsStore,
{
    pub fn new(
        source: F,
        importer: StatisticsImporter<S>,
        poll_interval_hours: u32,
    ) -> (Self, watch::Receiver<Option<PollResult>>) {
        let (published, subscriber) = watch::channel(None);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);

        let coordinator = Self {
            source,
            importer,
            poll_interval: Duration::from_secs(u64::from(poll_interval_hours) * 3600),
            data: None,
            published,
            refresh_tx,
            refresh_rx,
        };

        (coordinator, subscriber)
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle(self.refresh_tx.clone())
    }

    /// Latest successful result, retained across failed polls.
    pub fn data(&self) -> Option<&PollResult> {
        self.data.as_ref()
    }

    /// One fetch + import cycle.
    ///
    /// The fetch range starts at the in-memory cursor; at process start that
    /// is `None`, so the first poll covers the bounded historical window and
    /// relies on the importer's strict in-process filter for dedup.
    pub async fn poll(&mut self) -> Result<PollResult, PollError> {
        let started = Instant::now();
        let since = self.importer.last_imported_time();

        let readings = self.source.fetch(since).await?;
        let imported_count = self.importer.import(&readings).await?;

        let latest_value = readings.last().and_then(|r| r.value);
        let latest_time = readings.last().map(|r| r.time);
        let result = PollResult {
            readings,
            latest_value,
            latest_time,
            imported_count,
        };

        metrics::histogram!("poll_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("statistics_imported_total").increment(imported_count as u64);
        tracing::info!(
            records = result.readings.len(),
            imported = imported_count,
            "poll complete"
        );

        self.data = Some(result.clone());
        let _ = self.published.send(self.data.clone());

        Ok(result)
    }

    /// Run until the process shuts down. The first tick fires immediately,
    /// then once per poll interval; a manual refresh triggers an extra poll.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(()) = self.refresh_rx.recv() => {
                    tracing::info!("manual refresh requested");
                }
            }

            if let Err(e) = self.poll().await {
                metrics::counter!("poll_failures_total").increment(1);
                tracing::error!(error = %e, "poll failed; keeping previous data until the next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use recorder_client::domain::StatisticsMetadata;
    use time::macros::datetime;

    use super::*;
    use crate::store::testing::MemoryStore;

    struct FakeSource {
        batches: Mutex<VecDeque<Result<Vec<Reading>, FetchError>>>,
        requests: Mutex<Vec<Option<OffsetDateTime>>>,
    }

    impl FakeSource {
        fn new(batches: Vec<Result<Vec<Reading>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ReadingsSource for Arc<FakeSource> {
        async fn fetch(
            &self,
            since: Option<OffsetDateTime>,
        ) -> Result<Vec<Reading>, FetchError> {
            self.requests.lock().unwrap().push(since);
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn reading(time: OffsetDateTime, value: Option<f64>) -> Reading {
        Reading { time, value }
    }

    fn coordinator(
        source: Arc<FakeSource>,
        store: Arc<MemoryStore>,
    ) -> PollCoordinator<Arc<FakeSource>, Arc<MemoryStore>> {
        let importer = StatisticsImporter::new(store, StatisticsMetadata::water_consumption());
        PollCoordinator::new(source, importer, 1).0
    }

    #[tokio::test]
    async fn empty_fetch_produces_empty_result_and_keeps_cursor() {
        let source = FakeSource::new(vec![Ok(Vec::new()), Ok(Vec::new())]);
        let store = Arc::new(MemoryStore::default());
        let mut coordinator = coordinator(source.clone(), store);

        let result = coordinator.poll().await.expect("poll should succeed");
        assert_eq!(result.latest_value, None);
        assert_eq!(result.latest_time, None);
        assert_eq!(result.imported_count, 0);

        coordinator.poll().await.expect("second poll should succeed");
        // No import happened, so both fetches fall back to the full window.
        assert_eq!(*source.requests.lock().unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn successful_poll_imports_and_narrows_the_next_fetch() {
        let source = FakeSource::new(vec![
            Ok(vec![
                reading(datetime!(2024-01-01 00:00:00 UTC), Some(10.0)),
                reading(datetime!(2024-01-02 00:00:00 UTC), Some(11.0)),
            ]),
            Ok(Vec::new()),
        ]);
        let store = Arc::new(MemoryStore::default());
        let mut coordinator = coordinator(source.clone(), store.clone());

        let result = coordinator.poll().await.expect("poll should succeed");
        assert_eq!(result.imported_count, 2);
        assert_eq!(result.latest_value, Some(11.0));
        assert_eq!(result.latest_time, Some(datetime!(2024-01-02 00:00:00 UTC)));
        assert_eq!(store.points.lock().unwrap().len(), 2);

        coordinator.poll().await.expect("second poll should succeed");
        assert_eq!(
            *source.requests.lock().unwrap(),
            vec![None, Some(datetime!(2024-01-02 00:00:00 UTC))]
        );
    }

    #[tokio::test]
    async fn latest_reading_is_reported_even_when_null() {
        let source = FakeSource::new(vec![Ok(vec![
            reading(datetime!(2024-01-01 00:00:00 UTC), Some(3.0)),
            reading(datetime!(2024-01-02 00:00:00 UTC), None),
        ])]);
        let store = Arc::new(MemoryStore::default());
        let mut coordinator = coordinator(source, store);

        let result = coordinator.poll().await.expect("poll should succeed");
        assert_eq!(result.imported_count, 1);
        assert_eq!(result.latest_value, None);
        assert_eq!(result.latest_time, Some(datetime!(2024-01-02 00:00:00 UTC)));
    }

    #[tokio::test]
    async fn fetch_failure_retains_previous_result_and_cursor() {
        let source = FakeSource::new(vec![
            Ok(vec![reading(datetime!(2024-01-01 00:00:00 UTC), Some(5.0))]),
            Err(FetchError::CannotConnect("connection refused".to_string())),
            Ok(Vec::new()),
        ]);
        let store = Arc::new(MemoryStore::default());
        let mut coordinator = coordinator(source.clone(), store);

        let first = coordinator.poll().await.expect("first poll should succeed");

        let err = coordinator.poll().await.expect_err("second poll should fail");
        assert!(matches!(err, PollError::DataSourceUnavailable(_)));
        assert_eq!(coordinator.data(), Some(&first));

        coordinator.poll().await.expect("third poll should succeed");
        // The failed poll did not advance the cursor.
        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[1], requests[2]);
    }

    #[tokio::test]
    async fn store_failure_fails_the_poll_without_advancing() {
        let source = FakeSource::new(vec![
            Ok(vec![reading(datetime!(2024-01-01 00:00:00 UTC), Some(5.0))]),
            Ok(vec![reading(datetime!(2024-01-01 00:00:00 UTC), Some(5.0))]),
        ]);
        let store = Arc::new(MemoryStore::default());
        let mut coordinator = coordinator(source.clone(), store.clone());

        store.set_fail_writes(true);
        let err = coordinator.poll().await.expect_err("poll should fail");
        assert!(matches!(err, PollError::Import(_)));
        assert!(coordinator.data().is_none());

        store.set_fail_writes(false);
        let result = coordinator.poll().await.expect("retry should succeed");
        assert_eq!(result.imported_count, 1);
        assert_eq!(*source.requests.lock().unwrap(), vec![None, None]);
    }
}
