use recorder_client::domain::{Reading, StatisticPoint, StatisticsMetadata};
use time::{OffsetDateTime, UtcOffset};

use crate::store::{StatisticsStore, StoreError};

/// How far the import has progressed: the timestamp of the last record
/// covered by a previous import and the cumulative sum up to it.
///
/// The cursor only ever moves forward, and only after the batch that moved
/// it was persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportCursor {
    pub last_imported_time: Option<OffsetDateTime>,
    pub running_sum: f64,
}

/// Truncate a timestamp to the start of its hour, in UTC.
fn hour_start(ts: OffsetDateTime) -> OffsetDateTime {
    let ts = ts.to_offset(UtcOffset::UTC);
    let t = ts.time();
    ts - time::Duration::minutes(i64::from(t.minute()))
        - time::Duration::seconds(i64::from(t.second()))
        - time::Duration::nanoseconds(i64::from(t.nanosecond()))
}

/// Merge a fetched batch into the running cumulative sum.
///
/// `readings` must be in ascending time order. Records at or before the
/// cursor are dropped (strict `>`, a record at exactly the cursor's
/// timestamp counts as already imported). Null values produce no point and
/// do not touch the sum, but the returned cursor still lands on the last
/// surviving record's timestamp, null or not. An empty surviving set
/// returns the cursor unchanged.
pub fn merge_readings(
    readings: &[Reading],
    cursor: &ImportCursor,
) -> (Vec<StatisticPoint>, ImportCursor) {
    let new_readings: Vec<&Reading> = readings
        .iter()
        .filter(|r| match cursor.last_imported_time {
            Some(last) => r.time > last,
            None => true,
        })
        .collect();

    let Some(last) = new_readings.last() else {
        return (Vec::new(), cursor.clone());
    };

    let mut running_sum = cursor.running_sum;
    let mut points = Vec::with_capacity(new_readings.len());

    for reading in &new_readings {
        let Some(value) = reading.value else {
            continue;
        };

        running_sum += value;
        points.push(StatisticPoint {
            start: hour_start(reading.time),
            sum: running_sum,
            state: value,
        });
    }

    let next = ImportCursor {
        last_imported_time: Some(last.time),
        running_sum,
    };

    (points, next)
}

/// Stateful wrapper around [`merge_readings`]: loads the cursor from the
/// store on first use, persists emitted batches, and advances the cursor
/// only after the write succeeded.
pub struct StatisticsImporter<S> {
    store: S,
    metadata: StatisticsMetadata,
    cursor: Option<ImportCursor>,
}

impl<S: StatisticsStore> StatisticsImporter<S> {
    pub fn new(store: S, metadata: StatisticsMetadata) -> Self {
        Self {
            store,
            metadata,
            cursor: None,
        }
    }

    /// In-memory cursor position. `None` until the first import after
    /// process start, which makes the first fetch fall back to the bounded
    /// historical window.
    pub fn last_imported_time(&self) -> Option<OffsetDateTime> {
        self.cursor.as_ref().and_then(|c| c.last_imported_time)
    }

    async fn load_cursor(&self) -> Result<ImportCursor, StoreError> {
        let cursor = match self.store.last_point(&self.metadata.statistic_id).await? {
            Some(point) => {
                tracing::debug!(
                    sum = point.sum,
                    start = %point.start,
                    "resuming from last persisted statistic"
                );
                ImportCursor {
                    last_imported_time: Some(point.start),
                    running_sum: point.sum,
                }
            }
            None => ImportCursor::default(),
        };
        Ok(cursor)
    }

    /// Import a fetched batch, returning the number of statistic points
    /// written. On any store failure the cursor stays where it was, so the
    /// next poll re-fetches from the last good position.
    pub async fn import(&mut self, readings: &[Reading]) -> Result<usize, StoreError> {
        if readings.is_empty() {
            return Ok(0);
        }

        let cursor = match &self.cursor {
            Some(c) => c.clone(),
            None => self.load_cursor().await?,
        };

        let (points, next) = merge_readings(readings, &cursor);

        if points.is_empty() {
            tracing::debug!("no new records to import");
        } else {
            tracing::info!(points = points.len(), "importing statistics batch");
            self.store.add_batch(&self.metadata, &points).await?;
        }

        self.cursor = Some(next);
        Ok(points.len())
    }
}
