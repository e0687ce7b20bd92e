use time::OffsetDateTime;

/// Statistic identifier the water importer writes under.
pub const STATISTIC_ID: &str = "sensor.hofor_water_consumption";

/// One hour-bucketed cumulative-sum sample persisted to the recorder.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StatisticPoint {
    /// Start of the hour the sample belongs to (UTC).
    pub start: OffsetDateTime,
    /// Running cumulative consumption up to and including this sample.
    pub sum: f64,
    /// Consumption reported by the source row itself.
    pub state: f64,
}

/// Fixed metadata describing an external statistic series.
#[derive(Debug, Clone)]
pub struct StatisticsMetadata {
    pub statistic_id: String,
    pub source: String,
    pub name: String,
    pub unit_of_measurement: String,
    pub has_mean: bool,
    pub has_sum: bool,
}

impl StatisticsMetadata {
    /// Metadata for the imported water consumption series.
    pub fn water_consumption() -> Self {
        Self {
            statistic_id: STATISTIC_ID.to_string(),
            source: "hofor_water".to_string(),
            name: "HOFOR Water Consumption".to_string(),
            unit_of_measurement: "m³".to_string(),
            has_mean: false,
            has_sum: true,
        }
    }
}
