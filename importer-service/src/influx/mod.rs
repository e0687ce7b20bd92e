mod flux_csv;

pub use flux_csv::parse_readings;

use std::time::Duration;

use recorder_client::domain::Reading;
use reqwest::StatusCode;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use crate::config::InfluxDbConfig;

pub const MEASUREMENT_WATER_CONSUMPTION: &str = "water_consumption";
pub const FIELD_VALUE: &str = "value";

/// Lookback when no prior import exists, to bound the first query.
const HISTORY_RANGE: &str = "-730d";
/// Lookback for the read-only setup probe.
const PROBE_RANGE: &str = "-30d";

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("influxdb rejected the credentials")]
    InvalidAuth,
    #[error("cannot connect to influxdb: {0}")]
    CannotConnect(String),
    #[error("influxdb query failed: {0}")]
    Query(String),
    #[error("invalid influxdb response: {0}")]
    Decode(String),
}

impl FetchError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::CannotConnect(e.to_string())
        } else {
            Self::Query(e.to_string())
        }
    }
}

/// Read side of the time-series boundary. The production implementation is
/// [`InfluxHttpClient`]; tests substitute an in-memory source.
#[async_trait::async_trait]
pub trait ReadingsSource: Send + Sync {
    /// Fetch readings in ascending time order. `since` bounds the range at
    /// the store level; the importer still re-filters with a strict
    /// comparison, so an inclusive range here is fine.
    async fn fetch(&self, since: Option<OffsetDateTime>) -> Result<Vec<Reading>, FetchError>;
}

/// Flux-over-HTTP client for InfluxDB 2.x.
pub struct InfluxHttpClient {
    http: reqwest::Client,
    url: String,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxHttpClient {
    pub fn new(cfg: &InfluxDbConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::CannotConnect(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            url: cfg.url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            org: cfg.org.clone(),
            bucket: cfg.bucket.clone(),
        })
    }

    fn consumption_flux(&self, range_start: &str) -> String {
        format!(
            r#"from(bucket: "{bucket}")
    |> range(start: {range_start})
    |> filter(fn: (r) => r["_measurement"] == "{measurement}")
    |> filter(fn: (r) => r["_field"] == "{field}")
    |> sort(columns: ["_time"])"#,
            bucket = self.bucket,
            measurement = MEASUREMENT_WATER_CONSUMPTION,
            field = FIELD_VALUE,
        )
    }

    async fn query_csv(&self, flux: &str) -> Result<String, FetchError> {
        let url = format!("{}/api/v2/query", self.url);

        let response = self
            .http
            .post(&url)
            .query(&[("org", self.org.as_str())])
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/csv")
            .json(&serde_json::json!({ "query": flux, "type": "flux" }))
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::InvalidAuth);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Query(format!(
                "status {status}: {}",
                body.trim()
            )));
        }

        response.text().await.map_err(FetchError::from_transport)
    }

    /// Bounded read-only probe used during setup validation: is there any
    /// water consumption data in the recent window?
    pub async fn probe(&self) -> Result<bool, FetchError> {
        let flux = format!("{}\n    |> last()", self.consumption_flux(PROBE_RANGE));
        let body = self.query_csv(&flux).await?;
        Ok(!parse_readings(&body)?.is_empty())
    }
}

#[async_trait::async_trait]
impl ReadingsSource for InfluxHttpClient {
    async fn fetch(&self, since: Option<OffsetDateTime>) -> Result<Vec<Reading>, FetchError> {
        let range_start = match since {
            Some(t) => t
                .to_offset(UtcOffset::UTC)
                .format(&Rfc3339)
                .map_err(|e| FetchError::Query(format!("invalid cursor timestamp: {e}")))?,
            None => HISTORY_RANGE.to_string(),
        };

        let flux = self.consumption_flux(&range_start);
        tracing::debug!(%flux, "executing influxdb query");

        let body = self.query_csv(&flux).await?;
        let readings = parse_readings(&body)?;

        metrics::counter!("influxdb_records_fetched_total").increment(readings.len() as u64);
        tracing::debug!(records = readings.len(), "influxdb query returned");

        Ok(readings)
    }
}
