use csv::ReaderBuilder;
use recorder_client::domain::Reading;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::FetchError;

/// Decode an annotated-CSV Flux response into readings.
///
/// Annotation rows start with `#` and are skipped. Each result table carries
/// its own header row; tables are separated by blank lines. Only the `_time`
/// and `_value` columns are consumed, and an empty `_value` field is a null
/// reading.
pub fn parse_readings(body: &str) -> Result<Vec<Reading>, FetchError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(body.as_bytes());

    let mut readings = Vec::new();
    let mut columns: Option<(usize, usize)> = None;

    for record in reader.records() {
        let record = record.map_err(|e| FetchError::Decode(e.to_string()))?;

        if record.iter().all(str::is_empty) {
            // Separator between result tables; the next row is a new header.
            columns = None;
            continue;
        }

        if let Some(time_idx) = record.iter().position(|f| f == "_time") {
            let value_idx = record.iter().position(|f| f == "_value").ok_or_else(|| {
                FetchError::Decode("header row without a _value column".to_string())
            })?;
            columns = Some((time_idx, value_idx));
            continue;
        }

        let (time_idx, value_idx) = columns
            .ok_or_else(|| FetchError::Decode("data row before any header row".to_string()))?;

        let time_str = record
            .get(time_idx)
            .ok_or_else(|| FetchError::Decode("row missing the _time field".to_string()))?;
        let time = OffsetDateTime::parse(time_str.trim(), &Rfc3339)
            .map_err(|e| FetchError::Decode(format!("invalid _time '{time_str}': {e}")))?;

        let value = match record.get(value_idx).map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|e| FetchError::Decode(format!("invalid _value '{raw}': {e}")))?,
            ),
        };

        readings.push(Reading { time, value });
    }

    Ok(readings)
}
