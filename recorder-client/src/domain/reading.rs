use time::OffsetDateTime;

/// One row fetched from the water consumption series.
///
/// `value` is `None` when the source field was null. Such rows produce no
/// statistic point but still move the import cursor forward.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub time: OffsetDateTime,
    pub value: Option<f64>,
}
