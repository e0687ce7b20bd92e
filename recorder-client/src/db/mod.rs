pub mod statistics_queries;

pub use statistics_queries::{ensure_schema, insert_statistics, last_statistic, upsert_metadata};
