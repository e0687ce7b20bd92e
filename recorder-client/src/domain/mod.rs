mod reading;
mod statistics;

pub use reading::Reading;
pub use statistics::{StatisticPoint, StatisticsMetadata, STATISTIC_ID};
