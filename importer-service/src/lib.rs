pub mod config;
pub mod coordinator;
pub mod importer;
pub mod influx;
pub mod observability;
pub mod status_server;
pub mod store;
pub mod validate;

pub use coordinator::{PollCoordinator, PollResult};
pub use importer::{ImportCursor, StatisticsImporter};
