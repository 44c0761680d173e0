pub mod catalog;
pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod record_store;

pub use catalog::load_catalog;
pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, SeedResult, VerificationResult};
pub use record_store::SqlRecordStore;
