pub mod config;
pub mod health;
pub mod matcher;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod scrapers;
pub mod store;

pub use config::Settings;
pub use models::Listing;
pub use pipeline::{Pipeline, RunCounters, ScanSummary};
