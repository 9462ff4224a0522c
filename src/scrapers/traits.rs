use crate::models::Listing;
use crate::scrapers::fetcher::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Raw page capability used by the scan pipeline.
/// `Ok(None)` means the target answered but has nothing for us (404, empty or non-JSON body).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<Option<String>, FetchError>;

    async fn fetch_json(&self, url: &str) -> Result<Option<Value>, FetchError>;
}

/// A fetched body handed to the extractor
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Html(&'a str),
    Json(&'a Value),
}

/// Per-call extraction inputs
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// Site root used to absolutize relative links
    pub base_url: String,
    /// Stamped into `scraped_at` and used to resolve relative post times
    pub now: DateTime<Utc>,
}

/// One way of pulling listings out of a payload.
/// Strategies must not fail: a payload they don't understand yields an empty list.
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, payload: Payload<'_>, ctx: &ExtractContext) -> Vec<Listing>;
}
