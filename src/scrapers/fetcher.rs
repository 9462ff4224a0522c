use crate::scrapers::traits::Fetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Rotated desktop/mobile user agents
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Mobile Safari/537.36",
];

const TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: gave up after {attempts} attempts ({last})")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
    #[error("{url}: unexpected status {status}")]
    Status { url: String, status: StatusCode },
}

/// Politeness and retry knobs
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            min_delay: Duration::from_millis(1200),
            max_delay: Duration::from_millis(2400),
            max_retries: 3,
        }
    }
}

impl FetchPolicy {
    fn initial_delay(&self) -> Duration {
        random_between(self.min_delay, self.max_delay)
    }

    /// Grow the delay by a random factor in [1.5, 2.0), capped at `max_delay`.
    fn backoff(&self, delay: Duration) -> Duration {
        let factor = 1.5 + rand::thread_rng().gen::<f64>() * 0.5;
        delay.mul_f64(factor).min(self.max_delay)
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Polite HTTP fetcher: random delay before every attempt, backoff on transient failures
pub struct HttpFetcher {
    client: Client,
    policy: FetchPolicy,
}

impl HttpFetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let client = Client::builder()
            .timeout(policy.timeout)
            .default_headers(headers)
            .user_agent(USER_AGENTS[0])
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, policy })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<Option<String>, FetchError> {
        let attempts = self.policy.max_retries.max(1);
        let mut delay = self.policy.initial_delay();
        let mut last = String::new();

        for attempt in 1..=attempts {
            tokio::time::sleep(delay).await;

            let started = Instant::now();
            let result = self
                .client
                .get(url)
                .header(USER_AGENT, random_user_agent())
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    debug!(
                        url,
                        status = status.as_u16(),
                        ms = started.elapsed().as_millis() as u64,
                        "http_get_done"
                    );

                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status == StatusCode::OK {
                        match response.text().await {
                            Ok(body) => return Ok(Some(body)),
                            Err(e) => last = e.to_string(),
                        }
                    } else if TRANSIENT_STATUSES.contains(&status.as_u16()) {
                        last = format!("transient status {}", status);
                    } else {
                        debug!(url, status = status.as_u16(), "http_unexpected_status");
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }
                }
                Err(e) => last = e.to_string(),
            }

            debug!(url, attempt, error = %last, "http_get_retry");
            delay = self.policy.backoff(delay);
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }

    async fn fetch_json(&self, url: &str) -> Result<Option<Value>, FetchError> {
        let Some(body) = self.fetch_text(url).await? else {
            return Ok(None);
        };
        Ok(parse_json_body(url, &body))
    }
}

/// Lenient JSON decode; mislabelled or non-JSON bodies come back as `None`.
fn parse_json_body(url: &str, body: &str) -> Option<Value> {
    let trimmed = body.trim();
    let looks_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !looks_json {
        debug!(url, "json_decode_skipped");
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(url, error = %e, "json_decode_failed");
            None
        }
    }
}
