pub mod message;
pub mod twilio;
pub mod whatsapp;

pub use message::format_alert;
pub use twilio::TwilioChannel;
pub use whatsapp::WhatsAppChannel;

use crate::config::NotifySettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Delivers one alert; `true` when some channel accepted it
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, body: &str, to_e164: &str) -> bool;
}

/// One vendor integration
#[async_trait]
pub trait Channel: Send + Sync {
    /// Name used in the configured priority list
    fn name(&self) -> &'static str;
    async fn send(&self, body: &str, to_e164: &str) -> Result<()>;
}

/// Tries channels in the configured priority order; first success wins.
pub struct ChannelNotifier {
    priority: Vec<String>,
    channels: Vec<Box<dyn Channel>>,
}

impl ChannelNotifier {
    pub fn new(priority: &[String], channels: Vec<Box<dyn Channel>>) -> Self {
        Self {
            priority: priority.iter().map(|c| c.trim().to_uppercase()).collect(),
            channels,
        }
    }

    /// Channels whose credentials are fully configured
    pub fn from_settings(settings: &NotifySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .context("Failed to create notifier HTTP client")?;

        let mut channels: Vec<Box<dyn Channel>> = Vec::new();
        if let (Some(id), Some(token)) = (&settings.wa_phone_number_id, &settings.wa_access_token) {
            channels.push(Box::new(WhatsAppChannel::new(client.clone(), id, token)));
        }
        if let (Some(sid), Some(token), Some(from)) = (
            &settings.twilio_account_sid,
            &settings.twilio_auth_token,
            &settings.twilio_from_number,
        ) {
            channels.push(Box::new(TwilioChannel::new(client.clone(), sid, token, from)));
        }

        for wanted in &settings.channels {
            if !channels.iter().any(|c| c.name().eq_ignore_ascii_case(wanted.trim())) {
                warn!(channel = %wanted, "notify_channel_not_configured");
            }
        }

        Ok(Self::new(&settings.channels, channels))
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, body: &str, to_e164: &str) -> bool {
        for wanted in &self.priority {
            let Some(channel) = self.channels.iter().find(|c| c.name() == wanted.as_str()) else {
                continue;
            };
            match channel.send(body, to_e164).await {
                Ok(()) => {
                    info!(channel = channel.name(), to = to_e164, "notification_sent");
                    return true;
                }
                Err(e) => warn!(channel = channel.name(), error = %e, "notification_failed"),
            }
        }
        false
    }
}

/// At most `max` characters of `body`.
pub(crate) fn truncate_chars(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
