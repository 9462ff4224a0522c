use crate::notifier::{truncate_chars, Channel};
use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const GRAPH_API: &str = "https://graph.facebook.com/v20.0";
const MAX_BODY_CHARS: usize = 4096;

/// WhatsApp Cloud API text messages
pub struct WhatsAppChannel {
    client: Client,
    api_base: String,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppChannel {
    pub fn new(client: Client, phone_number_id: &str, access_token: &str) -> Self {
        Self {
            client,
            api_base: GRAPH_API.to_string(),
            phone_number_id: phone_number_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "WHATSAPP"
    }

    async fn send(&self, body: &str, to_e164: &str) -> Result<()> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to_e164,
            "type": "text",
            "text": {"body": truncate_chars(body, MAX_BODY_CHARS)},
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let text = response.text().await.unwrap_or_default();
            bail!("whatsapp error ({status}): {text}");
        }
        Ok(())
    }
}
