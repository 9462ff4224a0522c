use crate::notifier::{truncate_chars, Channel};
use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";
const MAX_BODY_CHARS: usize = 1600;

/// Twilio programmable SMS
pub struct TwilioChannel {
    client: Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioChannel {
    pub fn new(client: Client, account_sid: &str, auth_token: &str, from_number: &str) -> Self {
        Self {
            client,
            api_base: TWILIO_API.to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Channel for TwilioChannel {
    fn name(&self) -> &'static str {
        "SMS"
    }

    async fn send(&self, body: &str, to_e164: &str) -> Result<()> {
        let url = format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid);
        let form = [
            ("From", self.from_number.as_str()),
            ("To", to_e164),
            ("Body", truncate_chars(body, MAX_BODY_CHARS)),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let text = response.text().await.unwrap_or_default();
            bail!("twilio error ({status}): {text}");
        }
        Ok(())
    }
}
