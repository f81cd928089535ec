//! TwilioSms: text messages through the Twilio Messages API.
//!
//! `POST {base_url}/2010-04-01/Accounts/{sid}/Messages.json` as a form with
//! `To`, `From` and `Body`, authenticated with HTTP basic auth
//! (`account_sid:auth_token`).

use std::time::Duration;

use leadflow_core::notify::{SmsTransport, TransportError};
use secrecy::{ExposeSecret, SecretString};

pub struct TwilioSms {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: SecretString,
    from: String,
}

impl TwilioSms {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: SecretString,
        from: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::NotConfigured(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: "https://api.twilio.com".to_string(),
            account_sid: account_sid.into(),
            auth_token,
            from: from.into(),
        })
    }

    /// Override the API host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

impl SmsTransport for TwilioSms {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let form = [("To", to), ("From", self.from.as_str()), ("Body", body)];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to, status = status.as_u16(), "sms accepted");
        Ok(())
    }
}
