//! HttpMailer: plain-text email through a JSON mail API.
//!
//! Each message is one `POST {endpoint}` with body
//! `{"from", "to", "subject", "text"}` and an optional bearer token. Any 2xx
//! answer counts as accepted.

use std::time::Duration;

use leadflow_core::notify::{EmailTransport, TransportError};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    from: String,
    api_key: Option<SecretString>,
}

impl HttpMailer {
    pub fn new(
        endpoint: impl Into<String>,
        from: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::NotConfigured(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            from: from.into(),
            api_key,
        })
    }
}

impl EmailTransport for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        let request = MailRequest {
            from: &self.from,
            to,
            subject,
            text: body,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
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

        tracing::debug!(to, status = status.as_u16(), "email accepted");
        Ok(())
    }
}
