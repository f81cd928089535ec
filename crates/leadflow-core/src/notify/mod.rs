//! Outbound notification ports.
//!
//! The engine only knows these two traits. Concrete transports (log-only,
//! HTTP mail API, Twilio) live in leadflow-infra.

pub mod box_transport;

use std::fmt;

pub use box_transport::{BoxEmailTransport, BoxSmsTransport};

/// Errors raised by a transport while handing a message off.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is missing required settings (credentials, endpoint).
    #[error("transport not configured: {0}")]
    NotConfigured(String),

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Delivery channel, used in error and log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => f.write_str("email"),
            Channel::Sms => f.write_str("SMS"),
        }
    }
}

/// Plain-text email delivery.
///
/// Uses RPITIT; wrap in [`BoxEmailTransport`] for dynamic dispatch.
pub trait EmailTransport: Send + Sync {
    /// Provider name shown in errors ("log", "http", ...).
    fn name(&self) -> &str;

    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Text message delivery.
pub trait SmsTransport: Send + Sync {
    fn name(&self) -> &str;

    fn send(
        &self,
        to: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}
