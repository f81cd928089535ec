//! Email and SMS transport implementations.
//!
//! Concrete implementations of the `EmailTransport` / `SmsTransport` traits
//! from `leadflow-core`, plus the factory that picks one from configuration.

pub mod http;
pub mod log;
pub mod twilio;

use leadflow_core::engine::NodeExecutor;
use leadflow_core::notify::{BoxEmailTransport, BoxSmsTransport, TransportError};
use leadflow_types::config::{
    AppConfig, EmailConfig, EmailTransportKind, SmsConfig, SmsTransportKind,
};
use secrecy::SecretString;

pub use self::http::HttpMailer;
pub use self::log::{LogMailer, LogSms};
pub use self::twilio::TwilioSms;

/// Build the configured email transport.
///
/// # Errors
///
/// `NotConfigured` when `kind = "http"` has no `endpoint`.
pub fn create_email_transport(config: &EmailConfig) -> Result<BoxEmailTransport, TransportError> {
    match config.kind {
        EmailTransportKind::Log => Ok(BoxEmailTransport::new(LogMailer::new(config.from.clone()))),
        EmailTransportKind::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| TransportError::NotConfigured("email.endpoint is required".into()))?;
            let api_key = config.api_key.clone().map(SecretString::from);
            let mailer = HttpMailer::new(endpoint, config.from.clone(), api_key)?;
            Ok(BoxEmailTransport::new(mailer))
        }
    }
}

/// Build the configured SMS transport.
///
/// # Errors
///
/// `NotConfigured` when `kind = "twilio"` lacks `account_sid`, `auth_token` or `from`.
pub fn create_sms_transport(config: &SmsConfig) -> Result<BoxSmsTransport, TransportError> {
    match config.kind {
        SmsTransportKind::Log => Ok(BoxSmsTransport::new(LogSms)),
        SmsTransportKind::Twilio => {
            let missing = |field: &str| TransportError::NotConfigured(format!("sms.{field} is required"));
            let sid = config.account_sid.clone().ok_or_else(|| missing("account_sid"))?;
            let token = config.auth_token.clone().ok_or_else(|| missing("auth_token"))?;
            let from = config.from.clone().ok_or_else(|| missing("from"))?;

            let sms = TwilioSms::new(sid, SecretString::from(token), from)?
                .with_base_url(config.base_url.clone());
            Ok(BoxSmsTransport::new(sms))
        }
    }
}

/// A `NodeExecutor` wired with the configured transports and delivery policies.
pub fn create_executor(config: &AppConfig) -> Result<NodeExecutor, TransportError> {
    let email = create_email_transport(&config.email)?;
    let sms = create_sms_transport(&config.sms)?;
    tracing::debug!(email = email.name(), sms = sms.name(), "transports ready");

    Ok(NodeExecutor::new(email, sms).with_policies(config.email.policy, config.sms.policy))
}
