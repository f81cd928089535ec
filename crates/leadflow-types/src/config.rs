//! Application configuration types for Leadflow.
//!
//! `AppConfig` represents the top-level `config.toml` in the data directory.
//! Every section and field is optional; a missing file yields the defaults.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite URL. When absent, `sqlite://{data_dir}/leadflow.db` is used.
    pub database_url: Option<String>,
    pub worker: WorkerConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub server: ServerConfig,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Resumption worker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How often the queue is polled for due tasks.
    pub poll_interval_ms: u64,
    /// Maximum tasks claimed per poll.
    pub batch_size: u32,
    /// How long a claimed task stays invisible to other workers.
    pub lease_secs: u64,
    /// Claims after which a task whose resumption keeps erroring is dropped.
    pub max_attempts: u32,
    /// First delay before a released task is due again; doubles per attempt.
    pub retry_backoff_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            batch_size: 16,
            lease_secs: 300,
            max_attempts: 5,
            retry_backoff_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// What a transport failure means for the step that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Log the failure and complete the step.
    BestEffort,
    /// Fail the step and with it the execution.
    Fatal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTransportKind {
    #[default]
    Log,
    Http,
}

/// Outbound email settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub kind: EmailTransportKind,
    /// JSON endpoint receiving `{from, to, subject, text}` for `kind = "http"`.
    pub endpoint: Option<String>,
    pub from: String,
    /// Bearer token for the HTTP endpoint.
    pub api_key: Option<String>,
    pub policy: DeliveryPolicy,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            kind: EmailTransportKind::Log,
            endpoint: None,
            from: "noreply@leadflow.local".to_string(),
            api_key: None,
            policy: DeliveryPolicy::BestEffort,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsTransportKind {
    #[default]
    Log,
    Twilio,
}

/// Outbound SMS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub kind: SmsTransportKind,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    /// Sender number in E.164 form.
    pub from: Option<String>,
    pub base_url: String,
    pub policy: DeliveryPolicy,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            kind: SmsTransportKind::Log,
            account_sid: None,
            auth_token: None,
            from: None,
            base_url: "https://api.twilio.com".to_string(),
            policy: DeliveryPolicy::Fatal,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_values() {
        let config = AppConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.worker.poll_interval_ms, 1000);
        assert_eq!(config.worker.batch_size, 16);
        assert_eq!(config.email.policy, DeliveryPolicy::BestEffort);
        assert_eq!(config.sms.policy, DeliveryPolicy::Fatal);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_app_config_deserialize_empty() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.worker.lease_secs, 300);
        assert_eq!(config.worker.max_attempts, 5);
        assert_eq!(config.worker.retry_backoff_secs, 30);
        assert_eq!(config.email.kind, EmailTransportKind::Log);
        assert_eq!(config.sms.kind, SmsTransportKind::Log);
    }

    #[test]
    fn test_app_config_deserialize_with_values() {
        let toml_str = r#"
database_url = "sqlite:///tmp/leadflow.db"

[worker]
poll_interval_ms = 250
max_attempts = 3

[email]
kind = "http"
endpoint = "https://mail.example.com/send"
from = "team@example.com"
policy = "fatal"

[sms]
kind = "twilio"
account_sid = "AC123"
auth_token = "secret"
from = "+15550001111"
policy = "best_effort"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite:///tmp/leadflow.db"));
        assert_eq!(config.worker.poll_interval_ms, 250);
        assert_eq!(config.worker.batch_size, 16);
        assert_eq!(config.worker.max_attempts, 3);
        assert_eq!(config.email.kind, EmailTransportKind::Http);
        assert_eq!(config.email.policy, DeliveryPolicy::Fatal);
        assert_eq!(config.sms.kind, SmsTransportKind::Twilio);
        assert_eq!(config.sms.policy, DeliveryPolicy::BestEffort);
        assert_eq!(config.sms.base_url, "https://api.twilio.com");
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = toml::from_str::<AppConfig>("[email]\npolicy = \"sometimes\"\n");
        assert!(result.is_err());
    }
}
