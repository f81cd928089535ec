//! Log-only transports. Messages are written to the tracing output and never leave the process.

use leadflow_core::notify::{EmailTransport, SmsTransport, TransportError};

/// Email transport that only logs.
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl EmailTransport for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        tracing::info!(
            from = %self.from,
            to,
            subject,
            body_len = body.len(),
            "email (log transport)"
        );
        Ok(())
    }
}

/// SMS transport that only logs.
#[derive(Debug, Clone, Default)]
pub struct LogSms;

impl SmsTransport for LogSms {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        tracing::info!(to, body, "sms (log transport)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_transports_always_succeed() {
        let mailer = LogMailer::new("noreply@leadflow.local");
        assert_eq!(EmailTransport::name(&mailer), "log");
        mailer.send("ann@gmail.com", "Hi", "Body").await.unwrap();

        LogSms.send("+15550001111", "Hi").await.unwrap();
    }
}
