//! Per-node-type execution.
//!
//! `NodeExecutor` matches exhaustively on [`NodeKind`]. Triggers, actions
//! and conditions run to a result here; wait nodes only report their delay,
//! because scheduling needs the traversal state the runner owns.

use leadflow_types::config::DeliveryPolicy;
use leadflow_types::contact::Contact;
use leadflow_types::execution::ExecutionContext;
use leadflow_types::flow::{
    ActionKind, ConditionKind, FieldOperator, NodeKind, TriggerKind, WaitKind,
};
use serde_json::Value;

use crate::notify::{BoxEmailTransport, BoxSmsTransport, Channel};

use super::error::NodeError;
use super::interpolate::interpolate;
use super::value::{display, is_truthy, loose_eq};

/// What a node produced.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// The node ran; its result becomes `previous_node_result`.
    Completed(Value),
    /// Required data was missing. Not an error; traversal continues.
    Skipped(String),
    /// A wait node: continue at its next node(s) after `delay_minutes`.
    Wait { delay_minutes: u32 },
}

/// Runs trigger, action and condition nodes against the transports.
pub struct NodeExecutor {
    email: BoxEmailTransport,
    sms: BoxSmsTransport,
    email_policy: DeliveryPolicy,
    sms_policy: DeliveryPolicy,
}

impl NodeExecutor {
    /// Email best-effort, SMS fatal.
    pub fn new(email: BoxEmailTransport, sms: BoxSmsTransport) -> Self {
        Self {
            email,
            sms,
            email_policy: DeliveryPolicy::BestEffort,
            sms_policy: DeliveryPolicy::Fatal,
        }
    }

    pub fn with_policies(mut self, email: DeliveryPolicy, sms: DeliveryPolicy) -> Self {
        self.email_policy = email;
        self.sms_policy = sms;
        self
    }

    pub async fn execute(
        &self,
        kind: &NodeKind,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, NodeError> {
        match kind {
            NodeKind::Trigger(TriggerKind::FormSubmit) => Ok(NodeOutcome::Completed(Value::Bool(true))),
            NodeKind::Action(ActionKind::SendEmail { subject, body }) => {
                self.send_email(&ctx.contact, subject, body).await
            }
            NodeKind::Action(ActionKind::SendSms { message }) => {
                self.send_sms(&ctx.contact, message).await
            }
            NodeKind::Condition(ConditionKind::FieldCheck {
                field_name,
                operator,
                value,
            }) => {
                let result = field_check(&ctx.contact, field_name.as_deref(), *operator, value.as_ref());
                Ok(NodeOutcome::Completed(Value::Bool(result)))
            }
            NodeKind::Wait(WaitKind::TimeDelay { delay_minutes }) => Ok(NodeOutcome::Wait {
                delay_minutes: *delay_minutes,
            }),
        }
    }

    async fn send_email(
        &self,
        contact: &Contact,
        subject: &str,
        body: &str,
    ) -> Result<NodeOutcome, NodeError> {
        let Some(to) = contact.email_address() else {
            return Ok(NodeOutcome::Skipped(
                "Missing email data: no email address".to_string(),
            ));
        };
        let subject = interpolate(subject, contact);
        let body = interpolate(body, contact);
        if subject.is_empty() || body.is_empty() {
            return Ok(NodeOutcome::Skipped(
                "Missing email data: missing subject or body".to_string(),
            ));
        }

        match self.email.send(to, &subject, &body).await {
            Ok(()) => {
                tracing::info!(to, transport = self.email.name(), "email sent");
                Ok(NodeOutcome::Completed(Value::String(format!("Email sent to {to}"))))
            }
            Err(e) => match self.email_policy {
                DeliveryPolicy::BestEffort => {
                    tracing::warn!(to, transport = self.email.name(), error = %e, "email delivery failed");
                    Ok(NodeOutcome::Completed(Value::String(format!(
                        "Email to {to} not delivered: {e}"
                    ))))
                }
                DeliveryPolicy::Fatal => Err(NodeError::Delivery {
                    channel: Channel::Email,
                    provider: self.email.name().to_string(),
                    source: e,
                }),
            },
        }
    }

    async fn send_sms(&self, contact: &Contact, message: &str) -> Result<NodeOutcome, NodeError> {
        let Some(to) = contact.phone_number() else {
            return Ok(NodeOutcome::Skipped(
                "Missing SMS data: no phone number".to_string(),
            ));
        };
        let message = interpolate(message, contact);
        if message.is_empty() {
            return Ok(NodeOutcome::Skipped(
                "Missing SMS data: missing message".to_string(),
            ));
        }

        match self.sms.send(to, &message).await {
            Ok(()) => {
                tracing::info!(to, transport = self.sms.name(), "sms sent");
                Ok(NodeOutcome::Completed(Value::String(format!("SMS sent to {to}"))))
            }
            Err(e) => match self.sms_policy {
                DeliveryPolicy::BestEffort => {
                    tracing::warn!(to, transport = self.sms.name(), error = %e, "sms delivery failed");
                    Ok(NodeOutcome::Completed(Value::String(format!(
                        "SMS to {to} not delivered: {e}"
                    ))))
                }
                DeliveryPolicy::Fatal => {
                    tracing::error!(to, transport = self.sms.name(), error = %e, "sms delivery failed");
                    Err(NodeError::Delivery {
                        channel: Channel::Sms,
                        provider: self.sms.name().to_string(),
                        source: e,
                    })
                }
            },
        }
    }
}

/// Apply a `field_check` operator to a contact field.
///
/// A missing `field_name` reads as a missing field. `contains` only matches
/// string fields; a missing comparison value is the empty string.
pub fn field_check(
    contact: &Contact,
    field_name: Option<&str>,
    operator: FieldOperator,
    value: Option<&Value>,
) -> bool {
    let field = field_name.map(|name| contact.field(name)).unwrap_or(Value::Null);
    let expected = value.cloned().unwrap_or(Value::Null);

    match operator {
        FieldOperator::Exists => is_truthy(&field),
        FieldOperator::NotExists => !is_truthy(&field),
        FieldOperator::Equals => loose_eq(&field, &expected),
        FieldOperator::NotEquals => !loose_eq(&field, &expected),
        FieldOperator::Contains => match &field {
            Value::String(haystack) => haystack.contains(display(&expected).as_str()),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingMailer, RecordingSms};
    use serde_json::json;

    fn executor(mailer: &RecordingMailer, sms: &RecordingSms) -> NodeExecutor {
        NodeExecutor::new(
            BoxEmailTransport::new(mailer.clone()),
            BoxSmsTransport::new(sms.clone()),
        )
    }

    fn ctx(email: Option<&str>, phone: Option<&str>) -> ExecutionContext {
        ExecutionContext::new(Contact::transient(
            "Ann",
            email.map(str::to_string),
            phone.map(str::to_string),
        ))
    }

    fn email(subject: &str, body: &str) -> NodeKind {
        NodeKind::Action(ActionKind::SendEmail {
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }

    fn sms(message: &str) -> NodeKind {
        NodeKind::Action(ActionKind::SendSms {
            message: message.to_string(),
        })
    }

    #[tokio::test]
    async fn trigger_yields_true() {
        let exec = executor(&RecordingMailer::default(), &RecordingSms::default());
        let out = exec
            .execute(&NodeKind::Trigger(TriggerKind::FormSubmit), &ctx(None, None))
            .await
            .unwrap();
        assert_eq!(out, NodeOutcome::Completed(json!(true)));
    }

    #[tokio::test]
    async fn email_is_interpolated_and_sent() {
        let mailer = RecordingMailer::default();
        let exec = executor(&mailer, &RecordingSms::default());
        let out = exec
            .execute(&email("Hi {{name}}", "Welcome {{ name }} <{{email}}>"), &ctx(Some("ann@gmail.com"), None))
            .await
            .unwrap();

        assert_eq!(out, NodeOutcome::Completed(json!("Email sent to ann@gmail.com")));
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hi Ann");
        assert_eq!(sent[0].body, "Welcome Ann <ann@gmail.com>");
    }

    #[tokio::test]
    async fn email_skips_on_missing_data() {
        let mailer = RecordingMailer::default();
        let exec = executor(&mailer, &RecordingSms::default());

        let out = exec.execute(&email("Hi", "Body"), &ctx(None, None)).await.unwrap();
        assert_eq!(out, NodeOutcome::Skipped("Missing email data: no email address".to_string()));

        let out = exec
            .execute(&email("Hi", ""), &ctx(Some("ann@gmail.com"), None))
            .await
            .unwrap();
        assert_eq!(
            out,
            NodeOutcome::Skipped("Missing email data: missing subject or body".to_string())
        );
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn email_failure_is_best_effort_by_default() {
        let exec = executor(&RecordingMailer::failing("smtp down"), &RecordingSms::default());
        let out = exec
            .execute(&email("Hi", "Body"), &ctx(Some("ann@gmail.com"), None))
            .await
            .unwrap();
        match out {
            NodeOutcome::Completed(Value::String(s)) => assert!(s.contains("not delivered")),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn email_failure_can_be_fatal() {
        let exec = executor(&RecordingMailer::failing("smtp down"), &RecordingSms::default())
            .with_policies(DeliveryPolicy::Fatal, DeliveryPolicy::Fatal);
        let err = exec
            .execute(&email("Hi", "Body"), &ctx(Some("ann@gmail.com"), None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to send email"));
    }

    #[tokio::test]
    async fn sms_skip_and_failure() {
        let exec = executor(&RecordingMailer::default(), &RecordingSms::failing("carrier down"));

        let out = exec.execute(&sms("Hi"), &ctx(None, None)).await.unwrap();
        assert_eq!(out, NodeOutcome::Skipped("Missing SMS data: no phone number".to_string()));

        let out = exec.execute(&sms(""), &ctx(None, Some("+15550001111"))).await.unwrap();
        assert_eq!(out, NodeOutcome::Skipped("Missing SMS data: missing message".to_string()));

        let err = exec
            .execute(&sms("Hi {{name}}"), &ctx(None, Some("+15550001111")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to send SMS via recording"));
        assert!(err.to_string().contains("carrier down"));
    }

    #[tokio::test]
    async fn sms_failure_can_be_best_effort() {
        let exec = executor(&RecordingMailer::default(), &RecordingSms::failing("carrier down"))
            .with_policies(DeliveryPolicy::BestEffort, DeliveryPolicy::BestEffort);
        let out = exec
            .execute(&sms("Hi"), &ctx(None, Some("+15550001111")))
            .await
            .unwrap();
        assert!(matches!(out, NodeOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn wait_reports_delay() {
        let exec = executor(&RecordingMailer::default(), &RecordingSms::default());
        let out = exec
            .execute(&NodeKind::Wait(WaitKind::TimeDelay { delay_minutes: 60 }), &ctx(None, None))
            .await
            .unwrap();
        assert_eq!(out, NodeOutcome::Wait { delay_minutes: 60 });
    }

    #[test]
    fn field_check_operators() {
        let mut contact = Contact::transient("Ann", Some("ann@gmail.com".to_string()), None);
        contact.extra.insert("score".to_string(), json!(42));

        assert!(field_check(&contact, Some("email"), FieldOperator::Exists, None));
        assert!(field_check(&contact, Some("phone"), FieldOperator::NotExists, None));
        assert!(!field_check(&contact, None, FieldOperator::Exists, None));
        assert!(field_check(&contact, Some("name"), FieldOperator::Equals, Some(&json!("Ann"))));
        assert!(field_check(&contact, Some("score"), FieldOperator::Equals, Some(&json!("42"))));
        assert!(field_check(&contact, Some("name"), FieldOperator::NotEquals, Some(&json!("Bob"))));
        assert!(field_check(&contact, Some("email"), FieldOperator::Contains, Some(&json!("gmail.com"))));
        assert!(!field_check(&contact, Some("email"), FieldOperator::Contains, Some(&json!("yahoo"))));
        assert!(field_check(&contact, Some("email"), FieldOperator::Contains, None));
        assert!(!field_check(&contact, Some("score"), FieldOperator::Contains, Some(&json!("4"))));
        assert!(!field_check(&contact, Some("phone"), FieldOperator::Contains, None));
    }
}
