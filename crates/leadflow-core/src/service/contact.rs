//! Contact form submissions: normalize, validate, persist, start the form flow.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use leadflow_types::contact::{Contact, ContactSubmission};
use leadflow_types::error::RepositoryError;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::runner::{FlowRunner, RunReport};
use crate::repository::contact::ContactRepository;
use crate::repository::execution::ExecutionRepository;
use crate::repository::flow::FlowRepository;
use crate::scheduler::queue::TaskQueue;
use crate::service::flow::first_form_flow;

const MAX_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 100;

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[\p{L}\s\-'"]+$"#).expect("name pattern is valid"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is valid")
});
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{9,14}$").expect("phone pattern is valid"));

/// One rejected submission field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("invalid submission: {}", join_messages(.0))]
    Invalid(Vec<FieldError>),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub contact: Contact,
    /// The flow that was started, if an active form flow exists.
    pub flow_id: Option<Uuid>,
    /// Absent when no flow was started or the run could not be recorded.
    pub run: Option<RunReport>,
}

/// Trim the name, lowercase the email, keep only digits and `+` in the phone.
/// Blank email/phone become absent.
pub fn normalize(form: &ContactSubmission) -> ContactSubmission {
    let email = form
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    let phone = form
        .phone
        .as_deref()
        .map(|p| p.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect::<String>())
        .filter(|p| !p.is_empty());

    ContactSubmission {
        name: form.name.trim().to_string(),
        email,
        phone,
    }
}

/// Check a normalized submission. Every failing field is reported.
pub fn validate(form: &ContactSubmission) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut reject = |field: &'static str, message: &str| {
        errors.push(FieldError {
            field,
            message: message.to_string(),
        })
    };

    let name_len = form.name.chars().count();
    if name_len == 0 {
        reject("name", "Please provide your name.");
    } else if name_len < 2 {
        reject("name", "Your name should be at least 2 characters.");
    } else if name_len > MAX_NAME_LENGTH {
        reject("name", "Your name may not exceed 100 characters.");
    } else if !NAME.is_match(&form.name) {
        reject("name", "Please enter a valid name with only letters and basic punctuation.");
    }

    match (&form.email, &form.phone) {
        (None, None) => reject("email", "Please provide either an email or phone number."),
        _ => {
            if let Some(email) = &form.email {
                if email.len() > MAX_EMAIL_LENGTH {
                    reject("email", "Email may not exceed 100 characters.");
                } else if !EMAIL.is_match(email) {
                    reject("email", "The email format is invalid. Example: name@example.com");
                }
            }
            if let Some(phone) = &form.phone {
                if !PHONE.is_match(phone) {
                    reject(
                        "phone",
                        "Please enter a valid phone number in international format (e.g., +4074942XXXX).",
                    );
                }
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

pub struct ContactService<C, F, E, Q>
where
    C: ContactRepository,
    F: FlowRepository,
    E: ExecutionRepository,
    Q: TaskQueue,
{
    contacts: C,
    runner: Arc<FlowRunner<F, E, Q>>,
}

impl<C, F, E, Q> ContactService<C, F, E, Q>
where
    C: ContactRepository,
    F: FlowRepository,
    E: ExecutionRepository,
    Q: TaskQueue,
{
    pub fn new(contacts: C, runner: Arc<FlowRunner<F, E, Q>>) -> Self {
        Self { contacts, runner }
    }

    /// Persist a submitted contact and start the form flow for it.
    pub async fn submit(&self, form: &ContactSubmission) -> Result<SubmitOutcome, ContactError> {
        let form = normalize(form);
        validate(&form).map_err(ContactError::Invalid)?;

        let contact = Contact {
            id: Some(Uuid::now_v7()),
            name: form.name,
            email: form.email,
            phone: form.phone,
            created_at: Some(Utc::now()),
            extra: Default::default(),
        };
        self.contacts.create_contact(&contact).await?;

        tracing::info!(
            contact_id = ?contact.id,
            contact_method = if contact.email.is_some() { "email" } else { "phone" },
            "new contact form submission"
        );

        let Some(flow) = first_form_flow(self.runner.flows()).await? else {
            tracing::info!("no active form flow; contact stored only");
            return Ok(SubmitOutcome {
                contact,
                flow_id: None,
                run: None,
            });
        };

        tracing::info!(flow_id = %flow.id, contact_id = ?contact.id, "running form flow for new contact");
        // The contact is stored; a run that cannot be recorded is not the
        // submitter's failure.
        let run = match self.runner.run(&flow, &contact).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(
                    flow_id = %flow.id,
                    contact_id = ?contact.id,
                    error = %e,
                    "form flow run failed"
                );
                None
            }
        };

        Ok(SubmitOutcome {
            contact,
            flow_id: Some(flow.id),
            run,
        })
    }
}
