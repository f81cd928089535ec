//! End-to-end flow scenarios against the SQLite repositories and task queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use leadflow_core::engine::{FlowRunner, NodeExecutor, ResumeOutcome};
use leadflow_core::notify::{
    BoxEmailTransport, BoxSmsTransport, EmailTransport, SmsTransport, TransportError,
};
use leadflow_core::repository::contact::ContactRepository;
use leadflow_core::repository::execution::ExecutionRepository;
use leadflow_core::repository::flow::FlowRepository;
use leadflow_core::scheduler::queue::TaskQueue;
use leadflow_core::scheduler::{ResumeWorker, WorkerSettings};
use leadflow_core::service::contact::ContactService;
use leadflow_infra::sqlite::{
    DatabasePool, SqliteContactRepository, SqliteExecutionRepository, SqliteFlowRepository,
    SqliteTaskQueue,
};
use leadflow_types::contact::{Contact, ContactSubmission};
use leadflow_types::execution::{ExecutionStatus, StepStatus};
use leadflow_types::flow::{ConditionType, Edge, Flow, Node, Position};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Runner = FlowRunner<SqliteFlowRepository, SqliteExecutionRepository, SqliteTaskQueue>;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Outbox(Arc<Mutex<Vec<(String, String)>>>);

impl Outbox {
    fn sent(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }
}

impl EmailTransport for Outbox {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), TransportError> {
        self.0.lock().unwrap().push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

impl SmsTransport for Outbox {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        self.0.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

struct Harness {
    pool: DatabasePool,
    runner: Arc<Runner>,
    mail: Outbox,
    sms: Outbox,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("e2e.db").display());
    std::mem::forget(dir);
    let pool = DatabasePool::new(&url).await.unwrap();

    let mail = Outbox::default();
    let sms = Outbox::default();
    let executor = NodeExecutor::new(
        BoxEmailTransport::new(mail.clone()),
        BoxSmsTransport::new(sms.clone()),
    );
    let runner = FlowRunner::new(
        SqliteFlowRepository::new(pool.clone()),
        SqliteExecutionRepository::new(pool.clone()),
        SqliteTaskQueue::new(pool.clone()),
        executor,
    );

    Harness {
        pool,
        runner: Arc::new(runner),
        mail,
        sms,
    }
}

fn node(node_type: &str, subtype: &str, data: Value) -> Node {
    Node {
        id: Uuid::now_v7(),
        node_type: node_type.to_string(),
        subtype: subtype.to_string(),
        position: Position::default(),
        data: data.as_object().cloned().unwrap_or_default(),
        parent_id: None,
    }
}

fn edge(source: &Node, target: &Node, condition_type: ConditionType) -> Edge {
    Edge {
        id: Uuid::now_v7(),
        source_node_id: source.id,
        target_node_id: target.id,
        condition_type,
        condition_value: None,
        label: None,
    }
}

fn flow(name: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Flow {
    Flow {
        id: Uuid::now_v7(),
        name: name.to_string(),
        description: None,
        is_active: true,
        nodes,
        edges,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// trigger -> check(email contains gmail.com)
///   true:  send_email -> wait -> send_sms
///   false: send_email
fn gmail_flow(delay_minutes: u32) -> (Flow, Uuid, Uuid) {
    let trigger = node("trigger", "form_submit", json!({}));
    let check = node(
        "condition",
        "field_check",
        json!({"field_name": "email", "operator": "contains", "value": "gmail.com"}),
    );
    let welcome = node("action", "send_email", json!({"subject": "Welcome {{name}}", "body": "Hi"}));
    let wait = node("wait", "time_delay", json!({"delay_minutes": delay_minutes}));
    let text = node("action", "send_sms", json!({"message": "Hello {{ name }}"}));
    let fallback = node("action", "send_email", json!({"subject": "Hello", "body": "Generic"}));

    let edges = vec![
        edge(&trigger, &check, ConditionType::Always),
        edge(&check, &welcome, ConditionType::IfTrue),
        edge(&check, &fallback, ConditionType::IfFalse),
        edge(&welcome, &wait, ConditionType::Always),
        edge(&wait, &text, ConditionType::Always),
    ];
    let (wait_id, sms_id) = (wait.id, text.id);
    let nodes = vec![trigger, check, welcome, wait, text, fallback];
    (flow("gmail drip", nodes, edges), wait_id, sms_id)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gmail_contact_suspends_then_resumes() {
    let h = harness().await;
    let (flow, wait_id, sms_id) = gmail_flow(60);
    h.runner.flows().save_flow(&flow).await.unwrap();

    let ann = Contact::transient("Ann", Some("ann@gmail.com".into()), Some("+15550001111".into()));
    let report = h.runner.run(&flow, &ann).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Running);

    let steps = h.runner.executions().list_steps(&report.execution_id).await.unwrap();
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[1].output.as_ref().unwrap()["result"], json!(true));
    assert_eq!(steps[3].node_id, wait_id);
    assert_eq!(steps[3].status, StepStatus::Running);

    // Nothing is due yet.
    let queue = h.runner.queue();
    let lease = Duration::from_secs(60);
    assert!(queue.claim_due(Utc::now(), 10, lease).await.unwrap().is_empty());

    let due = queue
        .claim_due(Utc::now() + chrono::Duration::minutes(61), 10, lease)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    let task = due[0].resume_payload().unwrap();
    assert_eq!(task.node_id, sms_id);
    assert_eq!(task.origin_step_id, steps[3].id);

    let outcome = h.runner.resume(&task).await.unwrap();
    let ResumeOutcome::Resumed(resumed) = outcome else {
        panic!("resumption was discarded: {outcome:?}");
    };
    assert_eq!(resumed.status, ExecutionStatus::Completed);
    queue.complete(&due[0].id).await.unwrap();

    let exec = h.runner.executions().get_execution(&report.execution_id).await.unwrap().unwrap();
    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.result, Some(json!({"success": true})));

    let steps = h.runner.executions().list_steps(&report.execution_id).await.unwrap();
    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(steps[3].output.as_ref().unwrap()["result"], "Delay completed");
    assert_eq!(h.sms.sent(), vec![("+15550001111".to_string(), "Hello Ann".to_string())]);
    assert_eq!(h.mail.sent()[0].1, "Welcome Ann");
    assert_eq!(queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn non_gmail_contact_completes_on_false_branch() {
    let h = harness().await;
    let (flow, _, _) = gmail_flow(60);

    let bob = Contact::transient("Bob", Some("bob@example.com".into()), None);
    let report = h.runner.run(&flow, &bob).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Completed);

    let steps = h.runner.executions().list_steps(&report.execution_id).await.unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[1].output.as_ref().unwrap()["result"], json!(false));
    assert_eq!(h.mail.sent(), vec![("bob@example.com".to_string(), "Hello".to_string())]);
    assert_eq!(h.runner.queue().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn sms_without_phone_is_skipped() {
    let h = harness().await;
    let trigger = node("trigger", "form_submit", json!({}));
    let text = node("action", "send_sms", json!({"message": "Hi"}));
    let edges = vec![edge(&trigger, &text, ConditionType::Always)];
    let flow = flow("sms", vec![trigger, text], edges);

    let ann = Contact::transient("Ann", Some("ann@gmail.com".into()), None);
    let report = h.runner.run(&flow, &ann).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Completed);

    let steps = h.runner.executions().list_steps(&report.execution_id).await.unwrap();
    assert_eq!(steps[1].status, StepStatus::Skipped);
    assert!(steps[1].error.as_deref().unwrap().contains("no phone number"));
    assert!(h.sms.sent().is_empty());
}

#[tokio::test]
async fn unknown_node_type_fails_and_can_be_retried() {
    let h = harness().await;
    let trigger = node("trigger", "form_submit", json!({}));
    let bogus = node("teleport", "now", json!({}));
    let edges = vec![edge(&trigger, &bogus, ConditionType::Always)];
    let mut broken = flow("broken", vec![trigger, bogus], edges);
    h.runner.flows().save_flow(&broken).await.unwrap();

    let ann = Contact::transient("Ann", Some("ann@gmail.com".into()), None);
    let report = h.runner.run(&broken, &ann).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Failed);

    let steps = h.runner.executions().list_steps(&report.execution_id).await.unwrap();
    let failed: Vec<_> = steps.iter().filter(|s| s.status == StepStatus::Failed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error.as_deref(), Some("Unknown node type: teleport"));

    // Fix the definition and retry the same execution.
    broken.nodes[1].node_type = "action".to_string();
    broken.nodes[1].subtype = "send_email".to_string();
    broken.nodes[1].data = json!({"subject": "Fixed", "body": "Now it works"})
        .as_object()
        .cloned()
        .unwrap();
    h.runner.flows().save_flow(&broken).await.unwrap();

    let retried = h.runner.retry(report.execution_id).await.unwrap();
    assert_eq!(retried.status, ExecutionStatus::Completed);

    let exec = h.runner.executions().get_execution(&report.execution_id).await.unwrap().unwrap();
    assert_eq!(exec.attempt, 2);
    assert!(exec.error.is_none());
    let steps = h.runner.executions().list_steps(&report.execution_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
}

#[tokio::test]
async fn worker_resumes_due_tasks() {
    let h = harness().await;
    let (flow, _, _) = gmail_flow(0);
    h.runner.flows().save_flow(&flow).await.unwrap();

    let ann = Contact::transient("Ann", Some("ann@gmail.com".into()), Some("+15550001111".into()));
    let report = h.runner.run(&flow, &ann).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Running);

    let worker = ResumeWorker::new(h.runner.clone(), WorkerSettings::default());
    let summary = worker.tick().await.unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.resumed, 1);

    let exec = h.runner.executions().get_execution(&report.execution_id).await.unwrap().unwrap();
    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(h.sms.sent().len(), 1);
    assert_eq!(h.runner.queue().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn wait_fan_out_resumes_every_branch() {
    let h = harness().await;
    let trigger = node("trigger", "form_submit", json!({}));
    let wait = node("wait", "time_delay", json!({"delay_minutes": 0}));
    let first = node("action", "send_email", json!({"subject": "First", "body": "one"}));
    let second = node("action", "send_email", json!({"subject": "Second", "body": "two"}));
    let edges = vec![
        edge(&trigger, &wait, ConditionType::Always),
        edge(&wait, &first, ConditionType::Always),
        edge(&wait, &second, ConditionType::Always),
    ];
    let wait_id = wait.id;
    let fan_out = flow("fan out", vec![trigger, wait, first, second], edges);
    h.runner.flows().save_flow(&fan_out).await.unwrap();

    let ann = Contact::transient("Ann", Some("ann@gmail.com".into()), None);
    let report = h.runner.run(&fan_out, &ann).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Running);
    assert_eq!(report.scheduled_tasks.len(), 2);

    let worker = ResumeWorker::new(h.runner.clone(), WorkerSettings::default());
    let summary = worker.tick().await.unwrap();
    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.resumed, 2);
    assert_eq!(summary.discarded, 0);

    let exec = h.runner.executions().get_execution(&report.execution_id).await.unwrap().unwrap();
    assert_eq!(exec.status, ExecutionStatus::Completed);

    let steps = h.runner.executions().list_steps(&report.execution_id).await.unwrap();
    assert_eq!(steps.len(), 4);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
    let wait_step = steps.iter().find(|s| s.node_id == wait_id).unwrap();
    assert_eq!(wait_step.output.as_ref().unwrap()["resumed_node_ids"].as_array().unwrap().len(), 2);

    let mut subjects: Vec<String> = h.mail.sent().into_iter().map(|(_, subject)| subject).collect();
    subjects.sort();
    assert_eq!(subjects, ["First", "Second"]);
    assert_eq!(h.runner.queue().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn worker_loop_stops_on_cancellation() {
    let h = harness().await;
    let (flow, _, _) = gmail_flow(0);
    h.runner.flows().save_flow(&flow).await.unwrap();

    let ann = Contact::transient("Ann", Some("ann@gmail.com".into()), Some("+15550001111".into()));
    let report = h.runner.run(&flow, &ann).await.unwrap();

    let settings = WorkerSettings {
        poll_interval: Duration::from_millis(20),
        ..WorkerSettings::default()
    };
    let worker = ResumeWorker::new(h.runner.clone(), settings);
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    let mut status = ExecutionStatus::Running;
    for _ in 0..100 {
        status = h
            .runner
            .executions()
            .get_execution(&report.execution_id)
            .await
            .unwrap()
            .unwrap()
            .status;
        if status == ExecutionStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker stops after cancellation")
        .unwrap();

    assert_eq!(status, ExecutionStatus::Completed);
    assert_eq!(h.sms.sent().len(), 1);
}

#[tokio::test]
async fn form_submission_persists_contact_and_runs_flow() {
    let h = harness().await;
    let (flow, _, _) = gmail_flow(60);
    h.runner.flows().save_flow(&flow).await.unwrap();

    let contacts = SqliteContactRepository::new(h.pool.clone());
    let service = ContactService::new(contacts.clone(), h.runner.clone());
    let outcome = service
        .submit(&ContactSubmission {
            name: " Bob ".to_string(),
            email: Some("BOB@Example.com".to_string()),
            phone: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.flow_id, Some(flow.id));
    assert_eq!(outcome.run.unwrap().status, ExecutionStatus::Completed);

    let stored = contacts.get_contact(&outcome.contact.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.name, "Bob");
    assert_eq!(stored.email.as_deref(), Some("bob@example.com"));
    assert_eq!(h.mail.sent()[0].0, "bob@example.com");
}
