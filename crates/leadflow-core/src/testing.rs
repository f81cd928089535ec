//! In-memory doubles shared by the unit tests in this crate.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use leadflow_types::contact::Contact;
use leadflow_types::error::RepositoryError;
use leadflow_types::execution::{
    DailyExecutionCount, ExecutionFilter, ExecutionStats, ExecutionStatus, ExecutionStep,
    FlowExecution, StepStatus, check_off_resumption,
};
use leadflow_types::flow::{ConditionType, Edge, FieldOperator, Flow, Node, Position};
use leadflow_types::task::ScheduledTask;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::engine::executor::NodeExecutor;
use crate::engine::runner::FlowRunner;
use crate::notify::{BoxEmailTransport, BoxSmsTransport, EmailTransport, SmsTransport, TransportError};
use crate::repository::contact::ContactRepository;
use crate::repository::execution::ExecutionRepository;
use crate::repository::flow::FlowRepository;
use crate::scheduler::queue::TaskQueue;

// ---------------------------------------------------------------------------
// Flow construction
// ---------------------------------------------------------------------------

pub fn node(node_type: &str, subtype: &str, data: Value) -> Node {
    Node {
        id: Uuid::now_v7(),
        node_type: node_type.to_string(),
        subtype: subtype.to_string(),
        position: Position::default(),
        data: data.as_object().cloned().unwrap_or_default(),
        parent_id: None,
    }
}

pub struct FlowBuilder {
    flow: Flow,
}

impl FlowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            flow: Flow {
                id: Uuid::now_v7(),
                name: name.to_string(),
                description: None,
                is_active: true,
                nodes: Vec::new(),
                edges: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    pub fn raw(&mut self, node_type: &str, subtype: &str, data: Value) -> Uuid {
        let n = node(node_type, subtype, data);
        let id = n.id;
        self.flow.nodes.push(n);
        id
    }

    pub fn trigger(&mut self) -> Uuid {
        self.raw("trigger", "form_submit", json!({}))
    }

    pub fn email(&mut self, subject: &str, body: &str) -> Uuid {
        self.raw("action", "send_email", json!({"subject": subject, "body": body}))
    }

    pub fn sms(&mut self, message: &str) -> Uuid {
        self.raw("action", "send_sms", json!({"message": message}))
    }

    pub fn field_check(&mut self, field: &str, operator: FieldOperator, value: Option<Value>) -> Uuid {
        self.raw(
            "condition",
            "field_check",
            json!({"field_name": field, "operator": operator.as_str(), "value": value}),
        )
    }

    pub fn wait(&mut self, delay_minutes: Value) -> Uuid {
        self.raw("wait", "time_delay", json!({"delay_minutes": delay_minutes}))
    }

    pub fn edge(&mut self, from: Uuid, to: Uuid, condition_type: ConditionType) -> Uuid {
        let id = Uuid::now_v7();
        self.flow.edges.push(Edge {
            id,
            source_node_id: from,
            target_node_id: to,
            condition_type,
            condition_value: None,
            label: None,
        });
        id
    }

    pub fn inactive(&mut self) -> &mut Self {
        self.flow.is_active = false;
        self
    }

    pub fn build(self) -> Flow {
        self.flow
    }
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub to: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingMailer {
    pub fn failing(message: &str) -> Self {
        let mailer = Self::default();
        mailer.set_failure(Some(message));
        mailer
    }

    pub fn set_failure(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        lock(&self.sent).clone()
    }
}

impl EmailTransport for RecordingMailer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(TransportError::Request(message));
        }
        lock(&self.sent).push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingSms {
    sent: Arc<Mutex<Vec<SentSms>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingSms {
    pub fn failing(message: &str) -> Self {
        let sms = Self::default();
        sms.set_failure(Some(message));
        sms
    }

    pub fn set_failure(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    pub fn sent(&self) -> Vec<SentSms> {
        lock(&self.sent).clone()
    }
}

impl SmsTransport for RecordingSms {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(TransportError::Request(message));
        }
        lock(&self.sent).push(SentSms {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// A runner whose three stores are all `store`.
pub fn runner(
    store: &MemoryStore,
    mailer: &RecordingMailer,
    sms: &RecordingSms,
) -> FlowRunner<MemoryStore, MemoryStore, MemoryStore> {
    let executor = NodeExecutor::new(
        BoxEmailTransport::new(mailer.clone()),
        BoxSmsTransport::new(sms.clone()),
    );
    FlowRunner::new(store.clone(), store.clone(), store.clone(), executor)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    flows: Vec<Flow>,
    contacts: Vec<Contact>,
    executions: Vec<FlowExecution>,
    steps: Vec<ExecutionStep>,
    tasks: Vec<ScheduledTask>,
    faults: HashSet<&'static str>,
}

/// Every repository port plus the task queue, backed by one shared `Vec` set.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Make every later call of the named repository method fail.
    pub fn fail_on(&self, method: &'static str) {
        self.state().faults.insert(method);
    }

    fn fault(&self, method: &str) -> Result<(), RepositoryError> {
        if self.state().faults.contains(method) {
            return Err(RepositoryError::Query(format!("{method} unavailable")));
        }
        Ok(())
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.state().tasks.clone()
    }

    /// Move every queued task's due time by `delta`.
    pub fn shift_tasks(&self, delta: chrono::Duration) {
        for task in &mut self.state().tasks {
            task.run_at += delta;
        }
    }

    pub fn execution(&self, id: &Uuid) -> FlowExecution {
        self.state()
            .executions
            .iter()
            .find(|e| &e.id == id)
            .cloned()
            .unwrap()
    }

    pub fn step(&self, id: &Uuid) -> ExecutionStep {
        self.state().steps.iter().find(|s| &s.id == id).cloned().unwrap()
    }

    pub fn steps_for(&self, execution_id: &Uuid) -> Vec<ExecutionStep> {
        self.state()
            .steps
            .iter()
            .filter(|s| &s.execution_id == execution_id)
            .cloned()
            .collect()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.state().contacts.clone()
    }

    pub fn executions(&self) -> Vec<FlowExecution> {
        self.state().executions.clone()
    }
}

fn set_step(step: &mut ExecutionStep, status: StepStatus, output: Option<&Value>, error: Option<&str>) {
    step.status = status;
    if let Some(output) = output {
        step.output = Some(output.clone());
    }
    step.error = error.map(str::to_string);
    step.completed_at = status.is_terminal().then(Utc::now);
}

impl FlowRepository for MemoryStore {
    async fn save_flow(&self, flow: &Flow) -> Result<(), RepositoryError> {
        let mut state = self.state();
        state.flows.retain(|f| f.id != flow.id);
        state.flows.push(flow.clone());
        Ok(())
    }

    async fn get_flow(&self, id: &Uuid) -> Result<Option<Flow>, RepositoryError> {
        Ok(self.state().flows.iter().find(|f| &f.id == id).cloned())
    }

    async fn list_flows(&self) -> Result<Vec<Flow>, RepositoryError> {
        let mut flows = self.state().flows.clone();
        flows.sort_by_key(|f| f.created_at);
        Ok(flows)
    }

    async fn delete_flow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let before = state.flows.len();
        state.flows.retain(|f| &f.id != id);
        Ok(state.flows.len() != before)
    }
}

impl ContactRepository for MemoryStore {
    async fn create_contact(&self, contact: &Contact) -> Result<(), RepositoryError> {
        self.state().contacts.push(contact.clone());
        Ok(())
    }

    async fn get_contact(&self, id: &Uuid) -> Result<Option<Contact>, RepositoryError> {
        Ok(self
            .state()
            .contacts
            .iter()
            .find(|c| c.id.as_ref() == Some(id))
            .cloned())
    }
}

impl ExecutionRepository for MemoryStore {
    async fn create_execution(&self, execution: &FlowExecution) -> Result<(), RepositoryError> {
        self.fault("create_execution")?;
        self.state().executions.push(execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<FlowExecution>, RepositoryError> {
        Ok(self.state().executions.iter().find(|e| &e.id == id).cloned())
    }

    async fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        result: Option<&Value>,
        context: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        self.fault("update_execution_status")?;
        let mut state = self.state();
        let exec = state
            .executions
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or(RepositoryError::NotFound)?;
        let now = Utc::now();
        exec.status = status;
        exec.error = error.map(str::to_string);
        if let Some(result) = result {
            exec.result = Some(result.clone());
        }
        if let Some(context) = context {
            exec.context = context.clone();
        }
        if status == ExecutionStatus::Running && exec.started_at.is_none() {
            exec.started_at = Some(now);
        }
        if status.is_terminal() {
            exec.completed_at = Some(now);
        }
        Ok(())
    }

    async fn reset_for_retry(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let Some(exec) = state
            .executions
            .iter_mut()
            .find(|e| &e.id == id && e.status == ExecutionStatus::Failed)
        else {
            return Ok(false);
        };
        exec.status = ExecutionStatus::Pending;
        exec.error = None;
        exec.result = None;
        exec.started_at = None;
        exec.completed_at = None;
        exec.attempt += 1;

        for step in state.steps.iter_mut().filter(|s| &s.execution_id == id) {
            step.status = StepStatus::Pending;
            step.error = None;
            step.completed_at = None;
        }
        Ok(true)
    }

    async fn begin_resumption(
        &self,
        execution_id: &Uuid,
        wait_step_id: &Uuid,
        resumed_node_id: &Uuid,
        wait_output: &Value,
    ) -> Result<bool, RepositoryError> {
        self.fault("begin_resumption")?;
        let mut state = self.state();
        let mut completed = false;
        if let Some(step) = state
            .steps
            .iter_mut()
            .find(|s| &s.id == wait_step_id && s.status == StepStatus::Running)
        {
            let (output, done) = check_off_resumption(step.output.as_ref(), resumed_node_id, wait_output);
            let status = if done { StepStatus::Completed } else { StepStatus::Running };
            set_step(step, status, Some(&output), None);
            completed = done;
        }
        if let Some(exec) = state.executions.iter_mut().find(|e| &e.id == execution_id) {
            exec.status = ExecutionStatus::Running;
        }
        Ok(completed)
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<FlowExecution>, RepositoryError> {
        let mut executions: Vec<FlowExecution> = self
            .state()
            .executions
            .iter()
            .filter(|e| filter.flow_id.is_none_or(|id| e.flow_id == id))
            .filter(|e| filter.status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(executions
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn execution_stats(&self, days: u32) -> Result<ExecutionStats, RepositoryError> {
        let state = self.state();
        let count = |status: ExecutionStatus| {
            state.executions.iter().filter(|e| e.status == status).count() as u64
        };
        let today = Utc::now().date_naive();
        let recent_executions = (0..days)
            .rev()
            .filter_map(|back| today.checked_sub_days(chrono::Days::new(u64::from(back))))
            .map(|date| {
                let on_day: Vec<&FlowExecution> = state
                    .executions
                    .iter()
                    .filter(|e| e.created_at.date_naive() == date)
                    .collect();
                DailyExecutionCount {
                    date,
                    count: on_day.len() as u64,
                    successful: on_day.iter().filter(|e| e.status == ExecutionStatus::Completed).count() as u64,
                    failed: on_day.iter().filter(|e| e.status == ExecutionStatus::Failed).count() as u64,
                }
            })
            .collect();

        Ok(ExecutionStats {
            total_executions: state.executions.len() as u64,
            successful_executions: count(ExecutionStatus::Completed),
            failed_executions: count(ExecutionStatus::Failed),
            pending_executions: count(ExecutionStatus::Pending),
            running_executions: count(ExecutionStatus::Running),
            recent_executions,
        })
    }

    async fn save_step(&self, step: &ExecutionStep) -> Result<(), RepositoryError> {
        let mut state = self.state();
        match state.steps.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => *existing = step.clone(),
            None => state.steps.push(step.clone()),
        }
        Ok(())
    }

    async fn update_step_status(
        &self,
        id: &Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let step = state
            .steps
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or(RepositoryError::NotFound)?;
        set_step(step, status, output, error);
        Ok(())
    }

    async fn get_step(&self, id: &Uuid) -> Result<Option<ExecutionStep>, RepositoryError> {
        Ok(self.state().steps.iter().find(|s| &s.id == id).cloned())
    }

    async fn find_pending_step(
        &self,
        execution_id: &Uuid,
        node_id: &Uuid,
    ) -> Result<Option<ExecutionStep>, RepositoryError> {
        Ok(self
            .state()
            .steps
            .iter()
            .find(|s| {
                &s.execution_id == execution_id
                    && &s.node_id == node_id
                    && s.status == StepStatus::Pending
            })
            .cloned())
    }

    async fn list_steps(&self, execution_id: &Uuid) -> Result<Vec<ExecutionStep>, RepositoryError> {
        Ok(self.steps_for(execution_id))
    }

    async fn count_running_steps(&self, execution_id: &Uuid) -> Result<u64, RepositoryError> {
        Ok(self
            .state()
            .steps
            .iter()
            .filter(|s| &s.execution_id == execution_id && s.status == StepStatus::Running)
            .count() as u64)
    }
}

impl TaskQueue for MemoryStore {
    async fn schedule(
        &self,
        task_type: &str,
        payload: &Value,
        not_before: DateTime<Utc>,
    ) -> Result<Uuid, RepositoryError> {
        let task = ScheduledTask::new(task_type, payload.clone(), not_before);
        let id = task.id;
        self.state().tasks.push(task);
        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<ScheduledTask>, RepositoryError> {
        let lease = chrono::Duration::from_std(lease).map_err(|e| RepositoryError::Query(e.to_string()))?;
        let mut state = self.state();
        state.tasks.sort_by_key(|t| t.run_at);

        let mut claimed = Vec::new();
        for task in state.tasks.iter_mut() {
            if claimed.len() >= limit as usize {
                break;
            }
            let leased = task.locked_until.is_some_and(|until| until > now);
            if task.run_at <= now && !leased {
                task.locked_until = Some(now + lease);
                task.attempts += 1;
                claimed.push(task.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, task_id: &Uuid) -> Result<(), RepositoryError> {
        self.state().tasks.retain(|t| &t.id != task_id);
        Ok(())
    }

    async fn release(
        &self,
        task_id: &Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(task) = self.state().tasks.iter_mut().find(|t| &t.id == task_id) {
            task.locked_until = None;
            task.last_error = Some(error.to_string());
            task.run_at = retry_at;
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.state().tasks.len() as u64)
    }
}
