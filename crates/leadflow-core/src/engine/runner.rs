//! Flow traversal: breadth-first walk with a per-invocation cycle guard.
//!
//! # Invocation flow
//!
//! 1. Create a `FlowExecution` (fresh run) or load it (resumption, retry).
//! 2. Start from the trigger node, or from the resume target.
//! 3. Pop a node; skip it if this invocation already visited it.
//! 4. Checkpoint the step start, dispatch on the node kind, checkpoint the result.
//! 5. Enqueue unvisited targets of every outgoing edge that fires.
//! 6. Wait nodes schedule a durable resumption per qualifying target and are
//!    never expanded in the same invocation.
//! 7. The execution completes once nothing was scheduled and no other branch
//!    is parked on a wait; the first node failure fails it.
//!
//! A wait step stays `running` until the resumption of its last scheduled
//! target, so a wait that fans out keeps the execution open for every branch.

use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use leadflow_types::contact::Contact;
use leadflow_types::execution::{
    ExecutionContext, ExecutionStatus, FlowExecution, SCHEDULED_NODE_IDS,
};
use leadflow_types::flow::{Flow, Node};
use leadflow_types::task::{RESUME_FLOW_TASK, ResumeTask};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::repository::execution::ExecutionRepository;
use crate::repository::flow::FlowRepository;
use crate::scheduler::queue::TaskQueue;

use super::condition::ConditionEvaluator;
use super::error::{EngineError, NodeError, RetryError};
use super::executor::{NodeExecutor, NodeOutcome};
use super::graph::FlowGraph;
use super::recorder::ExecutionRecorder;

/// Result text of a wait step that handed off to the queue.
pub const WAIT_SCHEDULED: &str = "Scheduled next node(s) after delay";

/// Error text of a suspended wait step whose execution failed elsewhere.
pub const WAIT_ABANDONED: &str = "Execution failed before the delay elapsed";

/// Result text of a wait step with no qualifying next node.
pub const WAIT_NOTHING_TO_SCHEDULE: &str = "No next node to schedule";

/// Result text written onto a wait step when its resumption fires.
pub const WAIT_COMPLETED: &str = "Delay completed";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one traversal invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub execution_id: Uuid,
    /// Status after this invocation (`running` when suspended on a wait).
    pub status: ExecutionStatus,
    /// Steps started by this invocation.
    pub steps: usize,
    /// Resumption tasks scheduled by this invocation.
    pub scheduled_tasks: Vec<Uuid>,
    pub error: Option<String>,
}

/// What happened to a resumption task.
#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    Resumed(RunReport),
    /// The task no longer applies (execution gone, not running, or retried).
    Discarded(String),
}

/// Mutable state of one invocation.
struct Traversal {
    ctx: ExecutionContext,
    visited: HashSet<Uuid>,
    steps: usize,
    scheduled: Vec<Uuid>,
}

impl Traversal {
    fn new(ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            visited: HashSet::new(),
            steps: 0,
            scheduled: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowRunner
// ---------------------------------------------------------------------------

/// Drives executions of flows.
///
/// Generic over the flow store, the execution store and the task queue so it
/// runs against SQLite in production and in-memory mocks in tests.
pub struct FlowRunner<F, E, Q>
where
    F: FlowRepository,
    E: ExecutionRepository,
    Q: TaskQueue,
{
    flows: F,
    recorder: ExecutionRecorder<E>,
    queue: Q,
    executor: NodeExecutor,
    conditions: ConditionEvaluator,
}

impl<F, E, Q> FlowRunner<F, E, Q>
where
    F: FlowRepository,
    E: ExecutionRepository,
    Q: TaskQueue,
{
    pub fn new(flows: F, executions: E, queue: Q, executor: NodeExecutor) -> Self {
        Self {
            flows,
            recorder: ExecutionRecorder::new(executions),
            queue,
            executor,
            conditions: ConditionEvaluator::new(),
        }
    }

    /// Replace the edge condition evaluator (e.g. to plug in `custom` edges).
    pub fn with_conditions(mut self, conditions: ConditionEvaluator) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn flows(&self) -> &F {
        &self.flows
    }

    pub fn executions(&self) -> &E {
        self.recorder.repo()
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Start a new execution of `flow` for `contact`.
    ///
    /// Node failures are recorded on the execution and reported in the
    /// returned `RunReport`; `Err` means the failure could not be recorded.
    pub async fn run(&self, flow: &Flow, contact: &Contact) -> Result<RunReport, EngineError> {
        let execution = FlowExecution::new(flow.id, contact);
        self.recorder.repo().create_execution(&execution).await?;

        tracing::info!(
            execution_id = %execution.id,
            flow_id = %flow.id,
            contact_id = ?contact.id,
            "starting flow execution"
        );

        self.invoke(flow, &execution, None, ExecutionContext::new(contact.clone()))
            .await
    }

    /// Load a flow by id and start it for `contact`.
    pub async fn run_flow(&self, flow_id: Uuid, contact: &Contact) -> Result<RunReport, EngineError> {
        let flow = self
            .flows
            .get_flow(&flow_id)
            .await?
            .ok_or(EngineError::FlowNotFound(flow_id))?;
        self.run(&flow, contact).await
    }

    /// Continue a suspended execution at the task's target node.
    pub async fn resume(&self, task: &ResumeTask) -> Result<ResumeOutcome, EngineError> {
        let Some(execution) = self.recorder.repo().get_execution(&task.execution_id).await? else {
            tracing::warn!(execution_id = %task.execution_id, "discarding resumption for missing execution");
            return Ok(ResumeOutcome::Discarded("execution not found".to_string()));
        };

        if task.attempt < execution.attempt {
            tracing::warn!(
                execution_id = %execution.id,
                task_attempt = task.attempt,
                attempt = execution.attempt,
                "discarding resumption from an earlier attempt"
            );
            return Ok(ResumeOutcome::Discarded(format!(
                "stale attempt {} (execution is on attempt {})",
                task.attempt, execution.attempt
            )));
        }

        if execution.status != ExecutionStatus::Running {
            tracing::warn!(
                execution_id = %execution.id,
                status = %execution.status,
                "discarding resumption for execution that is not running"
            );
            return Ok(ResumeOutcome::Discarded(format!(
                "execution is {}",
                execution.status
            )));
        }

        let ctx = serde_json::from_value::<ExecutionContext>(task.context.clone())
            .unwrap_or_else(|_| ExecutionContext::new(task.contact.clone()));

        let wait_output = json!({
            "result": WAIT_COMPLETED,
            "node_type": "wait",
            "node_subtype": "time_delay",
        });
        self.recorder
            .begin_resumption(execution.id, task.origin_step_id, task.node_id, &wait_output)
            .await?;

        tracing::info!(
            execution_id = %execution.id,
            node_id = %task.node_id,
            wait_step_id = %task.origin_step_id,
            "resuming flow execution"
        );

        let Some(flow) = self.flows.get_flow(&task.flow_id).await? else {
            let report = self
                .finish_failed(execution.id, EngineError::FlowNotFound(task.flow_id), &ctx, 0)
                .await?;
            return Ok(ResumeOutcome::Resumed(report));
        };

        let report = self
            .invoke(&flow, &execution, Some(task.node_id), ctx)
            .await?;
        Ok(ResumeOutcome::Resumed(report))
    }

    /// Fail the execution behind a resumption the worker gave up on, so it
    /// shows as `failed` and can be retried. Executions that have moved on
    /// (another attempt, or no longer running) are left alone.
    pub async fn abandon(&self, task: &ResumeTask, reason: &str) -> Result<(), EngineError> {
        let Some(execution) = self.recorder.repo().get_execution(&task.execution_id).await? else {
            return Ok(());
        };
        if execution.status != ExecutionStatus::Running || task.attempt < execution.attempt {
            return Ok(());
        }

        tracing::error!(
            execution_id = %execution.id,
            node_id = %task.node_id,
            error = reason,
            "abandoning flow execution"
        );
        self.recorder
            .close_running_steps(execution.id, WAIT_ABANDONED)
            .await?;
        self.recorder
            .fail_execution(execution.id, reason, &execution.context)
            .await?;
        Ok(())
    }

    /// Reset a failed execution and run it again from the trigger.
    ///
    /// Reuses the execution record; every step is reset to `pending` and
    /// overwritten as the new attempt revisits its node.
    pub async fn retry(&self, execution_id: Uuid) -> Result<RunReport, RetryError> {
        let execution = self
            .recorder
            .repo()
            .get_execution(&execution_id)
            .await?
            .ok_or(RetryError::NotFound(execution_id))?;

        if execution.status != ExecutionStatus::Failed {
            return Err(RetryError::NotFailed {
                id: execution_id,
                status: execution.status,
            });
        }

        let contact = execution
            .contact()
            .ok_or(RetryError::MissingContact(execution_id))?;
        let flow = self
            .flows
            .get_flow(&execution.flow_id)
            .await?
            .ok_or(RetryError::FlowNotFound(execution.flow_id))?;

        if !self.recorder.repo().reset_for_retry(&execution_id).await? {
            return Err(RetryError::NotFailed {
                id: execution_id,
                status: execution.status,
            });
        }
        let execution = self
            .recorder
            .repo()
            .get_execution(&execution_id)
            .await?
            .ok_or(RetryError::NotFound(execution_id))?;

        tracing::info!(
            execution_id = %execution_id,
            attempt = execution.attempt,
            "retrying flow execution"
        );

        Ok(self
            .invoke(&flow, &execution, None, ExecutionContext::new(contact))
            .await?)
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    async fn invoke(
        &self,
        flow: &Flow,
        execution: &FlowExecution,
        start: Option<Uuid>,
        ctx: ExecutionContext,
    ) -> Result<RunReport, EngineError> {
        let execution_id = execution.id;
        self.recorder
            .execution_running(execution_id, &ctx.to_json())
            .await?;

        let mut state = Traversal::new(ctx);
        if let Err(e) = self.traverse(flow, execution, start, &mut state).await {
            return self
                .finish_failed(execution_id, e, &state.ctx, state.steps)
                .await;
        }

        let context = state.ctx.to_json();
        let parked = self.recorder.running_steps(execution_id).await?;

        if state.scheduled.is_empty() && parked == 0 {
            self.recorder
                .complete_execution(execution_id, &json!({"success": true}), &context)
                .await?;
            tracing::info!(
                execution_id = %execution_id,
                steps = state.steps,
                "flow execution completed"
            );
            return Ok(RunReport {
                execution_id,
                status: ExecutionStatus::Completed,
                steps: state.steps,
                scheduled_tasks: Vec::new(),
                error: None,
            });
        }

        self.recorder
            .execution_running(execution_id, &context)
            .await?;
        tracing::info!(
            execution_id = %execution_id,
            steps = state.steps,
            scheduled = state.scheduled.len(),
            parked,
            "flow execution suspended"
        );
        Ok(RunReport {
            execution_id,
            status: ExecutionStatus::Running,
            steps: state.steps,
            scheduled_tasks: state.scheduled,
            error: None,
        })
    }

    async fn traverse(
        &self,
        flow: &Flow,
        execution: &FlowExecution,
        start: Option<Uuid>,
        state: &mut Traversal,
    ) -> Result<(), EngineError> {
        let graph = FlowGraph::new(flow);
        let start_node = match start {
            Some(id) => graph.node(&id).ok_or(EngineError::ResumeTargetMissing(id))?,
            None => graph.entry().ok_or(EngineError::NoTrigger)?,
        };

        let mut queue: VecDeque<&Node> = VecDeque::from([start_node]);
        while let Some(node) = queue.pop_front() {
            if !state.visited.insert(node.id) {
                tracing::debug!(node_id = %node.id, "node already visited");
                continue;
            }

            tracing::info!(
                execution_id = %execution.id,
                node_id = %node.id,
                node_type = node.node_type.as_str(),
                subtype = node.subtype.as_str(),
                "executing node"
            );

            let step_id = self.recorder.start_step(execution.id, node).await?;
            state.steps += 1;

            let outcome = match node.kind() {
                Ok(kind) => self.executor.execute(&kind, &state.ctx).await,
                Err(e) => Err(NodeError::from(e)),
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail_node(step_id, node, e).await),
            };

            match outcome {
                NodeOutcome::Completed(result) => {
                    self.recorder
                        .complete_step(step_id, &step_output(node, &result, None))
                        .await?;
                    state.ctx.previous_node_result = result;
                }
                NodeOutcome::Skipped(reason) => {
                    tracing::info!(node_id = %node.id, reason = reason.as_str(), "step skipped");
                    self.recorder
                        .skip_step(step_id, &reason, &step_output(node, &Value::Null, None))
                        .await?;
                    state.ctx.previous_node_result = Value::Null;
                }
                NodeOutcome::Wait { delay_minutes } => {
                    let targets = self.wait_targets(&graph, node, state);
                    let task_ids = match self
                        .schedule_resumptions(flow, execution, step_id, &targets, delay_minutes, &state.ctx)
                        .await
                    {
                        Ok(ids) => ids,
                        Err(e) => return Err(self.fail_node(step_id, node, e).await),
                    };

                    let result = if targets.is_empty() {
                        WAIT_NOTHING_TO_SCHEDULE
                    } else {
                        WAIT_SCHEDULED
                    };
                    let mut output = step_output(node, &json!(result), Some(delay_minutes));
                    output[SCHEDULED_NODE_IDS] = json!(targets);

                    if targets.is_empty() {
                        self.recorder.complete_step(step_id, &output).await?;
                    } else {
                        self.recorder.suspend_step(step_id, &output).await?;
                    }
                    state.ctx.previous_node_result = json!(result);
                    state.scheduled.extend(task_ids);
                    continue;
                }
            }

            for (edge, target) in graph.outgoing(&node.id) {
                let fires = self.conditions.fires(edge, &state.ctx);
                tracing::debug!(
                    edge_id = %edge.id,
                    target_node_id = %target.id,
                    condition_type = edge.condition_type.as_str(),
                    fires,
                    "evaluated edge"
                );
                if fires && !state.visited.contains(&target.id) {
                    queue.push_back(target);
                }
            }
        }

        Ok(())
    }

    /// Unvisited targets of a wait node's firing edges, deduplicated.
    fn wait_targets(&self, graph: &FlowGraph<'_>, node: &Node, state: &Traversal) -> Vec<Uuid> {
        let mut targets: Vec<Uuid> = Vec::new();
        for (edge, target) in graph.outgoing(&node.id) {
            if self.conditions.fires(edge, &state.ctx)
                && !state.visited.contains(&target.id)
                && !targets.contains(&target.id)
            {
                targets.push(target.id);
            }
        }
        targets
    }

    async fn schedule_resumptions(
        &self,
        flow: &Flow,
        execution: &FlowExecution,
        wait_step_id: Uuid,
        targets: &[Uuid],
        delay_minutes: u32,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Uuid>, NodeError> {
        let not_before = Utc::now() + chrono::Duration::minutes(i64::from(delay_minutes));
        let mut task_ids = Vec::with_capacity(targets.len());

        for target in targets {
            let task = ResumeTask {
                flow_id: flow.id,
                contact: ctx.contact.clone(),
                node_id: *target,
                execution_id: execution.id,
                context: ctx.to_json(),
                origin_step_id: wait_step_id,
                attempt: execution.attempt,
            };
            let payload =
                serde_json::to_value(&task).map_err(|e| NodeError::Schedule(e.to_string()))?;
            let task_id = self
                .queue
                .schedule(RESUME_FLOW_TASK, &payload, not_before)
                .await
                .map_err(|e| NodeError::Schedule(e.to_string()))?;

            tracing::info!(
                execution_id = %execution.id,
                next_node_id = %target,
                delay_minutes,
                task_id = %task_id,
                "scheduled delayed resumption"
            );
            task_ids.push(task_id);
        }

        Ok(task_ids)
    }

    /// Record a node failure on its step and turn it into the invocation error.
    async fn fail_node(&self, step_id: Uuid, node: &Node, error: NodeError) -> EngineError {
        let message = error.to_string();
        tracing::error!(node_id = %node.id, error = message.as_str(), "node execution failed");

        if let Err(e) = self.recorder.fail_step(step_id, &message).await {
            return e.into();
        }
        EngineError::Node {
            node_id: node.id,
            source: error,
        }
    }

    /// Mark the execution failed and report it. Only a failure to record the
    /// failure is returned as `Err`.
    async fn finish_failed(
        &self,
        execution_id: Uuid,
        error: EngineError,
        ctx: &ExecutionContext,
        steps: usize,
    ) -> Result<RunReport, EngineError> {
        let message = error.to_string();
        tracing::error!(
            execution_id = %execution_id,
            error = message.as_str(),
            "flow execution failed"
        );

        // Branches parked on a wait will not resume.
        self.recorder
            .close_running_steps(execution_id, WAIT_ABANDONED)
            .await?;
        self.recorder
            .fail_execution(execution_id, &message, &ctx.to_json())
            .await?;

        Ok(RunReport {
            execution_id,
            status: ExecutionStatus::Failed,
            steps,
            scheduled_tasks: Vec::new(),
            error: Some(message),
        })
    }
}

/// Step output payload: `{result, node_type, node_subtype, delay_minutes}`.
fn step_output(node: &Node, result: &Value, delay_minutes: Option<u32>) -> Value {
    json!({
        "result": result,
        "node_type": node.node_type,
        "node_subtype": node.subtype,
        "delay_minutes": delay_minutes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
