//! Durable delayed resumption of suspended executions.

pub mod queue;
pub mod worker;

pub use queue::TaskQueue;
pub use worker::{ResumeWorker, TickSummary, WorkerSettings};
