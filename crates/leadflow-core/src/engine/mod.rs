//! Flow execution engine.
//!
//! `runner::FlowRunner` walks a flow graph for one contact, dispatching each
//! node through `executor::NodeExecutor` and checkpointing every transition
//! through `recorder::ExecutionRecorder`.

pub mod condition;
pub mod error;
pub mod executor;
pub mod graph;
pub mod interpolate;
pub mod label;
pub mod recorder;
pub mod runner;
pub mod value;

pub use condition::{ConditionEvaluator, CustomCondition};
pub use error::{EngineError, NodeError, RetryError};
pub use executor::{NodeExecutor, NodeOutcome};
pub use runner::{FlowRunner, ResumeOutcome, RunReport};
