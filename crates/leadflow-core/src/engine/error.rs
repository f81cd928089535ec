//! Engine error taxonomy.
//!
//! `NodeError` is fatal to the step that raised it; `EngineError` is fatal to
//! the invocation and its `Display` text is what gets stored on the failed
//! execution.

use leadflow_types::error::RepositoryError;
use leadflow_types::execution::ExecutionStatus;
use leadflow_types::flow::NodeConfigError;
use uuid::Uuid;

use crate::notify::{Channel, TransportError};

use super::recorder::RecorderError;

/// Failure of a single node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Unknown type, subtype or operator.
    #[error(transparent)]
    Config(#[from] NodeConfigError),

    /// A transport failed under a `fatal` delivery policy.
    #[error("Failed to send {channel} via {provider}: {source}")]
    Delivery {
        channel: Channel,
        provider: String,
        #[source]
        source: TransportError,
    },

    /// The durable queue refused a resumption task.
    #[error("Failed to schedule resumption: {0}")]
    Schedule(String),
}

/// Failure of a whole traversal invocation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No trigger node found for flow.")]
    NoTrigger,

    #[error("Resume target node not found: {0}")]
    ResumeTargetMissing(Uuid),

    #[error("Flow not found: {0}")]
    FlowNotFound(Uuid),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    /// A node failed; the message is the node's own.
    #[error("{source}")]
    Node {
        node_id: Uuid,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Why a retry request was refused.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("execution not found: {0}")]
    NotFound(Uuid),

    #[error("only failed executions can be retried (execution {id} is {status})")]
    NotFailed { id: Uuid, status: ExecutionStatus },

    #[error("execution {0} has no contact in its context")]
    MissingContact(Uuid),

    #[error("flow not found: {0}")]
    FlowNotFound(Uuid),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_types::flow::NodeType;

    #[test]
    fn node_error_messages_are_the_node_messages() {
        let err = EngineError::Node {
            node_id: Uuid::nil(),
            source: NodeConfigError::UnknownType("teleport".to_string()).into(),
        };
        assert_eq!(err.to_string(), "Unknown node type: teleport");

        let err = NodeError::from(NodeConfigError::UnknownSubtype {
            node_type: NodeType::Action,
            subtype: "fax".to_string(),
        });
        assert_eq!(err.to_string(), "Unknown action subtype: fax");
    }

    #[test]
    fn delivery_error_names_channel_and_provider() {
        let err = NodeError::Delivery {
            channel: Channel::Sms,
            provider: "twilio".to_string(),
            source: TransportError::Rejected {
                status: 400,
                body: "invalid number".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to send SMS via twilio"));
        assert!(msg.contains("invalid number"));
    }

    #[test]
    fn retry_error_display() {
        let err = RetryError::NotFailed {
            id: Uuid::nil(),
            status: ExecutionStatus::Completed,
        };
        assert!(err.to_string().contains("is completed"));
        assert!(EngineError::NoTrigger.to_string().contains("No trigger node"));
    }
}
