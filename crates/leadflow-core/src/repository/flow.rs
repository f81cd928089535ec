//! Flow repository trait definition.

use leadflow_types::error::RepositoryError;
use leadflow_types::flow::Flow;
use uuid::Uuid;

/// Repository trait for flow definitions (a flow plus its nodes and edges).
///
/// Implementations live in leadflow-infra (e.g., SqliteFlowRepository).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait FlowRepository: Send + Sync {
    /// Upsert a flow and replace its nodes and edges, atomically.
    fn save_flow(
        &self,
        flow: &Flow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a flow with its nodes (in editor order) and edges.
    fn get_flow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Flow>, RepositoryError>> + Send;

    /// List all flows, oldest first, with their nodes and edges.
    fn list_flows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Flow>, RepositoryError>> + Send;

    /// Delete a flow by ID. Returns `true` if it existed.
    fn delete_flow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
