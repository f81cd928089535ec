//! Flow definition management.
//!
//! Saves are validated against the node catalog; import/export use the same
//! JSON shape the repository stores (`Flow` with nested nodes and edges).

use chrono::Utc;
use leadflow_types::error::RepositoryError;
use leadflow_types::flow::Flow;
use uuid::Uuid;

use crate::repository::flow::FlowRepository;
use crate::validation::{FlowValidationError, NodeCatalog, validate_flow};

#[derive(Debug, thiserror::Error)]
pub enum FlowServiceError {
    #[error("flow not found: {0}")]
    NotFound(Uuid),

    #[error("invalid flow: {0}")]
    Invalid(#[from] FlowValidationError),

    #[error("invalid flow document: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct FlowService<R: FlowRepository> {
    repo: R,
    catalog: NodeCatalog,
}

impl<R: FlowRepository> FlowService<R> {
    pub fn new(repo: R, catalog: NodeCatalog) -> Self {
        Self { repo, catalog }
    }

    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    /// Validate and upsert a flow with its nodes and edges.
    ///
    /// An existing flow keeps its `created_at`; `updated_at` is always now.
    pub async fn save(&self, mut flow: Flow) -> Result<Flow, FlowServiceError> {
        flow.name = flow.name.trim().to_string();
        validate_flow(&flow, &self.catalog)?;

        let now = Utc::now();
        flow.created_at = match self.repo.get_flow(&flow.id).await? {
            Some(existing) => existing.created_at,
            None => now,
        };
        flow.updated_at = now;

        self.repo.save_flow(&flow).await?;
        tracing::info!(
            flow_id = %flow.id,
            nodes = flow.nodes.len(),
            edges = flow.edges.len(),
            "saved flow"
        );
        Ok(flow)
    }

    pub async fn get(&self, id: &Uuid) -> Result<Flow, FlowServiceError> {
        self.repo
            .get_flow(id)
            .await?
            .ok_or(FlowServiceError::NotFound(*id))
    }

    pub async fn list(&self) -> Result<Vec<Flow>, FlowServiceError> {
        Ok(self.repo.list_flows().await?)
    }

    pub async fn delete(&self, id: &Uuid) -> Result<(), FlowServiceError> {
        if !self.repo.delete_flow(id).await? {
            return Err(FlowServiceError::NotFound(*id));
        }
        tracing::info!(flow_id = %id, "deleted flow");
        Ok(())
    }

    /// Parse a JSON flow document and save it.
    pub async fn import_json(&self, json: &str) -> Result<Flow, FlowServiceError> {
        let flow: Flow =
            serde_json::from_str(json).map_err(|e| FlowServiceError::Parse(e.to_string()))?;
        self.save(flow).await
    }

    pub async fn export_json(&self, id: &Uuid) -> Result<String, FlowServiceError> {
        let flow = self.get(id).await?;
        serde_json::to_string_pretty(&flow).map_err(|e| FlowServiceError::Parse(e.to_string()))
    }

    /// The flow a form submission starts, if any.
    pub async fn form_flow(&self) -> Result<Option<Flow>, FlowServiceError> {
        Ok(first_form_flow(&self.repo).await?)
    }
}

/// The oldest active flow with a `form_submit` trigger.
pub async fn first_form_flow<R: FlowRepository>(repo: &R) -> Result<Option<Flow>, RepositoryError> {
    Ok(repo
        .list_flows()
        .await?
        .into_iter()
        .find(|f| f.is_active && f.has_form_trigger()))
}
