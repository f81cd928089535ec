//! SQLite flow repository implementation.
//!
//! A flow is stored across three tables: `flows`, `nodes` and `edges`. Saving
//! replaces the node and edge sets inside one transaction; `ordinal` keeps the
//! editor order, which decides the entry trigger and edge evaluation order.

use leadflow_core::repository::flow::FlowRepository;
use leadflow_types::error::RepositoryError;
use leadflow_types::flow::{ConditionType, Edge, Flow, Node, Position};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_uuid, query_err, to_json};

/// SQLite-backed implementation of `FlowRepository`.
#[derive(Clone)]
pub struct SqliteFlowRepository {
    pool: DatabasePool,
}

impl SqliteFlowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn load_graph(&self, mut flow: Flow) -> Result<Flow, RepositoryError> {
        let id = flow.id.to_string();

        let rows = sqlx::query("SELECT * FROM nodes WHERE flow_id = ? ORDER BY ordinal ASC")
            .bind(&id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        flow.nodes = rows
            .iter()
            .map(|row| NodeRow::from_row(row).map_err(query_err)?.into_node())
            .collect::<Result<_, _>>()?;

        let rows = sqlx::query("SELECT * FROM edges WHERE flow_id = ? ORDER BY ordinal ASC")
            .bind(&id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        flow.edges = rows
            .iter()
            .map(|row| EdgeRow::from_row(row).map_err(query_err)?.into_edge())
            .collect::<Result<_, _>>()?;

        Ok(flow)
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct FlowRow {
    id: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl FlowRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// The flow without its graph; see `load_graph`.
    fn into_flow(self) -> Result<Flow, RepositoryError> {
        Ok(Flow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct NodeRow {
    id: String,
    node_type: String,
    subtype: String,
    position_x: f64,
    position_y: f64,
    data: String,
    parent_id: Option<String>,
}

impl NodeRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            node_type: row.try_get("type")?,
            subtype: row.try_get("subtype")?,
            position_x: row.try_get("position_x")?,
            position_y: row.try_get("position_y")?,
            data: row.try_get("data")?,
            parent_id: row.try_get("parent_id")?,
        })
    }

    fn into_node(self) -> Result<Node, RepositoryError> {
        Ok(Node {
            id: parse_uuid(&self.id)?,
            node_type: self.node_type,
            subtype: self.subtype,
            position: Position {
                x: self.position_x,
                y: self.position_y,
            },
            data: from_json("node data", &self.data)?,
            parent_id: self.parent_id.as_deref().map(parse_uuid).transpose()?,
        })
    }
}

struct EdgeRow {
    id: String,
    source_node_id: String,
    target_node_id: String,
    condition_type: String,
    condition_value: Option<String>,
    label: Option<String>,
}

impl EdgeRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            source_node_id: row.try_get("source_node_id")?,
            target_node_id: row.try_get("target_node_id")?,
            condition_type: row.try_get("condition_type")?,
            condition_value: row.try_get("condition_value")?,
            label: row.try_get("label")?,
        })
    }

    fn into_edge(self) -> Result<Edge, RepositoryError> {
        let condition_type: ConditionType = self
            .condition_type
            .parse()
            .map_err(RepositoryError::Query)?;

        Ok(Edge {
            id: parse_uuid(&self.id)?,
            source_node_id: parse_uuid(&self.source_node_id)?,
            target_node_id: parse_uuid(&self.target_node_id)?,
            condition_type,
            condition_value: self
                .condition_value
                .as_deref()
                .map(|s| from_json("condition_value", s))
                .transpose()?,
            label: self.label,
        })
    }
}

// ---------------------------------------------------------------------------
// FlowRepository impl
// ---------------------------------------------------------------------------

impl FlowRepository for SqliteFlowRepository {
    async fn save_flow(&self, flow: &Flow) -> Result<(), RepositoryError> {
        let flow_id = flow.id.to_string();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            r#"INSERT INTO flows (id, name, description, is_active, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&flow_id)
        .bind(&flow.name)
        .bind(&flow.description)
        .bind(flow.is_active)
        .bind(format_datetime(&flow.created_at))
        .bind(format_datetime(&flow.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        sqlx::query("DELETE FROM edges WHERE flow_id = ?")
            .bind(&flow_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        sqlx::query("DELETE FROM nodes WHERE flow_id = ?")
            .bind(&flow_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        for (ordinal, node) in flow.nodes.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO nodes
                   (id, flow_id, ordinal, type, subtype, position_x, position_y, data, parent_id)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(node.id.to_string())
            .bind(&flow_id)
            .bind(ordinal as i64)
            .bind(&node.node_type)
            .bind(&node.subtype)
            .bind(node.position.x)
            .bind(node.position.y)
            .bind(to_json(&node.data)?)
            .bind(node.parent_id.map(|id| id.to_string()))
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.message().contains("UNIQUE") => {
                    RepositoryError::Conflict(format!("node {} already belongs to another flow", node.id))
                }
                other => query_err(other),
            })?;
        }

        for (ordinal, edge) in flow.edges.iter().enumerate() {
            let condition_value = edge.condition_value.as_ref().map(to_json).transpose()?;
            sqlx::query(
                r#"INSERT INTO edges
                   (id, flow_id, ordinal, source_node_id, target_node_id,
                    condition_type, condition_value, label)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(edge.id.to_string())
            .bind(&flow_id)
            .bind(ordinal as i64)
            .bind(edge.source_node_id.to_string())
            .bind(edge.target_node_id.to_string())
            .bind(edge.condition_type.as_str())
            .bind(condition_value)
            .bind(&edge.label)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;

        tracing::debug!(flow_id = %flow.id, nodes = flow.nodes.len(), edges = flow.edges.len(), "stored flow");
        Ok(())
    }

    async fn get_flow(&self, id: &Uuid) -> Result<Option<Flow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let flow = FlowRow::from_row(&row).map_err(query_err)?.into_flow()?;
                Ok(Some(self.load_graph(flow).await?))
            }
            None => Ok(None),
        }
    }

    async fn list_flows(&self) -> Result<Vec<Flow>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM flows ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut flows = Vec::with_capacity(rows.len());
        for row in &rows {
            let flow = FlowRow::from_row(row).map_err(query_err)?.into_flow()?;
            flows.push(self.load_graph(flow).await?);
        }
        Ok(flows)
    }

    async fn delete_flow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM flows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }
}
