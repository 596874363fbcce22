//! Flow definitions.

use super::{parse_column, store_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::{FlowId, WorkspaceId};
use encore_flow::{Action, Edge, Flow, GraphStore, StoreError, Trigger, TriggerKind};
use serde::Deserialize;
use sqlx::{FromRow, PgPool};

/// The graph half of a flow, stored as one JSON document.
#[derive(Deserialize)]
struct FlowDefinition {
    trigger: Trigger,
    actions: Vec<Action>,
    edges: Vec<Edge>,
}

/// Row type for flow queries.
#[derive(FromRow)]
struct FlowRow {
    id: String,
    workspace_id: String,
    name: String,
    enabled: bool,
    definition: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FlowRow {
    fn try_into_flow(self) -> Result<Flow, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            entity: "flow",
            id: self.id.clone(),
            reason,
        };
        let id: FlowId = parse_column("flow id", &self.id).map_err(|e| corrupt(e.to_string()))?;
        let workspace_id: WorkspaceId = parse_column("workspace id", &self.workspace_id)
            .map_err(|e| corrupt(e.to_string()))?;
        let definition: FlowDefinition = serde_json::from_value(self.definition)
            .map_err(|e| corrupt(format!("invalid definition: {e}")))?;

        Ok(Flow {
            id,
            workspace_id,
            name: self.name,
            enabled: self.enabled,
            trigger: definition.trigger,
            actions: definition.actions,
            edges: definition.edges,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Flow definitions in Postgres.
#[derive(Clone)]
pub struct PgGraphStore {
    pool: PgPool,
}

impl PgGraphStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn get_flow(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError> {
        let row: Option<FlowRow> = sqlx::query_as(
            r#"
            SELECT id, workspace_id, name, enabled, definition, created_at, updated_at
            FROM flows
            WHERE id = $1
            "#,
        )
        .bind(flow_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(FlowRow::try_into_flow).transpose()
    }

    async fn find_flows(
        &self,
        workspace_id: WorkspaceId,
        kind: TriggerKind,
    ) -> Result<Vec<Flow>, StoreError> {
        let rows: Vec<FlowRow> = sqlx::query_as(
            r#"
            SELECT id, workspace_id, name, enabled, definition, created_at, updated_at
            FROM flows
            WHERE workspace_id = $1 AND trigger_kind = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(workspace_id.to_string())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(FlowRow::try_into_flow).collect()
    }
}
