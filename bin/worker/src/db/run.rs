//! The run ledger: runs and their attempts.

use super::{ledger_error, parse_column, parse_name, parse_optional_column};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::{FlowId, FlowRunActionId, FlowRunId};
use encore_flow::{
    ActionStatus, ActionType, FlowRun, FlowRunAction, LedgerError, NodeId, Recipient,
    RecipientKey, RunLedger, RunStatus, TriggerKind,
};
use sqlx::{FromRow, PgPool};

const RUN_COLUMNS: &str = "id, flow_id, workspace_id, trigger_node_id, trigger_kind, fan_id, \
     cart_id, current_action_node_id, current_attempt_id, status, error, version, created_at, \
     started_at, finished_at, updated_at";

const ACTION_COLUMNS: &str = "id, run_id, node_id, action_type, attempt, status, outcome, \
     resume_at, error, skipped_reason, created_at, started_at, completed_at";

/// Row type for run queries.
#[derive(FromRow)]
struct FlowRunRow {
    id: String,
    flow_id: String,
    workspace_id: String,
    trigger_node_id: String,
    trigger_kind: String,
    fan_id: Option<String>,
    cart_id: Option<String>,
    current_action_node_id: Option<String>,
    current_attempt_id: Option<String>,
    status: String,
    error: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl FlowRunRow {
    fn try_into_record(self) -> Result<FlowRun, sqlx::Error> {
        Ok(FlowRun {
            id: parse_column("run id", &self.id)?,
            flow_id: parse_column("flow id", &self.flow_id)?,
            workspace_id: parse_column("workspace id", &self.workspace_id)?,
            trigger_node_id: parse_column("trigger node id", &self.trigger_node_id)?,
            trigger_kind: parse_name(
                "trigger kind",
                &self.trigger_kind,
                TriggerKind::from_str_value,
            )?,
            recipient: Recipient {
                fan_id: parse_optional_column("fan id", self.fan_id.as_deref())?,
                cart_id: parse_optional_column("cart id", self.cart_id.as_deref())?,
            },
            current_action_node_id: parse_optional_column(
                "node id",
                self.current_action_node_id.as_deref(),
            )?,
            current_attempt_id: parse_optional_column(
                "attempt id",
                self.current_attempt_id.as_deref(),
            )?,
            status: parse_name("run status", &self.status, RunStatus::from_str_value)?,
            error: self.error,
            version: self.version,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row type for attempt queries.
#[derive(FromRow)]
struct FlowRunActionRow {
    id: String,
    run_id: String,
    node_id: String,
    action_type: String,
    attempt: i32,
    status: String,
    outcome: Option<bool>,
    resume_at: Option<DateTime<Utc>>,
    error: Option<String>,
    skipped_reason: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl FlowRunActionRow {
    fn try_into_record(self) -> Result<FlowRunAction, sqlx::Error> {
        let attempt = u32::try_from(self.attempt).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid attempt {}: {e}", self.attempt),
            )))
        })?;

        Ok(FlowRunAction {
            id: parse_column("attempt id", &self.id)?,
            run_id: parse_column("run id", &self.run_id)?,
            node_id: parse_column("node id", &self.node_id)?,
            action_type: parse_name(
                "action type",
                &self.action_type,
                ActionType::from_str_value,
            )?,
            attempt,
            status: parse_name("attempt status", &self.status, ActionStatus::from_str_value)?,
            outcome: self.outcome,
            resume_at: self.resume_at,
            error: self.error,
            skipped_reason: self.skipped_reason,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// Runs and attempts in Postgres.
#[derive(Clone)]
pub struct PgRunLedger {
    pool: PgPool,
}

impl PgRunLedger {
    /// Creates a new ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunLedger for PgRunLedger {
    async fn create_run(&self, run: &FlowRun) -> Result<(), LedgerError> {
        sqlx::query(&format!(
            "INSERT INTO flow_runs ({RUN_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(run.id.to_string())
        .bind(run.flow_id.to_string())
        .bind(run.workspace_id.to_string())
        .bind(run.trigger_node_id.to_string())
        .bind(run.trigger_kind.as_str())
        .bind(run.recipient.fan_id.map(|id| id.to_string()))
        .bind(run.recipient.cart_id.map(|id| id.to_string()))
        .bind(run.current_action_node_id.map(|id| id.to_string()))
        .bind(run.current_attempt_id.map(|id| id.to_string()))
        .bind(run.status.as_str())
        .bind(&run.error)
        .bind(run.version)
        .bind(run.created_at)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await
        .map_err(ledger_error)?;

        Ok(())
    }

    async fn get_run(&self, run_id: FlowRunId) -> Result<Option<FlowRun>, LedgerError> {
        let row: Option<FlowRunRow> =
            sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM flow_runs WHERE id = $1"))
                .bind(run_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(ledger_error)?;

        row.map(FlowRunRow::try_into_record)
            .transpose()
            .map_err(ledger_error)
    }

    async fn update_run(&self, run: &mut FlowRun) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE flow_runs
            SET current_action_node_id = $3, current_attempt_id = $4, status = $5, error = $6,
                started_at = $7, finished_at = $8, updated_at = $9, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.version)
        .bind(run.current_action_node_id.map(|id| id.to_string()))
        .bind(run.current_attempt_id.map(|id| id.to_string()))
        .bind(run.status.as_str())
        .bind(&run.error)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await
        .map_err(ledger_error)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Conflict {
                run_id: run.id,
                expected_version: run.version,
            });
        }
        run.version += 1;
        Ok(())
    }

    async fn find_runs(
        &self,
        flow_id: FlowId,
        recipient: RecipientKey,
    ) -> Result<Vec<FlowRun>, LedgerError> {
        let (column, value) = match recipient {
            RecipientKey::Fan(fan_id) => ("fan_id", fan_id.to_string()),
            RecipientKey::Cart(cart_id) => ("cart_id", cart_id.to_string()),
        };
        let rows: Vec<FlowRunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM flow_runs \
             WHERE flow_id = $1 AND {column} = $2 \
             ORDER BY created_at ASC"
        ))
        .bind(flow_id.to_string())
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_error)?;

        rows.into_iter()
            .map(FlowRunRow::try_into_record)
            .collect::<Result<_, _>>()
            .map_err(ledger_error)
    }

    async fn list_active(&self) -> Result<Vec<FlowRun>, LedgerError> {
        let rows: Vec<FlowRunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM flow_runs \
             WHERE status IN ('pending', 'running') \
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_error)?;

        rows.into_iter()
            .map(FlowRunRow::try_into_record)
            .collect::<Result<_, _>>()
            .map_err(ledger_error)
    }

    async fn create_run_action(&self, action: &FlowRunAction) -> Result<(), LedgerError> {
        sqlx::query(&format!(
            "INSERT INTO flow_run_actions ({ACTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(action.id.to_string())
        .bind(action.run_id.to_string())
        .bind(action.node_id.to_string())
        .bind(action.action_type.as_str())
        .bind(attempt_column(action.attempt))
        .bind(action.status.as_str())
        .bind(action.outcome)
        .bind(action.resume_at)
        .bind(&action.error)
        .bind(&action.skipped_reason)
        .bind(action.created_at)
        .bind(action.started_at)
        .bind(action.completed_at)
        .execute(&self.pool)
        .await
        .map_err(ledger_error)?;

        Ok(())
    }

    async fn update_run_action(&self, action: &FlowRunAction) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE flow_run_actions
            SET status = $2, outcome = $3, resume_at = $4, error = $5, skipped_reason = $6,
                started_at = $7, completed_at = $8
            WHERE id = $1
            "#,
        )
        .bind(action.id.to_string())
        .bind(action.status.as_str())
        .bind(action.outcome)
        .bind(action.resume_at)
        .bind(&action.error)
        .bind(&action.skipped_reason)
        .bind(action.started_at)
        .bind(action.completed_at)
        .execute(&self.pool)
        .await
        .map_err(ledger_error)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound {
                entity: "run action",
                id: action.id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_run_action(
        &self,
        action_id: FlowRunActionId,
    ) -> Result<Option<FlowRunAction>, LedgerError> {
        let row: Option<FlowRunActionRow> = sqlx::query_as(&format!(
            "SELECT {ACTION_COLUMNS} FROM flow_run_actions WHERE id = $1"
        ))
        .bind(action_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_error)?;

        row.map(FlowRunActionRow::try_into_record)
            .transpose()
            .map_err(ledger_error)
    }

    async fn latest_run_action(
        &self,
        run_id: FlowRunId,
        node_id: NodeId,
    ) -> Result<Option<FlowRunAction>, LedgerError> {
        let row: Option<FlowRunActionRow> = sqlx::query_as(&format!(
            "SELECT {ACTION_COLUMNS} FROM flow_run_actions \
             WHERE run_id = $1 AND node_id = $2 \
             ORDER BY attempt DESC \
             LIMIT 1"
        ))
        .bind(run_id.to_string())
        .bind(node_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_error)?;

        row.map(FlowRunActionRow::try_into_record)
            .transpose()
            .map_err(ledger_error)
    }

    async fn list_run_actions(
        &self,
        run_id: FlowRunId,
    ) -> Result<Vec<FlowRunAction>, LedgerError> {
        let rows: Vec<FlowRunActionRow> = sqlx::query_as(&format!(
            "SELECT {ACTION_COLUMNS} FROM flow_run_actions \
             WHERE run_id = $1 \
             ORDER BY created_at ASC, attempt ASC"
        ))
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_error)?;

        rows.into_iter()
            .map(FlowRunActionRow::try_into_record)
            .collect::<Result<_, _>>()
            .map_err(ledger_error)
    }
}

/// Attempt numbers are small; saturate rather than wrap if one ever is not.
fn attempt_column(attempt: u32) -> i32 {
    i32::try_from(attempt).unwrap_or(i32::MAX)
}
