//! Wakeups for runs suspended at a wait.

use super::{parse_column, wakeup_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_scheduler::{Wakeup, WakeupError, WakeupStore};
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct WakeupRow {
    run_id: String,
    node_id: String,
    resume_at: DateTime<Utc>,
}

impl WakeupRow {
    fn try_into_record(self) -> Result<Wakeup, sqlx::Error> {
        Ok(Wakeup {
            run_id: parse_column("run id", &self.run_id)?,
            node_id: parse_column("node id", &self.node_id)?,
            resume_at: self.resume_at,
        })
    }
}

/// Wakeups in Postgres, one row per suspended run.
#[derive(Clone)]
pub struct PgWakeupStore {
    pool: PgPool,
}

impl PgWakeupStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WakeupStore for PgWakeupStore {
    async fn schedule(&self, wakeup: &Wakeup) -> Result<(), WakeupError> {
        sqlx::query(
            r#"
            INSERT INTO flow_wakeups (run_id, node_id, resume_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id) DO UPDATE
            SET node_id = EXCLUDED.node_id, resume_at = EXCLUDED.resume_at
            "#,
        )
        .bind(wakeup.run_id.to_string())
        .bind(wakeup.node_id.to_string())
        .bind(wakeup.resume_at)
        .execute(&self.pool)
        .await
        .map_err(wakeup_error)?;

        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Wakeup>, WakeupError> {
        let rows: Vec<WakeupRow> = sqlx::query_as(
            r#"
            SELECT run_id, node_id, resume_at
            FROM flow_wakeups
            WHERE resume_at <= $1
            ORDER BY resume_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(wakeup_error)?;

        rows.into_iter()
            .map(WakeupRow::try_into_record)
            .collect::<Result<_, _>>()
            .map_err(wakeup_error)
    }

    async fn acknowledge(&self, wakeup: &Wakeup) -> Result<(), WakeupError> {
        sqlx::query(
            r#"
            DELETE FROM flow_wakeups
            WHERE run_id = $1 AND node_id = $2 AND resume_at = $3
            "#,
        )
        .bind(wakeup.run_id.to_string())
        .bind(wakeup.node_id.to_string())
        .bind(wakeup.resume_at)
        .execute(&self.pool)
        .await
        .map_err(wakeup_error)?;

        Ok(())
    }
}
