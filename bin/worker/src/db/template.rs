//! Email templates, template groups and deliveries.

use super::{parse_column, parse_name, store_error};
use async_trait::async_trait;
use encore_core::{EmailTemplateGroupId, EmailTemplateId, FanId};
use encore_flow::StoreError;
use encore_flow::template::{EmailDelivery, EmailTemplate, TemplateKind, TemplateStore};
use sqlx::{FromRow, PgPool};

/// Row type for template queries.
#[derive(FromRow)]
struct TemplateRow {
    id: String,
    workspace_id: String,
    name: String,
    subject: String,
    body: String,
    kind: String,
}

impl TemplateRow {
    fn try_into_record(self) -> Result<EmailTemplate, sqlx::Error> {
        Ok(EmailTemplate {
            id: parse_column("template id", &self.id)?,
            workspace_id: parse_column("workspace id", &self.workspace_id)?,
            name: self.name,
            subject: self.subject,
            body: self.body,
            kind: parse_name("template kind", &self.kind, TemplateKind::from_str_value)?,
        })
    }
}

#[derive(FromRow)]
struct TemplateIdRow {
    template_id: String,
}

impl TemplateIdRow {
    fn try_into_id(self) -> Result<EmailTemplateId, sqlx::Error> {
        parse_column("template id", &self.template_id)
    }
}

/// Templates and deliveries in Postgres.
#[derive(Clone)]
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn get_template(
        &self,
        template_id: EmailTemplateId,
    ) -> Result<Option<EmailTemplate>, StoreError> {
        let row: Option<TemplateRow> = sqlx::query_as(
            r#"
            SELECT id, workspace_id, name, subject, body, kind
            FROM email_templates
            WHERE id = $1
            "#,
        )
        .bind(template_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(TemplateRow::try_into_record)
            .transpose()
            .map_err(store_error)
    }

    async fn group_template_ids(
        &self,
        group_id: EmailTemplateGroupId,
    ) -> Result<Vec<EmailTemplateId>, StoreError> {
        let rows: Vec<TemplateIdRow> = sqlx::query_as(
            r#"
            SELECT template_id
            FROM email_template_group_members
            WHERE group_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(TemplateIdRow::try_into_id)
            .collect::<Result<_, _>>()
            .map_err(store_error)
    }

    async fn delivered_template_ids(
        &self,
        fan_id: FanId,
        template_ids: &[EmailTemplateId],
    ) -> Result<Vec<EmailTemplateId>, StoreError> {
        if template_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = template_ids.iter().map(ToString::to_string).collect();

        let rows: Vec<TemplateIdRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT template_id
            FROM email_deliveries
            WHERE fan_id = $1 AND template_id = ANY($2)
            "#,
        )
        .bind(fan_id.to_string())
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(TemplateIdRow::try_into_id)
            .collect::<Result<_, _>>()
            .map_err(store_error)
    }

    async fn record_delivery(&self, delivery: &EmailDelivery) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO email_deliveries
                (id, fan_id, template_id, run_id, provider_message_id, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(delivery.id.to_string())
        .bind(delivery.fan_id.to_string())
        .bind(delivery.template_id.to_string())
        .bind(delivery.run_id.map(|id| id.to_string()))
        .bind(&delivery.provider_message_id)
        .bind(delivery.sent_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}
