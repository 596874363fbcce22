//! Fans, sender settings and connected Mailchimp accounts.

use super::{parse_column, store_error};
use async_trait::async_trait;
use encore_core::{FanId, WorkspaceId};
use encore_flow::StoreError;
use encore_flow::contact::{AudienceAccount, ContactStore, Fan, SenderProfile};
use sqlx::{FromRow, PgPool};

/// Row type for fan queries.
#[derive(FromRow)]
struct FanRow {
    id: String,
    workspace_id: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email_marketing_opt_in: bool,
}

impl FanRow {
    fn try_into_record(self) -> Result<Fan, sqlx::Error> {
        Ok(Fan {
            id: parse_column("fan id", &self.id)?,
            workspace_id: parse_column("workspace id", &self.workspace_id)?,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            email_marketing_opt_in: self.email_marketing_opt_in,
        })
    }
}

#[derive(FromRow)]
struct SenderRow {
    from_address: String,
    from_name: Option<String>,
    unsubscribe_base_url: String,
}

#[derive(FromRow)]
struct AccountRow {
    api_key: String,
    server_prefix: String,
}

/// Contacts and workspace settings in Postgres.
#[derive(Clone)]
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn get_fan(&self, fan_id: FanId) -> Result<Option<Fan>, StoreError> {
        let row: Option<FanRow> = sqlx::query_as(
            r#"
            SELECT id, workspace_id, email, first_name, last_name, email_marketing_opt_in
            FROM fans
            WHERE id = $1
            "#,
        )
        .bind(fan_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(FanRow::try_into_record)
            .transpose()
            .map_err(store_error)
    }

    async fn sender_profile(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<SenderProfile>, StoreError> {
        let row: Option<SenderRow> = sqlx::query_as(
            r#"
            SELECT from_address, from_name, unsubscribe_base_url
            FROM workspace_senders
            WHERE workspace_id = $1
            "#,
        )
        .bind(workspace_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(|r| SenderProfile {
            from_address: r.from_address,
            from_name: r.from_name,
            unsubscribe_base_url: r.unsubscribe_base_url,
        }))
    }

    async fn audience_account(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<AudienceAccount>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT api_key, server_prefix
            FROM mailchimp_accounts
            WHERE workspace_id = $1
            "#,
        )
        .bind(workspace_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(|r| AudienceAccount {
            api_key: r.api_key,
            server_prefix: r.server_prefix,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_row_decodes() {
        let id = FanId::new();
        let fan = FanRow {
            id: id.to_string(),
            workspace_id: WorkspaceId::new().to_string(),
            email: "ada@example.com".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: None,
            email_marketing_opt_in: true,
        }
        .try_into_record()
        .unwrap();

        assert_eq!(fan.id, id);
        assert!(fan.email_marketing_opt_in);
    }

    #[test]
    fn fan_row_with_bad_id_fails() {
        let row = FanRow {
            id: "fan_garbage".to_string(),
            workspace_id: WorkspaceId::new().to_string(),
            email: "ada@example.com".to_string(),
            first_name: None,
            last_name: None,
            email_marketing_opt_in: false,
        };
        assert!(row.try_into_record().is_err());
    }
}
