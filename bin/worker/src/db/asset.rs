//! Trackable assets referenced from email markup.

use super::provider_error;
use async_trait::async_trait;
use encore_flow::ProviderError;
use encore_flow::provider::{Asset, AssetResolver};
use encore_flow::render::{AssetReference, asset_references};
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct AssetRow {
    kind: String,
    id: String,
    url: String,
}

/// Resolves asset references against the `assets` table.
#[derive(Clone)]
pub struct PgAssetResolver {
    pool: PgPool,
}

impl PgAssetResolver {
    /// Creates a new resolver.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetResolver for PgAssetResolver {
    async fn resolve(&self, markup: &str) -> Result<Vec<Asset>, ProviderError> {
        let references = asset_references(markup);
        if references.is_empty() {
            return Ok(Vec::new());
        }
        let kinds: Vec<String> = references
            .iter()
            .map(|r| r.kind.as_str().to_string())
            .collect();
        let ids: Vec<String> = references.iter().map(|r| r.id.clone()).collect();

        let rows: Vec<AssetRow> = sqlx::query_as(
            r#"
            SELECT a.kind, a.id, a.url
            FROM assets a
            JOIN UNNEST($1::TEXT[], $2::TEXT[]) AS r (kind, id)
              ON a.kind = r.kind AND a.id = r.id
            "#,
        )
        .bind(kinds)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(provider_error)?;

        Ok(match_references(references, &rows))
    }
}

/// Pairs each reference with its stored row, dropping unknown references.
fn match_references(references: Vec<AssetReference>, rows: &[AssetRow]) -> Vec<Asset> {
    references
        .into_iter()
        .filter_map(|reference| {
            let row = rows
                .iter()
                .find(|row| row.kind == reference.kind.as_str() && row.id == reference.id)?;
            Some(Asset {
                kind: reference.kind,
                id: reference.id,
                url: row.url.clone(),
                placeholder: reference.placeholder,
            })
        })
        .collect()
}
