//! Completed orders.

use super::{parse_column, parse_optional_column, store_error};
use async_trait::async_trait;
use encore_core::{FanId, ProductId};
use encore_flow::StoreError;
use encore_flow::order::{Order, OrderBump, OrderFilter, OrderLedger, OrderUpsell};
use sqlx::{FromRow, PgPool};

/// Row type for order queries.
#[derive(FromRow)]
struct OrderRow {
    id: String,
    fan_id: String,
    cart_funnel_id: String,
    main_product_id: String,
    bump_product_id: Option<String>,
    bump_added: bool,
    upsells: serde_json::Value,
    order_amount: i64,
}

impl OrderRow {
    fn try_into_record(self) -> Result<Order, sqlx::Error> {
        let bump_product_id: Option<ProductId> =
            parse_optional_column("bump product id", self.bump_product_id.as_deref())?;
        let upsells: Vec<OrderUpsell> = serde_json::from_value(self.upsells)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Order {
            id: parse_column("order id", &self.id)?,
            fan_id: parse_column("fan id", &self.fan_id)?,
            cart_funnel_id: parse_column("cart funnel id", &self.cart_funnel_id)?,
            main_product_id: parse_column("product id", &self.main_product_id)?,
            bump: bump_product_id.map(|product_id| OrderBump {
                product_id,
                added: self.bump_added,
            }),
            upsells,
            order_amount: self.order_amount,
        })
    }
}

/// Orders in Postgres.
#[derive(Clone)]
pub struct PgOrderLedger {
    pool: PgPool,
}

impl PgOrderLedger {
    /// Creates a new ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn find_completed_orders(
        &self,
        fan_id: FanId,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, fan_id, cart_funnel_id, main_product_id, bump_product_id, bump_added,
                   upsells, order_amount
            FROM orders
            WHERE fan_id = $1 AND status = 'completed'
              AND ($2::TEXT IS NULL OR cart_funnel_id = $2)
            "#,
        )
        .bind(fan_id.to_string())
        .bind(filter.cart_funnel_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(OrderRow::try_into_record)
            .collect::<Result<_, _>>()
            .map_err(store_error)
    }
}
