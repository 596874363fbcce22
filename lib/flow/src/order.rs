//! Completed orders, as read by boolean conditions.

use crate::error::StoreError;
use async_trait::async_trait;
use encore_core::{CartFunnelId, FanId, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// An order bump offered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBump {
    pub product_id: ProductId,
    /// Only an added bump counts as ordered.
    pub added: bool,
}

/// An upsell offered after checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpsell {
    pub product_id: ProductId,
    /// Only a converted upsell counts as ordered.
    pub converted: bool,
}

/// A completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub fan_id: FanId,
    pub cart_funnel_id: CartFunnelId,
    pub main_product_id: ProductId,
    pub bump: Option<OrderBump>,
    pub upsells: Vec<OrderUpsell>,
    /// Amount in minor currency units.
    pub order_amount: i64,
}

impl Order {
    /// Whether the fan actually bought the product in this order.
    #[must_use]
    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.main_product_id == product_id
            || self
                .bump
                .as_ref()
                .is_some_and(|b| b.added && b.product_id == product_id)
            || self
                .upsells
                .iter()
                .any(|u| u.converted && u.product_id == product_id)
    }
}

/// Narrows an order lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub cart_funnel_id: Option<CartFunnelId>,
}

/// Read access to completed orders.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Lists a fan's completed orders matching the filter.
    async fn find_completed_orders(
        &self,
        fan_id: FanId,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, StoreError>;
}
