//! Boolean condition evaluation against the order ledger.

use crate::error::{ConditionError, DefinitionError};
use crate::node::{BooleanCondition, NodeId};
use crate::order::{Order, OrderFilter, OrderLedger};
use encore_core::FanId;
use std::sync::Arc;
use tracing::debug;

/// Evaluates boolean conditions for a run's recipient.
#[derive(Clone)]
pub struct ConditionEvaluator {
    orders: Arc<dyn OrderLedger>,
}

impl ConditionEvaluator {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderLedger>) -> Self {
        Self { orders }
    }

    /// Evaluates `condition` for the fan.
    ///
    /// Only completed orders count. A bump counts as ordered only if it was
    /// added, an upsell only if it converted.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no fan, the order ledger fails, the
    /// condition lacks a required field or the fan's order total does not
    /// fit in an `i64`.
    pub async fn evaluate(
        &self,
        node_id: NodeId,
        condition: &BooleanCondition,
        fan_id: Option<FanId>,
    ) -> Result<bool, ConditionError> {
        let fan_id = fan_id.ok_or(ConditionError::MissingRecipient)?;

        let result = match condition {
            BooleanCondition::HasOrderedProduct { product_id } => {
                let orders = self.completed_orders(fan_id, OrderFilter::default()).await?;
                match product_id {
                    Some(product_id) => orders.iter().any(|o| o.contains_product(*product_id)),
                    None => !orders.is_empty(),
                }
            }
            BooleanCondition::HasOrderedCart { cart_funnel_id } => {
                let filter = OrderFilter {
                    cart_funnel_id: *cart_funnel_id,
                };
                !self.completed_orders(fan_id, filter).await?.is_empty()
            }
            BooleanCondition::HasOrderedAmount { total_order_amount } => {
                let threshold = total_order_amount.ok_or(ConditionError::Definition(
                    DefinitionError::MissingField {
                        node_id,
                        field: "totalOrderAmount",
                    },
                ))?;
                let total = self
                    .completed_orders(fan_id, OrderFilter::default())
                    .await?
                    .iter()
                    .try_fold(0_i64, |total, o| total.checked_add(o.order_amount))
                    .ok_or(ConditionError::AmountOverflow { fan_id })?;
                total >= threshold
            }
        };

        debug!(%node_id, %fan_id, condition = condition.as_str(), result, "evaluated condition");
        Ok(result)
    }

    async fn completed_orders(
        &self,
        fan_id: FanId,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, ConditionError> {
        self.orders
            .find_completed_orders(fan_id, filter)
            .await
            .map_err(ConditionError::Ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::testing::{InMemoryOrders, order};
    use encore_core::{CartFunnelId, ProductId};

    fn evaluator(orders: &Arc<InMemoryOrders>) -> ConditionEvaluator {
        ConditionEvaluator::new(orders.clone())
    }

    #[tokio::test]
    async fn amount_threshold_is_inclusive() {
        let fan = FanId::new();
        let orders = Arc::new(InMemoryOrders::default());
        orders.add(order(fan, CartFunnelId::new(), 3000));
        orders.add(order(fan, CartFunnelId::new(), 2000));
        let evaluator = evaluator(&orders);

        let at = |amount| BooleanCondition::HasOrderedAmount {
            total_order_amount: Some(amount),
        };
        assert!(evaluator.evaluate(NodeId::new(), &at(5000), Some(fan)).await.unwrap());
        assert!(evaluator.evaluate(NodeId::new(), &at(4999), Some(fan)).await.unwrap());
        assert!(!evaluator.evaluate(NodeId::new(), &at(5001), Some(fan)).await.unwrap());
    }

    #[tokio::test]
    async fn overflowing_order_total_is_error() {
        let fan = FanId::new();
        let orders = Arc::new(InMemoryOrders::default());
        orders.add(order(fan, CartFunnelId::new(), i64::MAX));
        orders.add(order(fan, CartFunnelId::new(), 1));
        let evaluator = evaluator(&orders);

        let condition = BooleanCondition::HasOrderedAmount {
            total_order_amount: Some(5000),
        };
        let err = evaluator
            .evaluate(NodeId::new(), &condition, Some(fan))
            .await
            .unwrap_err();
        assert_eq!(err, ConditionError::AmountOverflow { fan_id: fan });
    }

    #[tokio::test]
    async fn amount_below_threshold_is_false() {
        let fan = FanId::new();
        let orders = Arc::new(InMemoryOrders::default());
        orders.add(order(fan, CartFunnelId::new(), 4999));
        let evaluator = evaluator(&orders);

        let condition = BooleanCondition::HasOrderedAmount {
            total_order_amount: Some(5000),
        };
        assert!(!evaluator.evaluate(NodeId::new(), &condition, Some(fan)).await.unwrap());
    }

    #[tokio::test]
    async fn missing_threshold_is_definition_error() {
        let node_id = NodeId::new();
        let orders = Arc::new(InMemoryOrders::default());
        let condition = BooleanCondition::HasOrderedAmount {
            total_order_amount: None,
        };
        let err = evaluator(&orders)
            .evaluate(node_id, &condition, Some(FanId::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConditionError::Definition(DefinitionError::MissingField {
                node_id,
                field: "totalOrderAmount"
            })
        );
    }

    #[tokio::test]
    async fn product_matches_added_bump_only() {
        let fan = FanId::new();
        let bumped = ProductId::new();
        let orders = Arc::new(InMemoryOrders::default());
        let mut with_bump = order(fan, CartFunnelId::new(), 1000);
        with_bump.bump = Some(crate::order::OrderBump {
            product_id: bumped,
            added: false,
        });
        orders.add(with_bump);
        let evaluator = evaluator(&orders);

        let condition = BooleanCondition::HasOrderedProduct {
            product_id: Some(bumped),
        };
        assert!(!evaluator.evaluate(NodeId::new(), &condition, Some(fan)).await.unwrap());

        let any = BooleanCondition::HasOrderedProduct { product_id: None };
        assert!(evaluator.evaluate(NodeId::new(), &any, Some(fan)).await.unwrap());
    }

    #[tokio::test]
    async fn cart_condition_scopes_to_funnel() {
        let fan = FanId::new();
        let funnel = CartFunnelId::new();
        let orders = Arc::new(InMemoryOrders::default());
        orders.add(order(fan, funnel, 1000));
        let evaluator = evaluator(&orders);

        let this_funnel = BooleanCondition::HasOrderedCart {
            cart_funnel_id: Some(funnel),
        };
        let other_funnel = BooleanCondition::HasOrderedCart {
            cart_funnel_id: Some(CartFunnelId::new()),
        };
        assert!(evaluator.evaluate(NodeId::new(), &this_funnel, Some(fan)).await.unwrap());
        assert!(!evaluator.evaluate(NodeId::new(), &other_funnel, Some(fan)).await.unwrap());
        assert!(
            !evaluator
                .evaluate(NodeId::new(), &this_funnel, Some(FanId::new()))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn missing_recipient_is_error() {
        let orders = Arc::new(InMemoryOrders::default());
        let condition = BooleanCondition::HasOrderedCart {
            cart_funnel_id: None,
        };
        let err = evaluator(&orders)
            .evaluate(NodeId::new(), &condition, None)
            .await
            .unwrap_err();
        assert_eq!(err, ConditionError::MissingRecipient);
    }

    #[tokio::test]
    async fn ledger_failure_is_error() {
        let orders = Arc::new(InMemoryOrders::default());
        orders.fail_with("connection reset");
        let condition = BooleanCondition::HasOrderedCart {
            cart_funnel_id: None,
        };
        let err = evaluator(&orders)
            .evaluate(NodeId::new(), &condition, Some(FanId::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConditionError::Ledger(StoreError::Storage {
                message: "connection reset".to_string()
            })
        );
    }
}
