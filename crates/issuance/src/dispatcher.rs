//! Payment-mode specific fulfillment, written by the creating transaction.

use domain::{CodeTemplate, OrderStatus, PaymentModeCode, PolicyStatus, ProductType};
use policy_store::{Activation, TaskKind};

use crate::outbox::OutboxSignal;

/// What fulfillment the creating transaction carries for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Code persisted and a courier booking queued; statuses move on booking.
    CourierQueued,
    /// Code persisted and the order activated.
    Activated { policy_status: PolicyStatus },
    /// Nothing persisted; activation waits for card verification.
    AwaitingVerification,
}

/// Routes an order by payment mode.
///
/// [`prepare`](Self::prepare) runs before the creating transaction and
/// decides what it writes besides the order rows, so the code, statuses and
/// outbox task commit together with the order. [`committed`](Self::committed)
/// runs after commit.
#[derive(Debug, Clone)]
pub struct FulfillmentDispatcher {
    signal: OutboxSignal,
}

impl FulfillmentDispatcher {
    pub fn new(signal: OutboxSignal) -> Self {
        Self { signal }
    }

    pub fn prepare(
        &self,
        payment_mode: &PaymentModeCode,
        product_type: &ProductType,
        code: CodeTemplate,
    ) -> (DispatchOutcome, Option<Activation>) {
        match payment_mode {
            PaymentModeCode::Cod => (
                DispatchOutcome::CourierQueued,
                Some(Activation::new(code).with_task(TaskKind::CourierBooking)),
            ),
            PaymentModeCode::B2b => {
                let policy_status = PolicyStatus::activated_for(product_type);
                (
                    DispatchOutcome::Activated { policy_status },
                    Some(
                        Activation::new(code)
                            .with_order_status(OrderStatus::Verified)
                            .with_policy_status(policy_status),
                    ),
                )
            }
            PaymentModeCode::Other(_) => (DispatchOutcome::AwaitingVerification, None),
        }
    }

    pub fn committed(&self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::CourierQueued => {
                self.signal.notify();
                tracing::info!("courier booking queued");
            }
            DispatchOutcome::Activated { policy_status } => {
                tracing::info!(policy_status = %policy_status, "b2b order activated");
            }
            DispatchOutcome::AwaitingVerification => {
                tracing::debug!("activation deferred to card verification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::BranchCodes;

    fn template() -> CodeTemplate {
        CodeTemplate {
            product_type: ProductType::Travel,
            product_name: "Student Travel".to_string(),
            plan_name: "Standard".to_string(),
            takaful: false,
            branch_codes: BranchCodes::new("DIR", "DIT"),
            category_code: 4,
        }
    }

    #[test]
    fn test_cod_queues_booking_without_moving_statuses() {
        let dispatcher = FulfillmentDispatcher::new(OutboxSignal::new());
        let (outcome, activation) =
            dispatcher.prepare(&PaymentModeCode::Cod, &ProductType::Travel, template());

        assert_eq!(outcome, DispatchOutcome::CourierQueued);
        let activation = activation.unwrap();
        assert_eq!(activation.enqueue, Some(TaskKind::CourierBooking));
        assert_eq!(activation.order_status, None);
        assert_eq!(activation.policy_status, None);
    }

    #[test]
    fn test_b2b_activates_by_product_type() {
        let dispatcher = FulfillmentDispatcher::new(OutboxSignal::new());
        let (outcome, activation) =
            dispatcher.prepare(&PaymentModeCode::B2b, &ProductType::Travel, template());

        assert_eq!(
            outcome,
            DispatchOutcome::Activated {
                policy_status: PolicyStatus::PendingIgis
            }
        );
        let activation = activation.unwrap();
        assert_eq!(activation.order_status, Some(OrderStatus::Verified));
        assert_eq!(activation.policy_status, Some(PolicyStatus::PendingIgis));
        assert_eq!(activation.enqueue, None);
    }

    #[test]
    fn test_card_orders_carry_no_activation() {
        let dispatcher = FulfillmentDispatcher::new(OutboxSignal::new());
        let (outcome, activation) = dispatcher.prepare(
            &PaymentModeCode::Other("CC".to_string()),
            &ProductType::Health,
            template(),
        );

        assert_eq!(outcome, DispatchOutcome::AwaitingVerification);
        assert!(activation.is_none());
    }
}
