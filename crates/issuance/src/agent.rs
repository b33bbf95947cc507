//! Courier booking for cash-on-delivery orders.

use common::OrderId;
use domain::{Order, OrderStatus, Policy, PolicyStatus, ValidationError};
use policy_store::{PolicyStore, PolicyStoreExt, StatusUpdate};

use crate::config::{AgentConfig, CourierAccount, CourierConfig};
use crate::error::{IssuanceError, Result};
use crate::services::{
    BookingPayload, BookingProduct, CourierService, Notification, NotificationChannel,
    NotificationPayload, NotificationService, signed_document_link,
};

/// What a booking attempt achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked { tracking_number: String },
    /// The order already carries a tracking number; nothing was sent.
    AlreadyBooked { tracking_number: String },
    /// The order is in no state to ship; nothing was sent.
    Skipped { reason: String },
}

impl BookingOutcome {
    pub fn tracking_number(&self) -> Option<&str> {
        match self {
            BookingOutcome::Booked { tracking_number }
            | BookingOutcome::AlreadyBooked { tracking_number } => Some(tracking_number),
            BookingOutcome::Skipped { .. } => None,
        }
    }
}

/// Books the courier for an order and moves it to `pendingCOD` on success.
///
/// Only `unverified` orders with a policy code are booked. A tracking number
/// on the order means the consignment exists, so the courier is never called
/// twice for it.
///
/// Notification failures after a successful booking are logged and
/// swallowed; only the booking itself can fail the call.
pub struct CourierBookingAgent<S, C, N> {
    store: S,
    courier: C,
    notifier: N,
    courier_config: CourierConfig,
    config: AgentConfig,
}

impl<S, C, N> CourierBookingAgent<S, C, N>
where
    S: PolicyStore,
    C: CourierService,
    N: NotificationService,
{
    pub fn new(
        store: S,
        courier: C,
        notifier: N,
        courier_config: CourierConfig,
        config: AgentConfig,
    ) -> Self {
        Self {
            store,
            courier,
            notifier,
            courier_config,
            config,
        }
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn book(&self, order_id: OrderId) -> Result<BookingOutcome> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| IssuanceError::not_found("order", order_id))?;
        let policy = self.store.require_policy_by_order(order_id).await?;

        if let Some(tracking_number) = order.tracking_number.clone() {
            if order.status == OrderStatus::Unverified {
                // booked earlier, status move was lost
                self.mark_booked(&order, &policy, &tracking_number).await?;
                tracing::info!(%tracking_number, "recorded earlier courier booking");
                self.notify_booked(&order, &policy, &tracking_number).await;
            } else {
                tracing::info!(%tracking_number, "order already booked, skipping");
            }
            return Ok(BookingOutcome::AlreadyBooked { tracking_number });
        }

        if order.status != OrderStatus::Unverified {
            return Ok(skipped(format!("order is {}", order.status)));
        }
        let Some(policy_code) = policy.policy_code.clone() else {
            return Ok(skipped("policy has no code".to_string()));
        };

        let city = self
            .store
            .find_city(order.city_id)
            .await?
            .ok_or_else(|| IssuanceError::not_found("city", order.city_id))?;

        let account = self.courier_config.account_for(policy.takaful_policy);
        let payload = booking_payload(&order, &policy, &policy_code, account, &city.name)?;

        let booking = match self.courier.book(account, &payload).await {
            Ok(booking) => booking,
            Err(e) => {
                metrics::counter!("courier_booking_failures_total").increment(1);
                tracing::warn!(error = %e, "courier booking failed");
                return Err(e);
            }
        };
        metrics::counter!("courier_bookings_total").increment(1);
        let tracking_number = booking.tracking_number;

        if let Err(e) = self.mark_booked(&order, &policy, &tracking_number).await {
            return Err(self.save_tracking_only(&order, &policy, tracking_number, e).await);
        }
        tracing::info!(%tracking_number, "courier booked");

        self.notify_booked(&order, &policy, &tracking_number).await;

        Ok(BookingOutcome::Booked { tracking_number })
    }

    async fn mark_booked(
        &self,
        order: &Order,
        policy: &Policy,
        tracking_number: &str,
    ) -> Result<()> {
        let update = StatusUpdate::new(order.id, policy.id)
            .with_tracking_number(tracking_number)
            .with_order_status(OrderStatus::PendingCod)
            .with_policy_status(PolicyStatus::PendingCod);
        Ok(self.store.apply_status_update(update).await?)
    }

    /// Falls back to saving only the tracking number after the full status
    /// write failed, so a retry records the booking instead of repeating it.
    ///
    /// Returns the error the task should fail with. When even the tracking
    /// number cannot be saved the booking is unrecorded and must not be
    /// retried.
    async fn save_tracking_only(
        &self,
        order: &Order,
        policy: &Policy,
        tracking_number: String,
        cause: IssuanceError,
    ) -> IssuanceError {
        let update =
            StatusUpdate::new(order.id, policy.id).with_tracking_number(tracking_number.clone());
        match self.store.apply_status_update(update).await {
            Ok(()) => {
                tracing::warn!(
                    %tracking_number,
                    error = %cause,
                    "courier booked, status not moved; retry will record it"
                );
                cause
            }
            Err(e) => {
                metrics::counter!("courier_bookings_unrecorded_total").increment(1);
                tracing::error!(
                    order_code = %order.order_code,
                    %tracking_number,
                    error = %e,
                    "courier booked but tracking number not saved"
                );
                IssuanceError::BookingUnrecorded {
                    order_code: order.order_code.clone(),
                    tracking_number,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Tells the customer and partner that the policy ships. Best effort.
    async fn notify_booked(&self, order: &Order, policy: &Policy, tracking_number: &str) {
        let Some(policy_code) = policy.policy_code.clone() else {
            return;
        };

        let lookups = tokio::try_join!(
            self.store.find_product(policy.product_id),
            self.store.find_plan(policy.plan_id),
        );
        let (product, plan) = match lookups {
            Ok((Some(product), Some(plan))) => (product, plan),
            Ok(_) => {
                tracing::warn!("product or plan missing, notifications not sent");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "notification lookups failed");
                return;
            }
        };

        let document_link = match signed_document_link(
            &self.config.document_base_url,
            &self.config.link_secret,
            &order.order_code,
            &policy_code,
        ) {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "document link not signed, notifications not sent");
                return;
            }
        };

        let payload = NotificationPayload {
            order_code: order.order_code.clone(),
            customer_name: order.customer.name.clone(),
            product_name: product.name,
            plan_name: plan.name,
            premium: order.received_premium.to_decimal_string(),
            document_link,
            policy_code,
            tracking_number: Some(tracking_number.to_string()),
            template: None,
        };
        self.notify(order, payload).await;
    }

    async fn notify(&self, order: &Order, payload: NotificationPayload) {
        let mut notifications = Vec::new();

        match order.customer.email.as_deref().filter(|e| !e.trim().is_empty()) {
            Some(email) => notifications.push(Notification {
                channel: NotificationChannel::Email,
                recipient: email.to_string(),
                payload: payload.clone(),
            }),
            None => notifications.push(Notification {
                channel: NotificationChannel::Sms,
                recipient: order.customer.phone.clone(),
                payload: payload.clone(),
            }),
        }

        if let Some(template) = &self.config.partner.whatsapp_template {
            notifications.push(Notification {
                channel: NotificationChannel::WhatsApp,
                recipient: order.customer.phone.clone(),
                payload: NotificationPayload {
                    template: Some(template.clone()),
                    ..payload.clone()
                },
            });
        }

        if let Some(url) = &self.config.partner.status_callback_url {
            notifications.push(Notification {
                channel: NotificationChannel::StatusCallback,
                recipient: url.clone(),
                payload,
            });
        }

        for notification in &notifications {
            if let Err(e) = self.notifier.send(notification).await {
                tracing::warn!(
                    channel = notification.channel.as_str(),
                    error = %e,
                    "notification failed"
                );
            }
        }
    }
}

fn skipped(reason: String) -> BookingOutcome {
    tracing::warn!(%reason, "order not booked");
    BookingOutcome::Skipped { reason }
}

fn booking_payload(
    order: &Order,
    policy: &Policy,
    policy_code: &str,
    account: &CourierAccount,
    city: &str,
) -> Result<BookingPayload> {
    let declared_value = policy
        .item_price
        .checked_multiply(policy.quantity)
        .ok_or(ValidationError::AmountOutOfRange {
            field: "item_price",
        })?;

    let (name, address, phone) = match &order.shipping {
        Some(shipping) => (
            shipping.recipient_name.clone(),
            shipping.address.clone(),
            shipping.phone.clone(),
        ),
        None => (
            order.customer.name.clone(),
            order.customer.address.clone().unwrap_or_default(),
            order.customer.phone.clone(),
        ),
    };

    Ok(BookingPayload {
        shipper_name: account.shipper.name.clone(),
        shipper_phone: account.shipper.phone.clone(),
        shipper_address: account.shipper.address.clone(),
        shipper_city: account.shipper.city.clone(),
        consignee_name: name,
        consignee_phone: phone,
        consignee_address: address,
        consignee_city: city.to_string(),
        order_ref: order.order_code.clone(),
        pieces: 1,
        declared_value: declared_value.to_decimal_string(),
        cod_amount: order.received_premium.to_decimal_string(),
        products: vec![BookingProduct {
            product_code: policy_code.to_string(),
            sku: policy.sku.clone(),
            quantity: policy.quantity,
            price: policy.item_price.to_decimal_string(),
        }],
    })
}
