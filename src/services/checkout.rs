//! Checkout orchestration: builds gateway sessions from priced carts and
//! reconciles completed payments into orders.

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    CreateSessionRequest, PaymentGateway, PaymentStatus, SessionDetails, SessionMetadata,
};
use crate::repositories::{InsertOutcome, NewOrder, NewOrderItem, OrderStore};
use crate::services::coupons::CouponLedger;
use crate::services::pricing::{self, CartLineItem};
use crate::services::rewards::RewardIssuer;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Cart line frozen into session metadata at creation time, so the order
/// records the prices the buyer saw even if the catalog changes before
/// payment completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
}

/// Outcome of creating a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutCreated {
    pub session_id: String,
    /// Hosted payment page URL, when the gateway provides one.
    pub checkout_url: Option<String>,
    /// Discounted total in major currency units.
    pub total_amount: Decimal,
}

/// Outcome of reconciling a checkout session against the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment confirmed and an order was recorded.
    Completed { order_id: Uuid },
    /// Payment confirmed earlier; the order already exists.
    AlreadyRecorded { order_id: Uuid },
    /// The gateway has not seen a payment for this session yet.
    NotYetPaid,
}

pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderStore>,
    coupons: Arc<CouponLedger>,
    rewards: RewardIssuer,
    event_sender: EventSender,
    currency: String,
    client_url: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderStore>,
        coupons: Arc<CouponLedger>,
        rewards: RewardIssuer,
        event_sender: EventSender,
        currency: String,
        client_url: String,
    ) -> Self {
        Self {
            gateway,
            orders,
            coupons,
            rewards,
            event_sender,
            currency,
            client_url,
        }
    }

    /// Creates a hosted checkout session for the user's cart.
    ///
    /// A submitted coupon code that does not resolve to one of the user's
    /// active coupons is dropped, not rejected: the buyer still gets a
    /// session, just without the discount. Qualifying totals earn the user a
    /// reward coupon for their next purchase.
    #[instrument(skip(self, items, coupon_code), fields(%user_id, item_count = items.len()))]
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        items: Vec<CartLineItem>,
        coupon_code: Option<String>,
    ) -> Result<CheckoutCreated, ServiceError> {
        let coupon = match coupon_code.as_deref() {
            Some(code) => match self.coupons.validate(code, user_id).await {
                Ok(coupon) => Some(coupon),
                Err(ServiceError::NotFound(reason)) => {
                    info!(code, %reason, "ignoring unusable coupon at checkout");
                    None
                }
                Err(err) => return Err(err),
            },
            None => None,
        };

        let priced = pricing::price_cart(&items, coupon.as_ref(), user_id, &self.currency)?;

        let discount_coupon_id = match &coupon {
            Some(coupon) => Some(
                self.gateway
                    .create_percent_off_coupon(coupon.discount_percentage)
                    .await?,
            ),
            None => None,
        };

        let snapshot: Vec<ProductSnapshot> = items
            .iter()
            .map(|item| ProductSnapshot {
                id: item.id,
                quantity: item.effective_quantity(),
                price: item.price,
            })
            .collect();
        let products = serde_json::to_string(&snapshot)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

        let session = self
            .gateway
            .create_checkout_session(CreateSessionRequest {
                line_items: priced.line_items,
                // The gateway substitutes the placeholder with the real
                // session id on redirect.
                success_url: format!(
                    "{}/checkout-success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.client_url
                ),
                cancel_url: format!("{}/checkout", self.client_url),
                discount_coupon_id,
                metadata: SessionMetadata {
                    user_id,
                    coupon_code: coupon.map(|c| c.code),
                    products,
                },
            })
            .await?;

        if RewardIssuer::qualifies(priced.total_minor) {
            self.rewards.issue_for(user_id).await?;
        }

        self.event_sender
            .send(Event::CheckoutSessionCreated {
                user_id,
                session_id: session.id.clone(),
                total_minor: priced.total_minor,
            })
            .await;

        Ok(CheckoutCreated {
            session_id: session.id,
            checkout_url: session.url,
            total_amount: Decimal::new(priced.total_minor, 2),
        })
    }

    /// Reconciles a session the client reports as complete. Safe to call any
    /// number of times for the same session; at most one order is recorded.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, session_id: &str) -> Result<ReconcileOutcome, ServiceError> {
        let details = self
            .gateway
            .retrieve_session(session_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("checkout session '{session_id}' not found"))
            })?;

        if details.payment_status != PaymentStatus::Paid {
            warn!(
                session_id,
                status = ?details.payment_status,
                "reconcile requested before payment settled"
            );
            return Ok(ReconcileOutcome::NotYetPaid);
        }

        let order = self.order_from_session(&details)?;
        let user_id = details.metadata.user_id;

        match self.orders.insert_if_absent(order).await? {
            InsertOutcome::Inserted(order_id) => {
                if let Some(code) = &details.metadata.coupon_code {
                    self.coupons.redeem(code, user_id).await?;
                }
                self.event_sender.send(Event::OrderCreated(order_id)).await;
                Ok(ReconcileOutcome::Completed { order_id })
            }
            InsertOutcome::Exists(order_id) => {
                // A previous attempt may have recorded the order and then
                // failed before spending the coupon. Redeem is idempotent,
                // so settle it here as well.
                if let Some(code) = &details.metadata.coupon_code {
                    self.coupons.redeem(code, user_id).await?;
                }
                info!(session_id, %order_id, "session already reconciled");
                Ok(ReconcileOutcome::AlreadyRecorded { order_id })
            }
        }
    }

    fn order_from_session(&self, details: &SessionDetails) -> Result<NewOrder, ServiceError> {
        let snapshot: Vec<ProductSnapshot> = serde_json::from_str(&details.metadata.products)
            .map_err(|e| {
                ServiceError::SerializationError(format!(
                    "session '{}' carries an unreadable product snapshot: {e}",
                    details.id
                ))
            })?;

        let items = snapshot
            .into_iter()
            .map(|product| NewOrderItem {
                product_id: product.id,
                quantity: product.quantity as i32,
                price: product.price,
            })
            .collect();

        Ok(NewOrder {
            user_id: details.metadata.user_id,
            total_amount: Decimal::new(details.amount_total, 2),
            currency: self.currency.clone(),
            checkout_session_id: details.id.clone(),
            items,
        })
    }
}
