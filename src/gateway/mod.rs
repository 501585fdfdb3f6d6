//! Payment gateway abstraction.
//!
//! The gateway owns the hosted checkout flow: the storefront only creates
//! sessions, retrieves their state by id, and mints single-use discount
//! objects. The trait is object-safe so handlers and tests can inject fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub mod stripe;

pub use stripe::StripeGateway;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network-level failure before a response was received.
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// The provider rejected the request. Carries the provider's message.
    #[error("{0}")]
    Rejected(String),

    /// The provider returned a server error.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider returned a payload we could not interpret.
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Transport and provider-side failures are transient; rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable(_))
    }
}

/// A single line of a checkout session request, priced in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayLineItem {
    pub currency: String,
    pub name: String,
    pub image: String,
    pub unit_amount_minor: i64,
    pub quantity: u32,
}

/// Reconciliation metadata attached to a session at creation time and read
/// back verbatim when the client reports payment completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub user_id: Uuid,
    pub coupon_code: Option<String>,
    /// JSON-serialized `[{id, quantity, price}]` snapshot of the cart,
    /// frozen so the order records the prices the buyer saw.
    pub products: String,
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub line_items: Vec<GatewayLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Gateway-side discount object id, if a coupon applies.
    pub discount_coupon_id: Option<String>,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page URL the client redirects to.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "paid" => Self::Paid,
            "no_payment_required" => Self::NoPaymentRequired,
            _ => Self::Unpaid,
        }
    }
}

/// Session state as reported by the gateway at reconciliation time.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: PaymentStatus,
    /// Gateway-computed total in minor currency units.
    pub amount_total: i64,
    pub metadata: SessionMetadata,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted checkout session. The metadata round-trips through
    /// the gateway untouched.
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Fetches a session by id. `None` when the gateway has no such session.
    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionDetails>, GatewayError>;

    /// Mints a single-use percent-off discount object and returns its id.
    async fn create_percent_off_coupon(&self, percent_off: i32) -> Result<String, GatewayError>;
}

/// Retries `operation` up to [`MAX_ATTEMPTS`] times with doubling backoff.
/// Only transient errors are retried; rejections surface immediately.
pub(crate) async fn with_retry<T, F, Fut>(name: &str, mut operation: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                let backoff = BASE_BACKOFF * 2u32.saturating_pow(attempt - 1);
                warn!(
                    operation = name,
                    attempt,
                    error = %err,
                    "transient gateway failure, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
