use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::checkout::ReconcileOutcome;
use crate::services::pricing::CartLineItem;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutProduct {
    /// Catalog product identifier
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,

    /// Display name shown on the hosted payment page
    #[schema(example = "Wireless Keyboard")]
    pub name: String,
    /// Product image URL
    #[schema(example = "https://cdn.example.com/keyboard.png")]
    pub image: String,
    /// Unit price in major currency units
    #[schema(example = "49.99")]
    pub price: Decimal,
    /// Defaults to 1 when omitted
    #[schema(example = 2)]
    pub quantity: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "products": [{
        "id": "550e8400-e29b-41d4-a716-446655440000",
        "name": "Wireless Keyboard",
        "image": "https://cdn.example.com/keyboard.png",
        "price": "49.99",
        "quantity": 2
    }],
    "couponCode": "GIFT3F9K2A"
}))]
pub struct CheckoutRequest {
    /// Cart contents; must not be empty
    #[validate(length(min = 1, message = "cart must contain at least one product"))]
    pub products: Vec<CheckoutProduct>,

    /// Coupon to apply, if the user holds one
    #[schema(example = "GIFT3F9K2A")]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Gateway session id; the client echoes this back after payment
    pub id: String,
    /// Hosted payment page URL to redirect the buyer to
    pub url: Option<String>,
    /// Discounted total in major currency units
    pub total_amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({"sessionId": "cs_test_a1b2c3"}))]
pub struct CheckoutSuccessRequest {
    #[validate(length(min = 1, message = "sessionId must not be empty"))]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSuccessResponse {
    /// True once an order exists for the session
    pub success: bool,
    /// `payment recorded`, `order already recorded`, or `payment not completed`
    pub message: String,
    /// Recorded order id, absent while payment is pending
    pub order_id: Option<Uuid>,
}

/// Create a hosted checkout session for the authenticated user's cart
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Empty cart or invalid product data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing user identity", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    request.validate()?;

    let items = request
        .products
        .into_iter()
        .map(|p| CartLineItem {
            id: p.id,
            name: p.name,
            image: p.image,
            price: p.price,
            quantity: p.quantity,
        })
        .collect();

    let created = state
        .services
        .checkout
        .create_checkout_session(user.user_id, items, request.coupon_code)
        .await?;

    Ok(Json(CheckoutResponse {
        id: created.session_id,
        url: created.checkout_url,
        total_amount: created.total_amount,
    }))
}

/// Reconcile a checkout session the client reports as paid
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout-success",
    request_body = CheckoutSuccessRequest,
    responses(
        (status = 200, description = "Session reconciled (idempotent)", body = CheckoutSuccessResponse),
        (status = 401, description = "Missing user identity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown checkout session", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn checkout_success(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<CheckoutSuccessRequest>,
) -> Result<Json<CheckoutSuccessResponse>, ServiceError> {
    request.validate()?;

    let outcome = state
        .services
        .checkout
        .reconcile(&request.session_id)
        .await?;

    let response = match outcome {
        ReconcileOutcome::Completed { order_id } => CheckoutSuccessResponse {
            success: true,
            message: "payment recorded".to_string(),
            order_id: Some(order_id),
        },
        ReconcileOutcome::AlreadyRecorded { order_id } => CheckoutSuccessResponse {
            success: true,
            message: "order already recorded".to_string(),
            order_id: Some(order_id),
        },
        ReconcileOutcome::NotYetPaid => CheckoutSuccessResponse {
            success: false,
            message: "payment not completed".to_string(),
            order_id: None,
        },
    };

    Ok(Json(response))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/checkout-success", post(checkout_success))
}
