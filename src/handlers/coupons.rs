use crate::auth::AuthenticatedUser;
use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponResponse {
    #[schema(example = "GIFT3F9K2A")]
    pub code: String,

    /// Percentage taken off the cart total
    #[schema(example = 10)]
    pub discount_percentage: i32,
    pub expiration_date: DateTime<Utc>,
}

impl From<coupon::Model> for CouponResponse {
    fn from(model: coupon::Model) -> Self {
        Self {
            code: model.code,
            discount_percentage: model.discount_percentage,
            expiration_date: model.expiration_date,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({"couponCode": "GIFT3F9K2A"}))]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "couponCode must not be empty"))]
    pub coupon_code: String,
}

/// Get the authenticated user's active coupon
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    responses(
        (status = 200, description = "The user's active coupon", body = CouponResponse),
        (status = 401, description = "Missing user identity", body = crate::errors::ErrorResponse),
        (status = 404, description = "The user holds no active coupon", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CouponResponse>, ServiceError> {
    let coupon = state
        .services
        .coupons
        .active_for_user(user.user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("no active coupon".to_string()))?;

    Ok(Json(coupon.into()))
}

/// Check that a coupon code is usable by the authenticated user
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon is valid", body = CouponResponse),
        (status = 401, description = "Missing user identity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon unknown, expired, or not the caller's", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<CouponResponse>, ServiceError> {
    request.validate()?;

    let coupon = state
        .services
        .coupons
        .validate(&request.coupon_code, user.user_id)
        .await?;

    Ok(Json(coupon.into()))
}

pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_coupon))
        .route("/validate", post(validate_coupon))
}
