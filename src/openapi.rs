use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Checkout API

Checkout sessions, payment reconciliation, and reward coupons for the storefront.

## Authentication

Identity is established upstream; requests carry the authenticated user's id
in the `x-user-id` header.

## Error Handling

Errors use a consistent response format with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "cart must contain at least one product",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Payments", description = "Checkout session and reconciliation endpoints"),
        (name = "Coupons", description = "Reward coupon endpoints")
    ),
    paths(
        // Payments
        crate::handlers::payments::create_checkout,
        crate::handlers::payments::checkout_success,

        // Coupons
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::validate_coupon,
    ),
    components(
        schemas(
            // Payments types
            crate::handlers::payments::CheckoutProduct,
            crate::handlers::payments::CheckoutRequest,
            crate::handlers::payments::CheckoutResponse,
            crate::handlers::payments::CheckoutSuccessRequest,
            crate::handlers::payments::CheckoutSuccessResponse,

            // Coupon types
            crate::handlers::coupons::CouponResponse,
            crate::handlers::coupons::ValidateCouponRequest,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
