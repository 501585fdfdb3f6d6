//! Stripe-backed [`PaymentGateway`] implementation.
//!
//! Talks to the Checkout Sessions and Coupons APIs with form-encoded
//! requests. Transient failures (transport errors, 5xx) are retried with
//! bounded backoff; 4xx responses surface the provider's message.

use super::{
    with_retry, CheckoutSession, CreateSessionRequest, GatewayError, PaymentGateway,
    PaymentStatus, SessionDetails, SessionMetadata,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const METADATA_USER_ID: &str = "userId";
const METADATA_COUPON_CODE: &str = "couponCode";
const METADATA_PRODUCTS: &str = "products";

#[derive(Debug, Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| format!("HTTP {}", status));

        if status.is_server_error() {
            Err(GatewayError::Unavailable(message))
        } else {
            Err(GatewayError::Rejected(message))
        }
    }

    fn session_params(request: &CreateSessionRequest) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            params.push((
                format!("line_items[{i}][price_data][currency]"),
                item.currency.clone(),
            ));
            params.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            if !item.image.is_empty() {
                params.push((
                    format!("line_items[{i}][price_data][product_data][images][0]"),
                    item.image.clone(),
                ));
            }
            params.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                item.unit_amount_minor.to_string(),
            ));
            params.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }

        if let Some(coupon_id) = &request.discount_coupon_id {
            params.push(("discounts[0][coupon]".to_string(), coupon_id.clone()));
        }

        params.push((
            format!("metadata[{METADATA_USER_ID}]"),
            request.metadata.user_id.to_string(),
        ));
        params.push((
            format!("metadata[{METADATA_COUPON_CODE}]"),
            request.metadata.coupon_code.clone().unwrap_or_default(),
        ));
        params.push((
            format!("metadata[{METADATA_PRODUCTS}]"),
            request.metadata.products.clone(),
        ));

        params
    }

    fn parse_metadata(metadata: &HashMap<String, String>) -> Result<SessionMetadata, GatewayError> {
        let user_id = metadata
            .get(METADATA_USER_ID)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| {
                GatewayError::InvalidResponse("session metadata is missing a valid userId".into())
            })?;

        let coupon_code = metadata
            .get(METADATA_COUPON_CODE)
            .filter(|c| !c.is_empty())
            .cloned();

        let products = metadata.get(METADATA_PRODUCTS).cloned().unwrap_or_default();

        Ok(SessionMetadata {
            user_id,
            coupon_code,
            products,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeCoupon {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let params = Self::session_params(&request);
        let value = with_retry("create_checkout_session", || {
            self.post_form("/v1/checkout/sessions", &params)
        })
        .await?;

        let session: StripeSession = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionDetails>, GatewayError> {
        let path = format!("/v1/checkout/sessions/{session_id}");
        let result = with_retry("retrieve_session", || async {
            let response = self
                .http
                .get(self.url(&path))
                .bearer_auth(&self.secret_key)
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            Self::parse_response(response).await.map(Some)
        })
        .await?;

        let Some(value) = result else {
            return Ok(None);
        };

        let session: StripeSession = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(Some(SessionDetails {
            id: session.id,
            payment_status: PaymentStatus::parse(session.payment_status.as_deref().unwrap_or("")),
            amount_total: session.amount_total.unwrap_or(0),
            metadata: Self::parse_metadata(&session.metadata)?,
        }))
    }

    #[instrument(skip(self))]
    async fn create_percent_off_coupon(&self, percent_off: i32) -> Result<String, GatewayError> {
        let params = vec![
            ("percent_off".to_string(), percent_off.to_string()),
            ("duration".to_string(), "once".to_string()),
        ];
        let value = with_retry("create_percent_off_coupon", || {
            self.post_form("/v1/coupons", &params)
        })
        .await?;

        let coupon: StripeCoupon = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(coupon.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayLineItem;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_request() -> CreateSessionRequest {
        CreateSessionRequest {
            line_items: vec![GatewayLineItem {
                currency: "usd".into(),
                name: "Desk Lamp".into(),
                image: "https://img.example/lamp.png".into(),
                unit_amount_minor: 5000,
                quantity: 2,
            }],
            success_url: "http://localhost:5173/purchase-success?session_id={CHECKOUT_SESSION_ID}"
                .into(),
            cancel_url: "http://localhost:5173/purchase-cancel".into(),
            discount_coupon_id: None,
            metadata: SessionMetadata {
                user_id: Uuid::new_v4(),
                coupon_code: None,
                products: r#"[{"id":"x","quantity":2,"price":"50"}]"#.into(),
            },
        }
    }

    #[tokio::test]
    async fn creates_session_with_priced_line_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("mode=payment"))
            .and(body_string_contains("unit_amount%5D=5000"))
            .and(body_string_contains("quantity%5D=2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_abc",
                "url": "https://checkout.example/pay/cs_test_abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = StripeGateway::new("sk_test", server.uri()).unwrap();
        let session = gateway
            .create_checkout_session(sample_request())
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_abc");
        assert!(session.url.is_some());
    }

    #[tokio::test]
    async fn unknown_session_maps_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"message": "No such checkout.session: cs_missing"}
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new("sk_test", server.uri()).unwrap();
        let session = gateway.retrieve_session("cs_missing").await.unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn retrieve_parses_payment_state_and_metadata() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_paid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_paid",
                "payment_status": "paid",
                "amount_total": 10000,
                "metadata": {
                    "userId": user_id.to_string(),
                    "couponCode": "",
                    "products": "[]"
                }
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new("sk_test", server.uri()).unwrap();
        let session = gateway.retrieve_session("cs_paid").await.unwrap().unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Paid);
        assert_eq!(session.amount_total, 10000);
        assert_eq!(session.metadata.user_id, user_id);
        // Empty coupon code in metadata means no coupon was used.
        assert!(session.metadata.coupon_code.is_none());
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/coupons"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "temporarily unavailable"}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/coupons"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "disc_123"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = StripeGateway::new("sk_test", server.uri()).unwrap();
        let coupon_id = gateway.create_percent_off_coupon(10).await.unwrap();
        assert_eq!(coupon_id, "disc_123");
    }

    #[tokio::test]
    async fn client_errors_surface_provider_message_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Invalid currency: zzz"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = StripeGateway::new("sk_test", server.uri()).unwrap();
        let err = gateway
            .create_checkout_session(sample_request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(ref m) if m.contains("Invalid currency")));
    }
}
