//! In-memory fakes for the checkout service's collaborators.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use storefront_api::entities::{coupon, order};
use storefront_api::errors::ServiceError;
use storefront_api::events::EventSender;
use storefront_api::gateway::{
    CheckoutSession, CreateSessionRequest, GatewayError, PaymentGateway, PaymentStatus,
    SessionDetails,
};
use storefront_api::repositories::{
    CouponStore, InsertOutcome, NewCoupon, NewOrder, NewOrderItem, OrderStore,
};
use storefront_api::services::checkout::CheckoutService;
use storefront_api::services::coupons::CouponLedger;
use storefront_api::services::rewards::RewardIssuer;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Gateway fake: records every request, hands out deterministic session ids,
/// and serves staged session state back to `retrieve_session`.
#[derive(Default)]
pub struct FakeGateway {
    pub created: Mutex<Vec<CreateSessionRequest>>,
    pub coupon_requests: AtomicU32,
    sessions: Mutex<HashMap<String, SessionDetails>>,
    counter: AtomicU32,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_requests(&self) -> Vec<CreateSessionRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn coupon_request_count(&self) -> u32 {
        self.coupon_requests.load(Ordering::SeqCst)
    }

    /// Flips a session to paid, as if the buyer completed the hosted flow.
    pub fn mark_paid(&self, session_id: &str) {
        self.set_status(session_id, PaymentStatus::Paid);
    }

    pub fn set_status(&self, session_id: &str, status: PaymentStatus) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(details) = sessions.get_mut(session_id) {
            details.payment_status = status;
        }
    }

    pub fn stage_session(&self, details: SessionDetails) {
        self.sessions
            .lock()
            .unwrap()
            .insert(details.id.clone(), details);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("cs_test_{n}");

        let mut amount_total: i64 = request
            .line_items
            .iter()
            .map(|item| item.unit_amount_minor * i64::from(item.quantity))
            .sum();
        if let Some(coupon_id) = &request.discount_coupon_id {
            if let Some(percent) = coupon_id
                .strip_prefix("disc_")
                .and_then(|p| p.parse::<i64>().ok())
            {
                amount_total -= amount_total * percent / 100;
            }
        }

        self.stage_session(SessionDetails {
            id: id.clone(),
            payment_status: PaymentStatus::Unpaid,
            amount_total,
            metadata: request.metadata.clone(),
        });
        self.created.lock().unwrap().push(request);

        Ok(CheckoutSession {
            url: Some(format!("https://pay.example/{id}")),
            id,
        })
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionDetails>, GatewayError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn create_percent_off_coupon(&self, percent_off: i32) -> Result<String, GatewayError> {
        self.coupon_requests.fetch_add(1, Ordering::SeqCst);
        Ok(format!("disc_{percent_off}"))
    }
}

#[derive(Default)]
pub struct InMemoryCouponStore {
    by_user: Mutex<HashMap<Uuid, coupon::Model>>,
    failing_deactivations: AtomicU32,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coupon_for(&self, user_id: Uuid) -> Option<coupon::Model> {
        self.by_user.lock().unwrap().get(&user_id).cloned()
    }

    /// Seeds a coupon directly, bypassing the ledger.
    pub fn seed(&self, model: coupon::Model) {
        self.by_user.lock().unwrap().insert(model.user_id, model);
    }

    /// Makes the next `n` deactivation calls fail, simulating a store outage.
    pub fn fail_next_deactivations(&self, n: u32) {
        self.failing_deactivations.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn find_active(
        &self,
        code: &str,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        Ok(self
            .by_user
            .lock()
            .unwrap()
            .get(&user_id)
            .filter(|c| c.code == code && c.is_active)
            .cloned())
    }

    async fn find_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        Ok(self
            .by_user
            .lock()
            .unwrap()
            .get(&user_id)
            .filter(|c| c.is_active)
            .cloned())
    }

    async fn replace_for_user(&self, new: NewCoupon) -> Result<coupon::Model, ServiceError> {
        let now = Utc::now();
        let model = coupon::Model {
            id: Uuid::new_v4(),
            code: new.code,
            user_id: new.user_id,
            discount_percentage: new.discount_percentage,
            is_active: true,
            expiration_date: new.expiration_date,
            created_at: now,
            updated_at: now,
        };
        self.by_user
            .lock()
            .unwrap()
            .insert(new.user_id, model.clone());
        Ok(model)
    }

    async fn deactivate(&self, code: &str, user_id: Uuid) -> Result<(), ServiceError> {
        let remaining = self.failing_deactivations.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_deactivations
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::InternalError(
                "coupon store unavailable".to_string(),
            ));
        }

        let mut by_user = self.by_user.lock().unwrap();
        if let Some(c) = by_user.get_mut(&user_id) {
            if c.code == code {
                c.is_active = false;
                c.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    by_session: Mutex<HashMap<String, order::Model>>,
    items: Mutex<HashMap<Uuid, Vec<NewOrderItem>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_count(&self) -> usize {
        self.by_session.lock().unwrap().len()
    }

    pub fn order_for_session(&self, session_id: &str) -> Option<order::Model> {
        self.by_session.lock().unwrap().get(session_id).cloned()
    }

    pub fn items_for(&self, order_id: Uuid) -> Vec<NewOrderItem> {
        self.items
            .lock()
            .unwrap()
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_if_absent(&self, new: NewOrder) -> Result<InsertOutcome, ServiceError> {
        let mut by_session = self.by_session.lock().unwrap();
        if let Some(existing) = by_session.get(&new.checkout_session_id) {
            return Ok(InsertOutcome::Exists(existing.id));
        }

        let order_id = Uuid::new_v4();
        by_session.insert(
            new.checkout_session_id.clone(),
            order::Model {
                id: order_id,
                user_id: new.user_id,
                total_amount: new.total_amount,
                currency: new.currency,
                checkout_session_id: new.checkout_session_id,
                created_at: Utc::now(),
            },
        );
        self.items.lock().unwrap().insert(order_id, new.items);
        Ok(InsertOutcome::Inserted(order_id))
    }

    async fn find_by_session(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(self
            .by_session
            .lock()
            .unwrap()
            .get(checkout_session_id)
            .cloned())
    }
}

/// Fully wired checkout service over in-memory collaborators.
pub struct Harness {
    pub checkout: CheckoutService,
    pub ledger: Arc<CouponLedger>,
    pub gateway: Arc<FakeGateway>,
    pub coupon_store: Arc<InMemoryCouponStore>,
    pub order_store: Arc<InMemoryOrderStore>,
    // Keeps the event channel open for the duration of the test.
    _event_rx: mpsc::Receiver<storefront_api::events::Event>,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = Arc::new(FakeGateway::new());
        let coupon_store = Arc::new(InMemoryCouponStore::new());
        let order_store = Arc::new(InMemoryOrderStore::new());

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);

        let ledger = Arc::new(CouponLedger::new(
            coupon_store.clone(),
            event_sender.clone(),
        ));
        let rewards = RewardIssuer::new(ledger.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            gateway.clone(),
            order_store.clone(),
            ledger.clone(),
            rewards,
            event_sender,
            "usd".to_string(),
            "http://localhost:5173".to_string(),
        );

        Self {
            checkout,
            ledger,
            gateway,
            coupon_store,
            order_store,
            _event_rx: event_rx,
        }
    }

    /// Seeds an active 10% coupon for the user and returns its code.
    pub fn seed_coupon(&self, user_id: Uuid, percent: i32) -> String {
        let code = format!("GIFTSEED{percent:02}");
        let now = Utc::now();
        self.coupon_store.seed(coupon::Model {
            id: Uuid::new_v4(),
            code: code.clone(),
            user_id,
            discount_percentage: percent,
            is_active: true,
            expiration_date: now + chrono::Duration::days(30),
            created_at: now,
            updated_at: now,
        });
        code
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Cart line helper for tests; price is in major units.
pub fn cart_item(price: Decimal, quantity: Option<u32>) -> storefront_api::services::pricing::CartLineItem {
    storefront_api::services::pricing::CartLineItem {
        id: Uuid::new_v4(),
        name: "Test Product".to_string(),
        image: "https://cdn.example.com/p.png".to_string(),
        price,
        quantity,
    }
}
