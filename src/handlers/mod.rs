pub mod coupons;
pub mod payments;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::repositories::{CouponStore, OrderStore, SeaOrmCouponStore, SeaOrmOrderStore};
use crate::services::checkout::CheckoutService;
use crate::services::coupons::CouponLedger;
use crate::services::rewards::RewardIssuer;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub coupons: Arc<CouponLedger>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        let coupon_store: Arc<dyn CouponStore> = Arc::new(SeaOrmCouponStore::new(db.clone()));
        let order_store: Arc<dyn OrderStore> = Arc::new(SeaOrmOrderStore::new(db));
        Self::with_stores(coupon_store, order_store, gateway, event_sender, config)
    }

    /// Wires the service graph from explicit collaborators. Tests use this to
    /// inject in-memory stores and a fake gateway.
    pub fn with_stores(
        coupon_store: Arc<dyn CouponStore>,
        order_store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        let coupons = Arc::new(CouponLedger::new(coupon_store, event_sender.clone()));
        let rewards = RewardIssuer::new(coupons.clone(), event_sender.clone());
        let checkout = Arc::new(CheckoutService::new(
            gateway,
            order_store,
            coupons.clone(),
            rewards,
            event_sender,
            config.currency.clone(),
            config.client_url.clone(),
        ));

        Self { checkout, coupons }
    }
}
