//! Coupon ledger. All coupon mutations for a given user go through a
//! per-user async mutex so concurrent issue/redeem calls serialize instead
//! of interleaving their read-modify-write cycles.

use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{CouponStore, NewCoupon};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct CouponLedger {
    store: Arc<dyn CouponStore>,
    event_sender: EventSender,
    user_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl CouponLedger {
    pub fn new(store: Arc<dyn CouponStore>, event_sender: EventSender) -> Self {
        Self {
            store,
            event_sender,
            user_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.user_locks.entry(user_id).or_default().clone()
    }

    /// Active coupon by code, scoped to its owner.
    pub async fn find_active(
        &self,
        code: &str,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        self.store.find_active(code, user_id).await
    }

    /// The user's current active coupon, if any.
    pub async fn active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        self.store.find_active_for_user(user_id).await
    }

    /// Replaces whatever coupon the user holds with `new`. Users hold at most
    /// one coupon at a time.
    #[instrument(skip(self, new), fields(user_id = %new.user_id))]
    pub async fn replace_for_user(&self, new: NewCoupon) -> Result<coupon::Model, ServiceError> {
        let lock = self.lock_for(new.user_id);
        let _guard = lock.lock().await;
        self.store.replace_for_user(new).await
    }

    /// Marks the user's coupon as used. Redeeming a coupon that is already
    /// inactive is a no-op.
    #[instrument(skip(self))]
    pub async fn redeem(&self, code: &str, user_id: Uuid) -> Result<(), ServiceError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        self.store.deactivate(code, user_id).await?;
        self.event_sender
            .send(Event::CouponRedeemed {
                user_id,
                code: code.to_string(),
            })
            .await;
        Ok(())
    }

    /// Resolves a coupon for use at checkout. Expired coupons are deactivated
    /// on sight and reported as not found.
    pub async fn validate(&self, code: &str, user_id: Uuid) -> Result<coupon::Model, ServiceError> {
        let coupon = self
            .find_active(code, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("coupon '{code}' not found")))?;

        if coupon.is_expired(Utc::now()) {
            info!(code, %user_id, "deactivating expired coupon");
            self.redeem(code, user_id).await?;
            return Err(ServiceError::NotFound(format!("coupon '{code}' has expired")));
        }

        Ok(coupon)
    }
}
