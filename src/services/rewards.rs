//! Reward coupons granted for large checkouts.

use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::NewCoupon;
use crate::services::coupons::CouponLedger;
use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Checkouts totalling at least this much (in minor units) earn a coupon.
pub const REWARD_THRESHOLD_MINOR: i64 = 20_000;

const REWARD_DISCOUNT_PERCENT: i32 = 10;
const REWARD_VALIDITY_DAYS: i64 = 30;
const CODE_PREFIX: &str = "GIFT";
const CODE_SUFFIX_LEN: usize = 6;
const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub struct RewardIssuer {
    ledger: Arc<CouponLedger>,
    event_sender: EventSender,
}

impl RewardIssuer {
    pub fn new(ledger: Arc<CouponLedger>, event_sender: EventSender) -> Self {
        Self {
            ledger,
            event_sender,
        }
    }

    pub fn qualifies(total_minor: i64) -> bool {
        total_minor >= REWARD_THRESHOLD_MINOR
    }

    /// Issues a fresh 10% coupon to the user, replacing any coupon they
    /// already hold.
    #[instrument(skip(self))]
    pub async fn issue_for(&self, user_id: Uuid) -> Result<coupon::Model, ServiceError> {
        let code = generate_reward_code(&mut rand::thread_rng());
        let coupon = self
            .ledger
            .replace_for_user(NewCoupon {
                code: code.clone(),
                user_id,
                discount_percentage: REWARD_DISCOUNT_PERCENT,
                expiration_date: Utc::now() + Duration::days(REWARD_VALIDITY_DAYS),
            })
            .await?;

        info!(%user_id, code, "issued reward coupon");
        self.event_sender
            .send(Event::RewardCouponIssued { user_id, code })
            .await;
        Ok(coupon)
    }
}

fn generate_reward_code(rng: &mut impl Rng) -> String {
    let mut code = String::with_capacity(CODE_PREFIX.len() + CODE_SUFFIX_LEN);
    code.push_str(CODE_PREFIX);
    for _ in 0..CODE_SUFFIX_LEN {
        let idx = rng.gen_range(0..CODE_ALPHABET.len());
        code.push(CODE_ALPHABET[idx] as char);
    }
    code
}
