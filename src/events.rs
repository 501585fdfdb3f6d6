use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionCreated {
        user_id: Uuid,
        session_id: String,
        total_minor: i64,
    },
    RewardCouponIssued {
        user_id: Uuid,
        code: String,
    },
    CouponRedeemed {
        user_id: Uuid,
        code: String,
    },
    OrderCreated(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Delivery is best-effort: a full or
    /// closed channel is logged, never propagated to the caller.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send event: {}", e);
        }
    }
}

/// Consumes events and logs them. Runs as a background task for the lifetime
/// of the process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::CheckoutSessionCreated {
                user_id,
                session_id,
                total_minor,
            } => {
                info!(%user_id, %session_id, total_minor, "checkout session created");
            }
            Event::RewardCouponIssued { user_id, code } => {
                info!(%user_id, code, "reward coupon issued");
            }
            Event::CouponRedeemed { user_id, code } => {
                info!(%user_id, code, "coupon redeemed");
            }
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
        }
    }
    info!("Event channel closed; event processor shutting down");
}
