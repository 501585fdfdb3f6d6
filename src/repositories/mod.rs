pub mod coupon_store;
pub mod order_store;

pub use coupon_store::{CouponStore, NewCoupon, SeaOrmCouponStore};
pub use order_store::{InsertOutcome, NewOrder, NewOrderItem, OrderStore, SeaOrmOrderStore};
