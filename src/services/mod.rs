pub mod checkout;
pub mod coupons;
pub mod pricing;
pub mod rewards;
