//! Pure cart pricing: converts client-supplied line items into gateway
//! line-item descriptors denominated in minor currency units, and applies a
//! percentage coupon to the running total.

use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::gateway::GatewayLineItem;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

/// A cart line as submitted by the client. Prices are in major currency
/// units; quantity defaults to 1 when absent.
#[derive(Debug, Clone)]
pub struct CartLineItem {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub price: Decimal,
    pub quantity: Option<u32>,
}

impl CartLineItem {
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.unwrap_or(1).max(1)
    }
}

#[derive(Debug, Clone)]
pub struct PricedCart {
    pub line_items: Vec<GatewayLineItem>,
    /// Cart total in minor units, after any coupon discount.
    pub total_minor: i64,
}

fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Prices a cart. The coupon discount applies only when the coupon belongs
/// to `user_id` and is active; an inactive or foreign coupon is ignored, not
/// an error.
pub fn price_cart(
    items: &[CartLineItem],
    coupon: Option<&coupon::Model>,
    user_id: Uuid,
    currency: &str,
) -> Result<PricedCart, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::InvalidInput(
            "cart must contain at least one product".to_string(),
        ));
    }

    let mut line_items = Vec::with_capacity(items.len());
    let mut total_minor: i64 = 0;

    for item in items {
        if item.price.is_sign_negative() {
            return Err(ServiceError::InvalidInput(format!(
                "product '{}' has a negative price",
                item.name
            )));
        }
        let unit_amount_minor = to_minor_units(item.price).ok_or_else(|| {
            ServiceError::InvalidInput(format!("product '{}' price is out of range", item.name))
        })?;
        let quantity = item.effective_quantity();

        total_minor += unit_amount_minor * i64::from(quantity);
        line_items.push(GatewayLineItem {
            currency: currency.to_string(),
            name: item.name.clone(),
            image: item.image.clone(),
            unit_amount_minor,
            quantity,
        });
    }

    if let Some(coupon) = coupon {
        if coupon.user_id == user_id && coupon.is_active {
            let discount = (Decimal::from(total_minor)
                * Decimal::from(coupon.discount_percentage)
                / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or(0);
            total_minor -= discount;
        }
    }

    Ok(PricedCart {
        line_items,
        total_minor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn item(name: &str, price: Decimal, quantity: Option<u32>) -> CartLineItem {
        CartLineItem {
            id: Uuid::new_v4(),
            name: name.into(),
            image: format!("https://img.example/{name}.png"),
            price,
            quantity,
        }
    }

    fn coupon_for(user_id: Uuid, percent: i32, active: bool) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "GIFT123ABC".into(),
            user_id,
            discount_percentage: percent,
            is_active: active,
            expiration_date: Utc::now() + chrono::Duration::days(30),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn one_gateway_line_per_cart_line() {
        let user = Uuid::new_v4();
        let items = vec![
            item("a", dec!(10.00), Some(1)),
            item("b", dec!(19.99), Some(3)),
            item("c", dec!(0.50), None),
        ];
        let priced = price_cart(&items, None, user, "usd").unwrap();

        assert_eq!(priced.line_items.len(), 3);
        assert_eq!(priced.line_items[0].unit_amount_minor, 1000);
        assert_eq!(priced.line_items[1].unit_amount_minor, 1999);
        assert_eq!(priced.line_items[2].unit_amount_minor, 50);
        assert_eq!(priced.total_minor, 1000 + 3 * 1999 + 50);
    }

    #[rstest]
    #[case(dec!(50), 5000)]
    #[case(dec!(19.99), 1999)]
    #[case(dec!(10.555), 1056)]
    #[case(dec!(0.004), 0)]
    fn prices_round_to_minor_units(#[case] price: Decimal, #[case] expected: i64) {
        let priced = price_cart(&[item("x", price, Some(1))], None, Uuid::new_v4(), "usd").unwrap();
        assert_eq!(priced.line_items[0].unit_amount_minor, expected);
    }

    #[test]
    fn missing_and_zero_quantity_default_to_one() {
        let user = Uuid::new_v4();
        let priced = price_cart(
            &[item("a", dec!(10), None), item("b", dec!(10), Some(0))],
            None,
            user,
            "usd",
        )
        .unwrap();
        assert_eq!(priced.line_items[0].quantity, 1);
        assert_eq!(priced.line_items[1].quantity, 1);
        assert_eq!(priced.total_minor, 2000);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let err = price_cart(&[], None, Uuid::new_v4(), "usd").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn negative_price_is_rejected() {
        let err =
            price_cart(&[item("x", dec!(-1), None)], None, Uuid::new_v4(), "usd").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn own_active_coupon_discounts_the_total() {
        let user = Uuid::new_v4();
        let coupon = coupon_for(user, 10, true);
        let priced = price_cart(&[item("x", dec!(100), Some(2))], Some(&coupon), user, "usd")
            .unwrap();
        // 20000 - 10% = 18000
        assert_eq!(priced.total_minor, 18000);
        // Line items keep their undiscounted unit amounts.
        assert_eq!(priced.line_items[0].unit_amount_minor, 10000);
    }

    #[test]
    fn foreign_or_inactive_coupon_is_ignored() {
        let user = Uuid::new_v4();
        let foreign = coupon_for(Uuid::new_v4(), 10, true);
        let inactive = coupon_for(user, 10, false);

        let base = price_cart(&[item("x", dec!(100), None)], None, user, "usd").unwrap();
        let with_foreign =
            price_cart(&[item("x", dec!(100), None)], Some(&foreign), user, "usd").unwrap();
        let with_inactive =
            price_cart(&[item("x", dec!(100), None)], Some(&inactive), user, "usd").unwrap();

        assert_eq!(base.total_minor, with_foreign.total_minor);
        assert_eq!(base.total_minor, with_inactive.total_minor);
    }

    #[test]
    fn discount_rounds_half_away_from_zero() {
        let user = Uuid::new_v4();
        let coupon = coupon_for(user, 15, true);
        // 1050 * 15% = 157.5 -> 158
        let priced =
            price_cart(&[item("x", dec!(10.50), None)], Some(&coupon), user, "usd").unwrap();
        assert_eq!(priced.total_minor, 1050 - 158);
    }
}
