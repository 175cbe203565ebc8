//! Line pricing and refund arithmetic.
//!
//! All amounts are minor currency units; discounts are basis points
//! (1/100 of a percent). Rounding always favours the merchant: discounts and
//! refunds are floored.

use serde::{Deserialize, Serialize};

use branchpos_core::{DomainError, DomainResult};

pub const BPS_DENOMINATOR: u32 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub gross: u64,
    pub discount: u64,
    pub total: u64,
}

pub fn line_amounts(quantity: u64, unit_price: u64, discount_bps: u32) -> DomainResult<LineAmounts> {
    if discount_bps > BPS_DENOMINATOR {
        return Err(DomainError::validation("discount cannot exceed 100%"));
    }

    let gross = quantity
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::validation("line amount overflow"))?;
    let discount = (gross as u128 * discount_bps as u128 / BPS_DENOMINATOR as u128) as u64;

    Ok(LineAmounts {
        gross,
        discount,
        total: gross - discount,
    })
}

/// Discount off `list_price` actually granted by selling at `unit_price`
/// less `discount_bps`, rounded up. Prices above list count as no discount.
pub fn effective_discount_bps(list_price: u64, unit_price: u64, discount_bps: u32) -> u32 {
    if list_price == 0 {
        return 0;
    }
    let denominator = BPS_DENOMINATOR as u128;
    let list_net = list_price as u128 * denominator;
    let sold_net = unit_price as u128 * denominator.saturating_sub(discount_bps as u128);
    if sold_net >= list_net {
        return 0;
    }
    let list = list_price as u128;
    ((list_net - sold_net).div_ceil(list)).min(denominator) as u32
}

/// Share of `line_total` refunded when `quantity` of `sold_quantity` units come back.
pub fn prorated_refund(line_total: u64, quantity: u64, sold_quantity: u64) -> u64 {
    if sold_quantity == 0 {
        return 0;
    }
    (line_total as u128 * quantity.min(sold_quantity) as u128 / sold_quantity as u128) as u64
}

/// Refund for returning `quantity` more units of a line. The return that
/// brings the line back to zero pays out whatever flooring held back earlier.
pub fn line_refund(
    line_total: u64,
    quantity: u64,
    sold_quantity: u64,
    returned_before: u64,
    refunded_before: u64,
) -> u64 {
    if returned_before + quantity >= sold_quantity {
        return line_total.saturating_sub(refunded_before);
    }
    prorated_refund(line_total, quantity, sold_quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn discount_is_floored() {
        // 3 x 333 = 999, 15% = 149.85
        let amounts = line_amounts(3, 333, 1_500).unwrap();
        assert_eq!(amounts.gross, 999);
        assert_eq!(amounts.discount, 149);
        assert_eq!(amounts.total, 850);
    }

    #[test]
    fn rejects_discount_above_full_price() {
        assert!(line_amounts(1, 100, 10_001).is_err());
    }

    #[test]
    fn overflow_is_a_validation_error() {
        assert!(matches!(line_amounts(u64::MAX, 2, 0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn partial_refund_is_prorated() {
        assert_eq!(prorated_refund(850, 1, 3), 283);
        assert_eq!(prorated_refund(850, 3, 3), 850);
    }

    #[test]
    fn final_return_pays_the_remainder() {
        assert_eq!(line_refund(850, 1, 3, 0, 0), 283);
        assert_eq!(line_refund(850, 1, 3, 1, 283), 283);
        assert_eq!(line_refund(850, 1, 3, 2, 566), 284);
    }

    #[test]
    fn price_override_counts_as_discount() {
        assert_eq!(effective_discount_bps(100_000, 1, 0), 10_000);
        assert_eq!(effective_discount_bps(1_000, 900, 0), 1_000);
        // 900 less 10% = 810 against 1000
        assert_eq!(effective_discount_bps(1_000, 900, 1_000), 1_900);
        assert_eq!(effective_discount_bps(1_000, 1_200, 1_000), 0);
        assert_eq!(effective_discount_bps(3, 2, 0), 3_334);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: refunding every unit one at a time never pays out more
        /// than the line total.
        #[test]
        fn piecewise_refunds_never_exceed_line_total(
            qty in 1u64..50,
            price in 0u64..100_000,
            bps in 0u32..=10_000,
        ) {
            let amounts = line_amounts(qty, price, bps).unwrap();
            let refunded: u64 = (0..qty).map(|_| prorated_refund(amounts.total, 1, qty)).sum();
            prop_assert!(refunded <= amounts.total);
            prop_assert_eq!(amounts.gross, amounts.discount + amounts.total);
        }

        /// Property: returning a line in any split refunds exactly its total.
        #[test]
        fn split_returns_refund_the_whole_line(
            qty in 1u64..50,
            price in 0u64..100_000,
            bps in 0u32..=10_000,
            chunk in 1u64..7,
        ) {
            let total = line_amounts(qty, price, bps).unwrap().total;
            let (mut returned, mut refunded) = (0u64, 0u64);
            while returned < qty {
                let quantity = chunk.min(qty - returned);
                refunded += line_refund(total, quantity, qty, returned, refunded);
                returned += quantity;
            }
            prop_assert_eq!(refunded, total);
        }

        /// Property: without a price override the effective discount is the
        /// line discount.
        #[test]
        fn list_price_sale_keeps_line_discount(price in 1u64..1_000_000, bps in 0u32..=10_000) {
            prop_assert_eq!(effective_discount_bps(price, price, bps), bps);
        }
    }
}
