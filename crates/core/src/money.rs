use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a decimal amount of cents half-away-from-zero into whole cents.
pub fn round_cents(value: Decimal) -> i64 {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero).to_i64().unwrap_or(0)
}

/// Percentage of an amount, rounded to the nearest cent.
pub fn pct_of_cents(amount_cents: i64, pct: Decimal) -> i64 {
    round_cents(Decimal::from(amount_cents) * pct / Decimal::ONE_HUNDRED)
}

/// Converts a kit total into a per-unit price. Integer cents cannot always
/// split evenly, so up to `quantity - 1` cents of the original total are
/// lost; callers persist the result as-is.
pub fn per_unit_cents(total_cents: i64, quantity: u32) -> i64 {
    if quantity == 0 {
        return total_cents;
    }
    round_cents(Decimal::from(total_cents) / Decimal::from(quantity))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{pct_of_cents, per_unit_cents, round_cents};

    #[test]
    fn even_kit_total_splits_without_loss() {
        let unit = per_unit_cents(113_400, 6);
        assert_eq!(unit, 18_900);
        assert_eq!(unit * 6, 113_400);
    }

    #[test]
    fn uneven_kit_total_loses_cents_and_stays_lost() {
        let unit = per_unit_cents(100_000, 3);
        assert_eq!(unit, 33_333);
        assert_eq!(unit * 3, 99_999);
    }

    #[test]
    fn percentage_rounds_to_nearest_cent() {
        assert_eq!(pct_of_cents(10_000, Decimal::new(75, 1)), 750);
        assert_eq!(pct_of_cents(9_999, Decimal::new(333, 2)), 333);
    }

    #[test]
    fn half_cents_round_away_from_zero() {
        assert_eq!(round_cents(Decimal::new(25, 1)), 3);
        assert_eq!(round_cents(Decimal::new(-25, 1)), -3);
    }

    #[test]
    fn zero_quantity_passes_the_total_through() {
        assert_eq!(per_unit_cents(5_000, 0), 5_000);
    }
}
