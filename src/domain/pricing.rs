//! Price arithmetic in minor currency units.

/// Discounted unit price: `price * (100 - discount) / 100`, floored.
/// Discounts outside 0..=100 are clamped.
pub fn sale_price(price: i64, discount_percent: i32) -> i64 {
    let d = i64::from(discount_percent.clamp(0, 100));
    price * (100 - d) / 100
}

/// Order total over `(unit_price, discount_percent, quantity)` lines,
/// evaluated at order-creation time.
pub fn order_total<I>(lines: I) -> i64
where
    I: IntoIterator<Item = (i64, i32, u32)>,
{
    lines
        .into_iter()
        .map(|(price, discount, qty)| sale_price(price, discount) * i64::from(qty))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_price_applies_discount() {
        assert_eq!(sale_price(100_000, 0), 100_000);
        assert_eq!(sale_price(100_000, 25), 75_000);
        assert_eq!(sale_price(100_000, 100), 0);
    }

    #[test]
    fn sale_price_floors() {
        // 999 * 90 / 100 = 899.1 -> 899
        assert_eq!(sale_price(999, 10), 899);
    }

    #[test]
    fn sale_price_clamps_bogus_discounts() {
        assert_eq!(sale_price(1000, -5), 1000);
        assert_eq!(sale_price(1000, 150), 0);
    }

    #[test]
    fn total_covers_exactly_the_given_lines() {
        // Selected subset only; anything not passed in cannot contribute.
        let total = order_total([(100_000, 10, 2), (50_000, 0, 1)]);
        assert_eq!(total, 90_000 * 2 + 50_000);
    }

    #[test]
    fn total_of_no_lines_is_zero() {
        assert_eq!(order_total([]), 0);
    }
}
