//! Integer proration arithmetic for VND amounts. Rounding is always toward
//! positive infinity so a distributed total is collected in full; the excess
//! over the exact total is strictly less than one unit per room.

/// Ceiling division toward +∞. `ceil_div(-3, 2)` is `-1`, matching
/// BigDecimal's CEILING rounding for negative netting totals.
pub fn ceil_div(amount: i64, divisor: i64) -> i64 {
    debug_assert!(divisor > 0);
    let quotient = amount.div_euclid(divisor);
    if amount.rem_euclid(divisor) != 0 {
        quotient + 1
    } else {
        quotient
    }
}

/// Split `total` across two categories proportionally to their raw weights.
/// The second share takes the remainder so the parts always sum to `total`.
pub fn split_proportional(total: i64, first_weight: i64, second_weight: i64) -> (i64, i64) {
    let weight_sum = first_weight + second_weight;
    if total <= 0 || weight_sum <= 0 {
        return (0, 0);
    }
    // i128 intermediate: weight * total can exceed i64 for large VND sums.
    let first = ((total as i128 * first_weight as i128) / weight_sum as i128) as i64;
    (first, total - first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(300_000, 4), 75_000);
        assert_eq!(ceil_div(100_000, 3), 33_334);
        assert_eq!(ceil_div(0, 5), 0);
        assert_eq!(ceil_div(1, 5), 1);
    }

    #[test]
    fn ceil_div_negative_rounds_toward_zero() {
        assert_eq!(ceil_div(-50_000, 4), -12_500);
        assert_eq!(ceil_div(-100_000, 3), -33_333);
    }

    #[test]
    fn prorated_sum_never_loses_money() {
        // Sum of per-room ceilings >= total, excess < room count.
        for (total, rooms) in [(300_000i64, 4i64), (100_000, 3), (999_999, 7), (1, 9)] {
            let per_room = ceil_div(total, rooms);
            let collected = per_room * rooms;
            assert!(collected >= total, "{total}/{rooms} lost money");
            assert!(
                collected - total < rooms,
                "{total}/{rooms} overcollects by a full unit per room"
            );
        }
    }

    #[test]
    fn proportional_split_preserves_total() {
        let (electricity, water) = split_proportional(250_000, 300_000, 200_000);
        assert_eq!(electricity + water, 250_000);
        assert_eq!(electricity, 150_000);
        assert_eq!(water, 100_000);

        let (a, b) = split_proportional(0, 10, 20);
        assert_eq!((a, b), (0, 0));
        let (a, b) = split_proportional(100, 0, 0);
        assert_eq!((a, b), (0, 0));

        // One-sided weights give the whole total to that side.
        let (a, b) = split_proportional(100, 50, 0);
        assert_eq!((a, b), (100, 0));
    }
}
