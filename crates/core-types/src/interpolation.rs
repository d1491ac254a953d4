use crate::structs::DailyRecord;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Computes the off-chain index at the moment the break index passed `threshold`.
///
/// Linear interpolation between the previous day's `(offchain, break)` pair and
/// today's pair, parameterised by where the threshold falls between the two
/// break values, rounded half-to-even to an integer.
///
/// Returns `prev_offchain` unchanged when both break values are equal.
pub fn interpolate_offchain(
    prev_offchain: i64,
    today_offchain: i64,
    prev_break: i64,
    today_break: i64,
    threshold: i64,
) -> i64 {
    if prev_break == today_break {
        return prev_offchain;
    }

    let (Some(rise), Some(offset), Some(run)) = (
        today_offchain.checked_sub(prev_offchain),
        threshold.checked_sub(prev_break),
        today_break.checked_sub(prev_break),
    ) else {
        return prev_offchain;
    };

    // Multiply before dividing so the only inexact step is the final division.
    Decimal::from(rise)
        .checked_mul(Decimal::from(offset))
        .and_then(|scaled| scaled.checked_div(Decimal::from(run)))
        .and_then(|delta| Decimal::from(prev_offchain).checked_add(delta))
        .and_then(|value| {
            value
                .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
                .to_i64()
        })
        .unwrap_or(prev_offchain)
}

/// Interpolates between two stored records.
pub fn interpolate_between(previous: &DailyRecord, today: &DailyRecord, threshold: i64) -> i64 {
    interpolate_offchain(
        previous.offchain_index,
        today.offchain_index,
        previous.break_index,
        today.break_index,
        threshold,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_at_the_threshold() {
        // 1020 + 70 * (-10 / -20) = 1055
        assert_eq!(interpolate_offchain(1020, 1090, 210, 190, 200), 1055);
    }

    #[test]
    fn stays_between_the_two_observations() {
        let value = interpolate_offchain(1050, 1020, 250, 180, 200);
        assert_eq!(value, 1029);
        assert!((1020..=1050).contains(&value));

        let upward = interpolate_offchain(800, 860, -30, 30, 0);
        assert_eq!(upward, 830);
    }

    #[test]
    fn rounds_half_to_even() {
        // 1120 - 30 * 0.75 = 1097.5
        assert_eq!(interpolate_offchain(1120, 1090, 230, 190, 200), 1098);
        // 1001 + 1 * 0.5 = 1001.5
        assert_eq!(interpolate_offchain(1001, 1002, 190, 210, 200), 1002);
        // 1000 + 1 * 0.5 = 1000.5
        assert_eq!(interpolate_offchain(1000, 1001, 190, 210, 200), 1000);
    }

    #[test]
    fn degenerate_inputs_return_the_previous_value() {
        assert_eq!(interpolate_offchain(940, 990, 200, 200, 200), 940);
    }

    #[test]
    fn overflowing_inputs_return_the_previous_value() {
        assert_eq!(interpolate_offchain(i64::MIN, i64::MAX, 210, 190, 200), i64::MIN);
        assert_eq!(interpolate_offchain(1020, 1090, i64::MAX, i64::MIN, 0), 1020);
        assert_eq!(interpolate_offchain(-5, i64::MAX, 0, 1, i64::MAX), -5);
    }
}
