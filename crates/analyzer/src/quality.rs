use configuration::QualityThresholds;
use core_types::QualityTier;
use rust_decimal::Decimal;

/// Maps a final percentage to its tier. Values on either boundary are Average.
pub fn classify(final_pct: Decimal, thresholds: &QualityThresholds) -> QualityTier {
    if final_pct > thresholds.excellent_above {
        QualityTier::Excellent
    } else if final_pct < thresholds.poor_below {
        QualityTier::Poor
    } else {
        QualityTier::Average
    }
}
