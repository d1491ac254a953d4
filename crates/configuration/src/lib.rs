use crate::error::ConfigError;
use rust_decimal::Decimal;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    AnalysisConfig, Benchmarks, Config, Corrections, DatabaseSettings, LeaderWeight, LogFormat,
    LoggingSettings, PhaseTransition, QualityThresholds, Thresholds, WarningCadence,
};

/// Prefix for environment overrides, e.g. `MAG__DATABASE__URL`.
const ENV_PREFIX: &str = "MAG";

/// Loads the application configuration from `path` plus the environment.
///
/// The file is optional: every section falls back to its defaults. Environment
/// variables prefixed with `MAG__` are layered on top.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

/// Parses a configuration from TOML text, without consulting the environment.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Rejects configurations the engine cannot work with and warns about odd ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let analysis = &self.analysis;

        if analysis.quality.excellent_above <= analysis.quality.poor_below {
            return Err(ConfigError::ValidationError(format!(
                "quality.excellent_above ({}) must be greater than quality.poor_below ({})",
                analysis.quality.excellent_above, analysis.quality.poor_below
            )));
        }

        // The trend check splits the window in two halves.
        for (name, updates) in [
            ("standard_updates", analysis.warnings.standard_updates),
            ("benchmark_equity_updates", analysis.warnings.benchmark_equity_updates),
        ] {
            if updates < 2 {
                return Err(ConfigError::ValidationError(format!(
                    "warnings.{name} must be at least 2, got {updates}"
                )));
            }
        }

        let benchmarks = &analysis.benchmarks;
        let weights = [
            (benchmarks.equity_benchmark.as_str(), benchmarks.equity_weight),
            (benchmarks.primary_coin.as_str(), benchmarks.primary_coin_weight),
        ]
        .into_iter()
        .chain(benchmarks.leaders.iter().map(|l| (l.asset.as_str(), l.weight)));

        for (asset, weight) in weights {
            if weight > Decimal::ZERO {
                tracing::warn!(
                    asset,
                    %weight,
                    "Divergence weight is positive; divergence will raise the final percentage."
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Phase;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_file_yields_documented_defaults() {
        let config = parse_config("").unwrap();
        let analysis = &config.analysis;

        assert_eq!(analysis.thresholds.break_upper, 200);
        assert_eq!(analysis.thresholds.phase_boundary, 1000);
        assert_eq!(analysis.benchmarks.equity_weight, dec!(-10));
        assert_eq!(analysis.benchmarks.leader_weight("BNB"), Some(dec!(-1.5)));
        assert_eq!(analysis.benchmarks.leader_weight("XRP"), None);
        assert_eq!(analysis.phase_transition.correction(Phase::Exit, true), dec!(-5));
        assert_eq!(analysis.corrections.approaching, dec!(-5));
        assert_eq!(analysis.warnings.updates_for(true), 14);
        assert_eq!(config.logging.format, LogFormat::Full);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = parse_config(
            r#"
            [analysis.benchmarks]
            primary_coin = "ETH"

            [[analysis.benchmarks.leaders]]
            asset = "SOL"
            weight = -3.5

            [analysis.warnings]
            standard_updates = 5

            [logging]
            format = "compact"
            "#,
        )
        .unwrap();

        let benchmarks = &config.analysis.benchmarks;
        assert_eq!(benchmarks.primary_coin, "ETH");
        assert_eq!(benchmarks.equity_benchmark, "NASDAQ");
        assert_eq!(benchmarks.leaders.len(), 1);
        assert_eq!(benchmarks.leader_weight("SOL"), Some(dec!(-3.5)));
        assert_eq!(config.analysis.warnings.standard_updates, 5);
        assert_eq!(config.analysis.warnings.benchmark_equity_updates, 14);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn rejects_inverted_quality_thresholds() {
        let result = parse_config(
            r#"
            [analysis.quality]
            excellent_above = -5
            poor_below = 5
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn rejects_a_warning_window_too_short_to_split() {
        let result = parse_config(
            r#"
            [analysis.warnings]
            benchmark_equity_updates = 1
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("benchmark_equity_updates")));
    }
}
