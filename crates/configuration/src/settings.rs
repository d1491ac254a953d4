use core_types::Phase;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

/// Every weight, threshold and cadence the analysis engine uses.
///
/// This is handed to the analyzer at construction; nothing in the engine reads
/// global state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub thresholds: Thresholds,
    pub benchmarks: Benchmarks,
    pub phase_transition: PhaseTransition,
    pub corrections: Corrections,
    pub quality: QualityThresholds,
    pub warnings: WarningCadence,
}

/// Index levels that define key nodes and phase transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Break index level whose downward crossing closes an entry sub-cycle.
    pub break_upper: i64,
    /// Break index level whose upward crossing closes an exit sub-cycle.
    pub break_lower: i64,
    /// Off-chain index level whose crossing triggers the phase-transition correction.
    pub phase_boundary: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            break_upper: 200,
            break_lower: 0,
            phase_boundary: 1000,
        }
    }
}

/// The benchmark chain: equity benchmark, primary coin, then the leaders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Benchmarks {
    pub equity_benchmark: String,
    pub primary_coin: String,
    pub equity_weight: Decimal,
    pub primary_coin_weight: Decimal,
    /// Leaders without an entry here never contribute to the divergence correction.
    pub leaders: Vec<LeaderWeight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderWeight {
    pub asset: String,
    pub weight: Decimal,
}

impl Benchmarks {
    pub fn leader_weight(&self, asset: &str) -> Option<Decimal> {
        self.leaders
            .iter()
            .find(|leader| leader.asset == asset)
            .map(|leader| leader.weight)
    }
}

impl Default for Benchmarks {
    fn default() -> Self {
        let leader = |asset: &str, weight: Decimal| LeaderWeight {
            asset: asset.to_string(),
            weight,
        };
        Self {
            equity_benchmark: "NASDAQ".to_string(),
            primary_coin: "BTC".to_string(),
            equity_weight: dec!(-10),
            primary_coin_weight: dec!(-5),
            leaders: vec![
                leader("ETH", dec!(-2.5)),
                leader("BNB", dec!(-1.5)),
                leader("SOL", dec!(-1.0)),
                leader("DOGE", dec!(-0.5)),
            ],
        }
    }
}

/// Correction applied when a move crosses the phase boundary.
/// Entry and exit use opposite signs for the same direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTransition {
    pub entry_upward: Decimal,
    pub entry_downward: Decimal,
    pub exit_upward: Decimal,
    pub exit_downward: Decimal,
}

impl PhaseTransition {
    pub fn correction(&self, phase: Phase, upward: bool) -> Decimal {
        match (phase, upward) {
            (Phase::Entry, true) => self.entry_upward,
            (Phase::Entry, false) => self.entry_downward,
            (Phase::Exit, true) => self.exit_upward,
            (Phase::Exit, false) => self.exit_downward,
        }
    }
}

impl Default for PhaseTransition {
    fn default() -> Self {
        Self {
            entry_upward: dec!(5),
            entry_downward: dec!(-5),
            exit_upward: dec!(-5),
            exit_downward: dec!(5),
        }
    }
}

/// Fixed corrections keyed off the node and record flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Corrections {
    /// Entry day 1 with the break index already above the upper threshold.
    pub entry_day1_hot: Decimal,
    /// Exit day 1 with the break index already below the lower threshold.
    pub exit_day1_cold: Decimal,
    pub approaching: Decimal,
}

impl Default for Corrections {
    fn default() -> Self {
        Self {
            entry_day1_hot: dec!(-2.5),
            exit_day1_cold: dec!(-2.5),
            approaching: dec!(-5),
        }
    }
}

/// Tier boundaries. Both are exclusive, so values equal to a boundary are Average.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub excellent_above: Decimal,
    pub poor_below: Decimal,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent_above: dec!(5),
            poor_below: dec!(-5),
        }
    }
}

/// How many updates into a sub-cycle the quality warning is evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningCadence {
    pub standard_updates: usize,
    pub benchmark_equity_updates: usize,
}

impl WarningCadence {
    pub fn updates_for(&self, is_benchmark_equity: bool) -> usize {
        if is_benchmark_equity {
            self.benchmark_equity_updates
        } else {
            self.standard_updates
        }
    }
}

impl Default for WarningCadence {
    fn default() -> Self {
        Self {
            standard_updates: 7,
            benchmark_equity_updates: 14,
        }
    }
}

/// Connection settings for the PostgreSQL store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Falls back to the `DATABASE_URL` environment variable when unset.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            directory: None,
            file_prefix: "mag.log".to_string(),
        }
    }
}
