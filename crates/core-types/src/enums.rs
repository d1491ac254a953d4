use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The multi-day cycle state an asset is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Entry,
    Exit,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Entry => "entry",
            Phase::Exit => "exit",
        }
    }

    /// The key node that opens a cycle of this phase.
    pub fn day1_node(&self) -> KeyNodeType {
        match self {
            Phase::Entry => KeyNodeType::EnterDay1,
            Phase::Exit => KeyNodeType::ExitDay1,
        }
    }

    /// The break-index crossing that closes a sub-cycle of this phase.
    pub fn crossing_node(&self) -> KeyNodeType {
        match self {
            Phase::Entry => KeyNodeType::BreakDown200,
            Phase::Exit => KeyNodeType::BreakUp0,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Entry => write!(f, "Entry"),
            Phase::Exit => write!(f, "Exit"),
        }
    }
}

impl FromStr for Phase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entry" => Ok(Phase::Entry),
            "exit" => Ok(Phase::Exit),
            _ => Err(CoreError::UnknownTag { kind: "phase", value: s.to_string() }),
        }
    }
}

/// The four days that require a full analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyNodeType {
    EnterDay1,
    ExitDay1,
    BreakDown200,
    BreakUp0,
}

impl KeyNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyNodeType::EnterDay1 => "enter_day1",
            KeyNodeType::ExitDay1 => "exit_day1",
            KeyNodeType::BreakDown200 => "break_down_200",
            KeyNodeType::BreakUp0 => "break_up_0",
        }
    }

    /// True for the two node types that are break-index threshold crossings.
    pub fn is_crossing(&self) -> bool {
        matches!(self, KeyNodeType::BreakDown200 | KeyNodeType::BreakUp0)
    }

    /// The phase whose cycle this node type belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            KeyNodeType::EnterDay1 | KeyNodeType::BreakDown200 => Phase::Entry,
            KeyNodeType::ExitDay1 | KeyNodeType::BreakUp0 => Phase::Exit,
        }
    }
}

impl fmt::Display for KeyNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KeyNodeType::EnterDay1 => "Entry day 1",
            KeyNodeType::ExitDay1 => "Exit day 1",
            KeyNodeType::BreakDown200 => "Break below 200",
            KeyNodeType::BreakUp0 => "Break back above 0",
        };
        f.write_str(label)
    }
}

impl FromStr for KeyNodeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enter_day1" => Ok(KeyNodeType::EnterDay1),
            "exit_day1" => Ok(KeyNodeType::ExitDay1),
            "break_down_200" => Ok(KeyNodeType::BreakDown200),
            "break_up_0" => Ok(KeyNodeType::BreakUp0),
            _ => Err(CoreError::UnknownTag { kind: "key node", value: s.to_string() }),
        }
    }
}

/// Direction in which a series passes through a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossDirection {
    /// Previous value at or above the threshold, current value below it.
    Down,
    /// Previous value below the threshold, current value at or above it.
    Up,
}

impl CrossDirection {
    /// Checks whether the step `previous -> current` crosses `threshold` in this direction.
    /// Both checks are half-open so that a value sitting exactly on the threshold
    /// counts as "at or above".
    pub fn crosses(&self, previous: i64, current: i64, threshold: i64) -> bool {
        match self {
            CrossDirection::Down => previous >= threshold && current < threshold,
            CrossDirection::Up => previous < threshold && current >= threshold,
        }
    }
}

/// Secondary events recorded without a quality rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpecialNodeType {
    Approaching,
    OffchainAbove1000,
    OffchainBelow1000,
    BreakAbove200,
    QualityWarningEntry,
    QualityWarningExit,
}

impl SpecialNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialNodeType::Approaching => "approaching",
            SpecialNodeType::OffchainAbove1000 => "offchain_above_1000",
            SpecialNodeType::OffchainBelow1000 => "offchain_below_1000",
            SpecialNodeType::BreakAbove200 => "break_above_200",
            SpecialNodeType::QualityWarningEntry => "quality_warning_entry",
            SpecialNodeType::QualityWarningExit => "quality_warning_exit",
        }
    }

    /// The quality-warning type raised for a cycle of the given phase.
    pub fn quality_warning(phase: Phase) -> Self {
        match phase {
            Phase::Entry => SpecialNodeType::QualityWarningEntry,
            Phase::Exit => SpecialNodeType::QualityWarningExit,
        }
    }
}

impl fmt::Display for SpecialNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialNodeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approaching" => Ok(SpecialNodeType::Approaching),
            "offchain_above_1000" => Ok(SpecialNodeType::OffchainAbove1000),
            "offchain_below_1000" => Ok(SpecialNodeType::OffchainBelow1000),
            "break_above_200" => Ok(SpecialNodeType::BreakAbove200),
            "quality_warning_entry" => Ok(SpecialNodeType::QualityWarningEntry),
            "quality_warning_exit" => Ok(SpecialNodeType::QualityWarningExit),
            _ => Err(CoreError::UnknownTag { kind: "special node", value: s.to_string() }),
        }
    }
}

/// The quality tier a final percentage is mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    Excellent,
    Average,
    Poor,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Average => "average",
            QualityTier::Poor => "poor",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityTier::Excellent => write!(f, "Excellent"),
            QualityTier::Average => write!(f, "Average"),
            QualityTier::Poor => write!(f, "Poor"),
        }
    }
}

impl FromStr for QualityTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "excellent" => Ok(QualityTier::Excellent),
            "average" => Ok(QualityTier::Average),
            "poor" => Ok(QualityTier::Poor),
            _ => Err(CoreError::UnknownTag { kind: "quality tier", value: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_checks_are_half_open() {
        assert!(CrossDirection::Down.crosses(200, 199, 200));
        assert!(!CrossDirection::Down.crosses(199, 150, 200));
        assert!(!CrossDirection::Down.crosses(250, 200, 200));

        assert!(CrossDirection::Up.crosses(-1, 0, 0));
        assert!(!CrossDirection::Up.crosses(0, 10, 0));
        assert!(!CrossDirection::Up.crosses(-20, -1, 0));
    }

    #[test]
    fn node_types_map_to_their_cycle_phase() {
        assert_eq!(KeyNodeType::BreakDown200.phase(), Phase::Entry);
        assert_eq!(KeyNodeType::BreakUp0.phase(), Phase::Exit);
        assert_eq!(Phase::Exit.day1_node(), KeyNodeType::ExitDay1);
        assert_eq!(Phase::Entry.crossing_node(), KeyNodeType::BreakDown200);
        assert!(!KeyNodeType::EnterDay1.is_crossing());
    }

    #[test]
    fn persisted_tags_parse_back() {
        for node in [
            SpecialNodeType::Approaching,
            SpecialNodeType::OffchainAbove1000,
            SpecialNodeType::OffchainBelow1000,
            SpecialNodeType::BreakAbove200,
            SpecialNodeType::QualityWarningEntry,
            SpecialNodeType::QualityWarningExit,
        ] {
            assert_eq!(node.as_str().parse::<SpecialNodeType>(), Ok(node));
        }
        assert_eq!("EXIT".parse::<Phase>(), Ok(Phase::Exit));
        assert!("sideways".parse::<Phase>().is_err());
        assert!("break_200".parse::<KeyNodeType>().is_err());
    }
}
