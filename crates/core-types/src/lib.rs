pub mod enums;
pub mod error;
pub mod interpolation;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{CrossDirection, KeyNodeType, Phase, QualityTier, SpecialNodeType};
pub use error::CoreError;
pub use interpolation::{interpolate_between, interpolate_offchain};
pub use structs::{
    AnalysisResult, BenchmarkChainStatus, BenchmarkSnapshot, Crossing, DailyRecord,
    DivergenceEntry, PhaseAnchor, ReferenceNode, Section, SpecialNode,
};
