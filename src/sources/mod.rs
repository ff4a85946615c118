//! Source trust tiers and the source-balance quality gate
//!
//! Hosts are sorted into four tiers from static lists, checked in a fixed
//! precedence order (tier 1, tier 4, tier 3, tier 2). Unknown hosts default to
//! tier 2. The gate then looks at the vendor and independent shares of a batch
//! and proposes rebalancing workers, at most once per session.

/// Quality gate over a source report.
pub mod gate;
/// Host classification and batch reports.
pub mod tiers;

pub use gate::{GateThresholds, QualityFlag, QualityGate, QualityGateResult, RebalanceSpec};
pub use tiers::{
    normalize_host, MatchConfidence, SourceQualityReport, SourceTier, SourceTierClassifier,
    TierClassification,
};
