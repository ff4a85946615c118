//! Wave analysis and the pivot decision
//!
//! After a wave completes, its worker outputs are parsed
//! ([`worker_output`]), scored ([`quality`]), scanned for cross-domain themes
//! ([`signals`]) and self-reported gaps ([`gaps`]), and checked against the
//! platforms each perspective was told to visit ([`coverage`]). The
//! [`decision`] engine folds those findings, plus the source quality gate,
//! into a single launch/skip recommendation for wave 2.

pub mod coverage;
pub mod decision;
pub mod gaps;
pub mod quality;
pub mod signals;
pub mod worker_output;

pub use coverage::{PlatformCoverage, PlatformCoverageValidator};
pub use decision::{
    agent_worker_type, PivotConfig, PivotDecision, PivotDecisionEngine, PivotInputs, PivotMetrics,
    PivotTrack, SpecialistRecommendation,
};
pub use gaps::{AggregatedGap, GapAnalyzer};
pub use quality::{AgentQualityScore, QualityBand, QualityScorer, WaveQuality};
pub use signals::{DomainSignal, SignalDetector, Theme};
pub use worker_output::{load_wave, GapKind, GapStatement, WorkerOutput};
