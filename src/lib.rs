//! # waveplan - decision layer for two-wave research pipelines
//!
//! A research query is answered by a first wave of parallel workers and,
//! when the evidence calls for it, a second wave of specialists. waveplan
//! makes the decisions around those waves; it does not run the workers.
//!
//! ## Overview
//!
//! 1. **Classify** the query by keyword dictionaries and any number of
//!    semantic analyzers, reconciled by vote ([`consensus`]).
//! 2. **Plan** 4-8 research perspectives and check each one against the
//!    keyword classifier ([`perspectives`]).
//! 3. **Analyse** wave-1 worker output: quality scores, emergent domain
//!    signals, self-reported gaps, platform coverage and source balance
//!    ([`pivot`], [`sources`]).
//! 4. **Decide** whether wave 2 runs and which specialists it needs.
//! 5. **Gate** every stage transition on marker files ([`phases`]).
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use waveplan::{KeywordClassifier, ConsensusResolver};
//!
//! #[tokio::main]
//! async fn main() -> waveplan::Result<()> {
//!     let resolver = ConsensusResolver::keyword_only(KeywordClassifier::new());
//!     let outcome = resolver
//!         .resolve("Research OSINT tools for threat intelligence")
//!         .await?;
//!     println!("{} via {}", outcome.result.primary_domain, outcome.method);
//!     Ok(())
//! }
//! ```
//!
//! ### Configuration-Driven Setup
//!
//! ```rust,ignore
//! use waveplan::{ConfigManager, ResearchCoordinator, Session};
//!
//! let manager = ConfigManager::new("waveplan.toml")?;
//! let coordinator = ResearchCoordinator::from_config(&manager.config(), false)?;
//! let analysis = coordinator.analyze_wave(&Session::new("runs/osint"), 1)?;
//! ```
//!
//! ## Modules
//!
//! - [`classify`] - Deterministic keyword classification and worker allocation
//! - [`llm`] - Semantic analyzer clients, retry, throttle
//! - [`consensus`] - Multi-source voting
//! - [`perspectives`] - Perspective generation and validation
//! - [`sources`] - Source tiers and the quality gate
//! - [`pivot`] - Wave scoring and the pivot decision
//! - [`cache`] - On-disk classification cache
//! - [`phases`] - Stage markers and gating
//! - [`research`] - Session layout and the coordinator
//! - [`types`] - Common types and error handling

#![warn(rustdoc::missing_crate_level_docs)]

/// On-disk classification cache.
pub mod cache;
/// Deterministic keyword classification.
pub mod classify;
/// Command-line surface.
pub mod cli;
/// Multi-source classification consensus.
pub mod consensus;
/// Semantic analyzer clients and call management.
pub mod llm;
/// Stage ordering and marker files.
pub mod phases;
/// Research perspective planning.
pub mod perspectives;
/// Wave analysis and the pivot decision.
pub mod pivot;
/// Session layout and coordination.
pub mod research;
/// Source tiers and quality gate.
pub mod sources;
/// Core types and errors.
pub mod types;
/// Configuration and filesystem helpers.
pub mod utils;

// Re-export commonly used types
pub use cache::{CacheConfig, ResultCache};
pub use classify::KeywordClassifier;
pub use consensus::{ConsensusOutcome, ConsensusResolver};
pub use llm::{ManagedAnalyzer, RetryPolicy, SemanticAnalyzer};
pub use perspectives::{PerspectiveEngine, PerspectivePlan};
pub use phases::{PhaseGate, PhaseStatus, Stage};
pub use pivot::{PivotDecision, PivotDecisionEngine};
pub use research::{ResearchCoordinator, Session};
pub use sources::{QualityGate, QualityGateResult, SourceTierClassifier};
pub use types::{AppError, ClassificationResult, Domain, Result};
pub use utils::{ConfigManager, WaveplanConfig};
