//! Research session coordination
//!
//! A session is a directory holding two waves of worker outputs plus an
//! `analysis/` folder for plans, markers and reports. The coordinator ties
//! the pieces together:
//!
//! 1. **Classify** - cache lookup, then keyword and semantic consensus
//! 2. **Plan** - perspectives, validated against keyword classification
//! 3. **Analyse** - score wave 1, detect signals and gaps, gate sources
//! 4. **Pivot** - decide whether wave 2 runs and which specialists it needs
//!
//! # Usage
//!
//! ```ignore
//! use waveplan::research::{ResearchCoordinator, Session};
//!
//! let config = waveplan::utils::config::WaveplanConfig::load_or_default("waveplan.toml")?;
//! let coordinator = ResearchCoordinator::from_config(&config, false)?;
//! let session = Session::new("sessions/osint-tools");
//!
//! coordinator.plan("Research OSINT tools for threat intelligence", &session).await?;
//! // ... workers write wave-1/*.md ...
//! let analysis = coordinator.analyze_wave(&session, 1)?;
//! println!("wave 2: {}", analysis.decision.launch_wave2);
//! ```

/// Classification, planning and wave analysis over a session.
pub mod coordinator;
/// Session directory layout.
pub mod session;

pub use coordinator::{
    build_analyzer, ClassifyReport, QualityGateRecord, ResearchCoordinator, WaveAnalysis,
};
pub use session::Session;
