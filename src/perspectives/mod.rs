//! Research perspective planning
//!
//! A query is split into 4-8 perspectives by one semantic call. Every
//! perspective is then checked against the keyword classifier on its own text;
//! only the ones that disagree or come back with low confidence are sent
//! through consensus, and only once.
//!
//! # Usage
//!
//! ```ignore
//! let engine = PerspectiveEngine::new(Some(generator), keyword, resolver, config);
//! let plan = engine.plan_with_fallback("Compare managed Kubernetes pricing").await?;
//! for validation in &plan.validations {
//!     println!("{} -> {}", validation.perspective.text, validation.perspective.recommended_agent);
//! }
//! ```

/// Generation, validation and re-resolution.
pub mod engine;

pub use engine::{
    generation_prompt, PerspectiveConfig, PerspectiveEngine, PerspectivePlan,
    PerspectiveValidation,
};
