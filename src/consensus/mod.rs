//! Multi-source classification consensus
//!
//! The keyword baseline and any number of semantic analyzers classify the same
//! query concurrently. Each source settles on its own (success, failure or
//! timeout) and the settled results are reconciled by voting:
//!
//! | Valid sources | Agreement | Method |
//! |---------------|-----------|--------|
//! | 0 | - | error (`AllSourcesFailed`) |
//! | 1 | - | `fallback` |
//! | n | all agree on domain and complexity | `unanimous` |
//! | n | at least two agree on either | `majority` |
//! | n | otherwise | `weighted` |

/// Classification resolver and voting.
pub mod resolver;
/// Analyzer response validation.
pub mod schema;

pub use resolver::{
    classification_prompt, reconcile, ClassifierSource, ConsensusOutcome, ConsensusResolver,
    ResolutionMethod, SourceOutcome,
};
pub use schema::{extract_json_object, parse_classification, parse_perspective_batch};
