//! Deterministic query classification
//!
//! The [`keyword::KeywordClassifier`] scores a query against fixed per-domain
//! dictionaries without any network calls. It is the baseline source for the
//! consensus resolver and the validator for semantic perspective labels.
//!
//! The allocation routine in [`keyword::allocate_workers`] is shared by every
//! classification source so that each result's allocation sums exactly to its
//! worker count.

/// Dictionary-driven domain and complexity scoring.
pub mod keyword;

pub use keyword::{allocate_workers, predict_pivot_scenarios, rank_secondary, KeywordClassifier};
