//! Semantic analyzer clients and call management
//!
//! A semantic analyzer is anything that takes a prompt and returns text within a
//! timeout. The rest of the crate only sees the [`SemanticAnalyzer`] trait; the
//! concrete HTTP clients live in [`anthropic`] and [`openai`].
//!
//! # Architecture
//!
//! - [`SemanticAnalyzer`] - The core trait every analyzer implements
//! - [`CredentialProvider`] - Where API keys come from (environment, cached, static)
//! - [`RetryPolicy`] / [`RetryMachine`] - Exponential backoff with jitter and retry-after hints
//! - [`Throttle`] - Per-analyzer minimum interval between calls
//! - [`ManagedAnalyzer`] - An analyzer wrapped with throttle, retry and per-attempt timeout
//!
//! # Example
//!
//! ```ignore
//! use waveplan::llm::{AnalysisRequest, ManagedAnalyzer, RetryPolicy};
//!
//! let managed = ManagedAnalyzer::new(analyzer, RetryPolicy::default())
//!     .with_min_interval(Duration::from_secs(5))
//!     .with_attempt_timeout(Duration::from_secs(60));
//!
//! let text = managed.submit(&AnalysisRequest::new("Classify this query")).await?;
//! ```

/// Anthropic Messages API analyzer.
pub mod anthropic;
/// Core analyzer trait, request type and credential providers.
pub mod client;
/// HTTP status to typed error mapping shared by the HTTP analyzers.
pub mod http;
/// Analyzer wrapped with throttle, retry and timeout.
pub mod managed;
/// OpenAI-compatible chat completions analyzer.
pub mod openai;
/// Retry/backoff state machine.
pub mod retry;
/// Minimum-interval throttle.
pub mod throttle;

pub use anthropic::AnthropicAnalyzer;
pub use client::{
    AnalysisRequest, CachedCredentials, CredentialProvider, EnvCredentials, SemanticAnalyzer,
    StaticCredentials,
};
pub use managed::ManagedAnalyzer;
pub use openai::OpenAIAnalyzer;
pub use retry::{is_retryable, parse_retry_after, RetryMachine, RetryPolicy, RetryState};
pub use throttle::Throttle;
