//! Semantic analyzer abstractions
//!
//! Every remote language-understanding backend implements [`SemanticAnalyzer`]:
//! submit a prompt, get text back or a typed failure. Credentials are supplied
//! through [`CredentialProvider`] so a cached token lives in an explicit object
//! owned by the caller rather than in process-wide state.

use crate::types::{AppError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// One request to a semantic analyzer
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// User prompt
    pub prompt: String,
    /// Optional system prompt
    pub system: Option<String>,
    /// Model override; the analyzer's configured model is used when `None`
    pub model: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl AnalysisRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: None,
            max_tokens: 2048,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Generic semantic analyzer trait for provider abstraction
///
/// Implementations return the raw response text. Parsing and schema
/// validation happen in the caller.
///
/// # Errors
///
/// - [`AppError::Auth`] for rejected or missing credentials (never retried)
/// - [`AppError::Transient`] for timeouts, rate limits, quota and server errors
/// - [`AppError::LLM`] for anything else the provider reports
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    /// Submit a request and return the response text
    async fn submit(&self, request: &AnalysisRequest) -> Result<String>;

    /// Name used in logs and consensus provenance
    fn name(&self) -> &str;

    /// Configured model identifier
    fn model_name(&self) -> &str;
}

/// Source of bearer tokens / API keys
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_token(&self) -> Result<String>;
}

/// Reads the API key from an environment variable on every call
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var_name(&self) -> &str {
        &self.var
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn get_token(&self) -> Result<String> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(AppError::Auth(format!(
                "environment variable {} is not set",
                self.var
            ))),
        }
    }
}

/// A fixed key, mostly for tests and embedding
#[derive(Clone)]
pub struct StaticCredentials(String);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCredentials(***)")
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(AppError::Auth("empty credential".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Caches the first successfully fetched token.
///
/// The cache is scoped to this value, so two sessions holding different
/// `CachedCredentials` never see each other's tokens.
pub struct CachedCredentials {
    inner: Arc<dyn CredentialProvider>,
    token: RwLock<Option<String>>,
}

impl CachedCredentials {
    pub fn new(inner: Arc<dyn CredentialProvider>) -> Self {
        Self {
            inner,
            token: RwLock::new(None),
        }
    }

    /// Drop the cached token (e.g. after an auth failure)
    pub fn invalidate(&self) {
        *self.token.write() = None;
    }
}

#[async_trait]
impl CredentialProvider for CachedCredentials {
    async fn get_token(&self) -> Result<String> {
        let cached = self.token.read().clone();
        if let Some(token) = cached {
            return Ok(token);
        }
        let token = self.inner.get_token().await?;
        *self.token.write() = Some(token.clone());
        Ok(token)
    }
}
