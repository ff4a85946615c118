use crate::llm::client::{AnalysisRequest, SemanticAnalyzer};
use crate::llm::retry::RetryPolicy;
use crate::llm::throttle::Throttle;
use crate::types::{AppError, Result, TransientKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// An analyzer together with its call discipline: throttle, retry policy and
/// per-attempt timeout.
///
/// Cloning shares the throttle, so every clone respects the same minimum
/// interval.
#[derive(Clone)]
pub struct ManagedAnalyzer {
    analyzer: Arc<dyn SemanticAnalyzer>,
    throttle: Arc<Throttle>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    defaults: AnalysisRequest,
}

impl ManagedAnalyzer {
    pub fn new(analyzer: Arc<dyn SemanticAnalyzer>, policy: RetryPolicy) -> Self {
        Self {
            analyzer,
            throttle: Arc::new(Throttle::new(Duration::from_secs(5))),
            policy,
            attempt_timeout: Duration::from_secs(60),
            defaults: AnalysisRequest::new(""),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.throttle = Arc::new(Throttle::new(min_interval));
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Default max tokens / temperature applied by [`ManagedAnalyzer::request`]
    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.defaults.max_tokens = max_tokens;
        self.defaults.temperature = temperature;
        self
    }

    pub fn name(&self) -> &str {
        self.analyzer.name()
    }

    pub fn model_name(&self) -> &str {
        self.analyzer.model_name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Build a request carrying this analyzer's generation defaults
    pub fn request(&self, prompt: impl Into<String>) -> AnalysisRequest {
        AnalysisRequest {
            prompt: prompt.into(),
            ..self.defaults.clone()
        }
    }

    /// Submit under throttle, timeout and retry
    pub async fn submit(&self, request: &AnalysisRequest) -> Result<String> {
        self.policy
            .run(self.analyzer.name(), |attempt| self.attempt(request, attempt))
            .await
    }

    async fn attempt(&self, request: &AnalysisRequest, attempt: u32) -> Result<String> {
        let _permit = self.throttle.acquire().await;
        tracing::debug!(analyzer = self.analyzer.name(), attempt, "Submitting analysis request");

        match timeout(self.attempt_timeout, self.analyzer.submit(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::transient(
                TransientKind::Timeout,
                format!(
                    "{} did not respond within {}s",
                    self.analyzer.name(),
                    self.attempt_timeout.as_secs()
                ),
            )),
        }
    }
}

impl std::fmt::Debug for ManagedAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedAnalyzer")
            .field("name", &self.analyzer.name())
            .field("model", &self.analyzer.model_name())
            .field("policy", &self.policy)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}
