//! Mock implementations for testing.
//!
//! Scripted semantic analyzers and response builders shared by the
//! integration tests, so no test ever reaches a real provider.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use waveplan::llm::{AnalysisRequest, ManagedAnalyzer, RetryPolicy, SemanticAnalyzer};
use waveplan::types::{AppError, Result, TransientKind};

/// How a scripted reply should fail
#[derive(Debug, Clone)]
pub enum MockFailure {
    Auth,
    RateLimit,
    Schema,
    Timeout,
}

impl MockFailure {
    fn to_error(&self, name: &str) -> AppError {
        match self {
            MockFailure::Auth => AppError::Auth(format!("{}: invalid api key", name)),
            MockFailure::RateLimit => {
                AppError::transient(TransientKind::RateLimit, format!("{}: rate limited", name))
            }
            MockFailure::Schema => AppError::Schema(format!("{}: malformed", name)),
            MockFailure::Timeout => {
                AppError::transient(TransientKind::Timeout, format!("{}: timed out", name))
            }
        }
    }
}

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(MockFailure),
}

/// Mock semantic analyzer with scripted replies.
///
/// Replies are consumed in order; once the script runs out the last reply
/// repeats. Every call is counted and its prompt recorded.
///
/// ```ignore
/// let analyzer = MockAnalyzer::new("claude", &classification("security", "COMPLEX", 90));
/// let failing = MockAnalyzer::failing("gemini", MockFailure::Auth);
/// let flaky = MockAnalyzer::sequence("gpt", vec![Reply::Fail(MockFailure::RateLimit), Reply::Text(ok)]);
/// ```
pub struct MockAnalyzer {
    name: String,
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    delay: Duration,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl MockAnalyzer {
    /// Always answer with `response`
    pub fn new(name: &str, response: &str) -> Self {
        Self::sequence(name, vec![Reply::Text(response.to_string())])
    }

    /// Always fail the same way
    pub fn failing(name: &str, failure: MockFailure) -> Self {
        Self::sequence(name, vec![Reply::Fail(failure)])
    }

    /// Play `replies` in order, repeating the last one
    pub fn sequence(name: &str, replies: Vec<Reply>) -> Self {
        let last = replies
            .last()
            .cloned()
            .unwrap_or(Reply::Fail(MockFailure::Schema));
        Self {
            name: name.to_string(),
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering (use with a paused clock)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl SemanticAnalyzer for MockAnalyzer {
    async fn submit(&self, request: &AnalysisRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = {
            let mut replies = self.replies.lock();
            match replies.pop_front() {
                Some(reply) => {
                    *self.last.lock() = reply.clone();
                    reply
                }
                None => self.last.lock().clone(),
            }
        };
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(failure) => Err(failure.to_error(&self.name)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        "mock-1"
    }
}

/// Wrap a mock without throttle or retries
pub fn managed(analyzer: Arc<MockAnalyzer>) -> ManagedAnalyzer {
    ManagedAnalyzer::new(analyzer, RetryPolicy::no_retry()).with_min_interval(Duration::ZERO)
}

/// Wrap a mock with the default retry policy and no throttle
pub fn managed_with_retries(analyzer: Arc<MockAnalyzer>) -> ManagedAnalyzer {
    ManagedAnalyzer::new(analyzer, RetryPolicy::default()).with_min_interval(Duration::ZERO)
}

/// Classification response text as a model would return it
pub fn classification(primary: &str, complexity: &str, confidence: u8) -> String {
    let mut scores = serde_json::Map::new();
    scores.insert(primary.to_string(), json!(90));
    json!({
        "primary_domain": primary,
        "secondary_domains": [],
        "domain_scores": scores,
        "complexity": complexity,
        "confidence": confidence,
    })
    .to_string()
}

/// One perspective entry
pub fn perspective(text: &str, domain: &str, agent: &str, confidence: u8) -> Value {
    json!({
        "text": text,
        "domain": domain,
        "confidence": confidence,
        "recommended_agent": agent,
        "rationale": "scripted",
        "platforms": [{"name": "nvd.nist.gov", "reason": "vulnerability data"}, "github.com"],
    })
}

/// Perspective-generation response text wrapped in a fenced block
pub fn perspective_batch(perspectives: Vec<Value>) -> String {
    let body = json!({
        "perspectives": perspectives,
        "complexity": "MODERATE",
        "time_sensitive": false,
        "reasoning": "scripted batch",
    });
    format!("Here is the plan:\n```json\n{}\n```", body)
}
