//! Anthropic Messages API analyzer
//!
//! # Example
//!
//! ```rust,ignore
//! use waveplan::llm::{AnalysisRequest, AnthropicAnalyzer, EnvCredentials, SemanticAnalyzer};
//! use std::sync::Arc;
//!
//! let analyzer = AnthropicAnalyzer::new(
//!     "claude",
//!     "claude-sonnet-4-5",
//!     Arc::new(EnvCredentials::new("ANTHROPIC_API_KEY")),
//! );
//! let text = analyzer.submit(&AnalysisRequest::new("Classify: ...")).await?;
//! ```

use crate::llm::client::{AnalysisRequest, CredentialProvider, SemanticAnalyzer};
use crate::llm::http::{check_status, map_send_error};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic analyzer over plain HTTP
pub struct AnthropicAnalyzer {
    http: reqwest::Client,
    name: String,
    model: String,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicAnalyzer {
    /// Create a new Anthropic analyzer
    ///
    /// # Arguments
    ///
    /// * `name` - Analyzer name used in logs and provenance
    /// * `model` - Model identifier
    /// * `credentials` - Source of the API key
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            name: name.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
        }
    }

    /// Point the analyzer at a different endpoint (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, request: &AnalysisRequest) -> serde_json::Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        body
    }

    fn extract_text(response: MessagesResponse) -> Result<String> {
        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(AppError::LLM("Anthropic returned no text content".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl SemanticAnalyzer for AnthropicAnalyzer {
    async fn submit(&self, request: &AnalysisRequest) -> Result<String> {
        let api_key = self.credentials.get_token().await?;
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| map_send_error("Anthropic", e))?;

        let response = check_status("Anthropic", response).await?;
        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to parse Anthropic response: {}", e)))?;

        Self::extract_text(parsed)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::StaticCredentials;

    fn analyzer() -> AnthropicAnalyzer {
        AnthropicAnalyzer::new("claude", "claude-test", Arc::new(StaticCredentials::new("k")))
    }

    #[test]
    fn test_body_uses_request_overrides() {
        let request = AnalysisRequest::new("hi")
            .with_system("sys")
            .with_model("other-model")
            .with_max_tokens(100);
        let body = analyzer().build_body(&request);

        assert_eq!(body["model"], "other-model");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_body_without_system() {
        let body = analyzer().build_body(&AnalysisRequest::new("hi"));
        assert_eq!(body["model"], "claude-test");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_extract_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "1}"}
            ]
        }))
        .unwrap();
        assert_eq!(AnthropicAnalyzer::extract_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_text_empty_is_error() {
        let response: MessagesResponse = serde_json::from_value(json!({"content": []})).unwrap();
        assert!(AnthropicAnalyzer::extract_text(response).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let a = analyzer().with_base_url("http://localhost:1234/");
        assert_eq!(a.base_url, "http://localhost:1234");
        assert_eq!(a.name(), "claude");
        assert_eq!(a.model_name(), "claude-test");
    }
}
