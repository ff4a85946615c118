use crate::llm::client::{AnalysisRequest, CredentialProvider, SemanticAnalyzer};
use crate::llm::http::{check_status, map_send_error};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Analyzer for any OpenAI-compatible chat completions endpoint
pub struct OpenAIAnalyzer {
    http: reqwest::Client,
    name: String,
    model: String,
    api_base: String,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIAnalyzer {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            name: name.into(),
            model: model.into(),
            api_base: DEFAULT_BASE_URL.to_string(),
            credentials,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, request: &AnalysisRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }
}

#[async_trait]
impl SemanticAnalyzer for OpenAIAnalyzer {
    async fn submit(&self, request: &AnalysisRequest) -> Result<String> {
        let api_key = self.credentials.get_token().await?;
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| map_send_error("OpenAI", e))?;

        let response = check_status("OpenAI", response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to parse OpenAI response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::LLM("No response from OpenAI".to_string()))
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

    #[test]
    fn test_body_puts_system_first() {
        let analyzer =
            OpenAIAnalyzer::new("gpt", "gpt-test", Arc::new(StaticCredentials::new("k")));
        let body = analyzer.build_body(&AnalysisRequest::new("hello").with_system("sys"));

        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_api_base_override() {
        let analyzer = OpenAIAnalyzer::new("gpt", "gpt-test", Arc::new(StaticCredentials::new("k")))
            .with_api_base("http://127.0.0.1:9/v1/");
        assert_eq!(analyzer.api_base, "http://127.0.0.1:9/v1");
    }
}
