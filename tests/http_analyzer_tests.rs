//! HTTP analyzer clients against a local mock server.

use std::sync::Arc;
use std::time::Duration;
use waveplan::llm::{
    AnalysisRequest, AnthropicAnalyzer, ManagedAnalyzer, OpenAIAnalyzer, RetryPolicy,
    SemanticAnalyzer, StaticCredentials,
};
use waveplan::types::{AppError, TransientKind};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn anthropic(server: &MockServer) -> AnthropicAnalyzer {
    AnthropicAnalyzer::new("claude", "claude-test", Arc::new(StaticCredentials::new("test-key")))
        .with_base_url(server.uri())
}

fn openai(server: &MockServer) -> OpenAIAnalyzer {
    OpenAIAnalyzer::new("gpt", "gpt-test", Arc::new(StaticCredentials::new("test-key")))
        .with_api_base(format!("{}/v1", server.uri()))
}

fn anthropic_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "id": "msg_1",
        "type": "message",
        "content": [{"type": "text", "text": text}],
    }))
}

#[tokio::test]
async fn test_anthropic_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({"model": "claude-test"})))
        .respond_with(anthropic_reply("{\"primary_domain\": \"security\"}"))
        .expect(1)
        .mount(&server)
        .await;

    let text = anthropic(&server)
        .submit(&AnalysisRequest::new("Classify this query"))
        .await
        .unwrap();
    assert_eq!(text, "{\"primary_domain\": \"security\"}");
}

#[tokio::test]
async fn test_openai_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = openai(&server)
        .submit(&AnalysisRequest::new("Classify this query"))
        .await
        .unwrap();
    assert_eq!(text, "ok");
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let err = anthropic(&server)
        .submit(&AnalysisRequest::new("q"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let err = openai(&server)
        .submit(&AnalysisRequest::new("q"))
        .await
        .unwrap_err();
    match err {
        AppError::Transient {
            kind, retry_after, ..
        } => {
            assert_eq!(kind, TransientKind::RateLimit);
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected a transient error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_quota_body_is_quota_kind() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("You exceeded your current quota"))
        .mount(&server)
        .await;

    let err = openai(&server)
        .submit(&AnalysisRequest::new("q"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Transient {
            kind: TransientKind::Quota,
            ..
        }
    ));
}

#[tokio::test]
async fn test_managed_analyzer_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(anthropic_reply("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    };
    let managed = ManagedAnalyzer::new(Arc::new(anthropic(&server)), policy)
        .with_min_interval(Duration::ZERO);

    let text = managed.submit(&managed.request("q")).await.unwrap();
    assert_eq!(text, "recovered");
}
