//! OpenAI backend against a mock HTTP server

use std::time::Duration;

use call_assistant_llm::{FinishReason, LlmBackend, LlmConfig, LlmError, Message, OpenAIBackend};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> OpenAIBackend {
    let config = LlmConfig {
        endpoint: format!("{}/v1", server.uri()),
        api_key: Some("sk-test".into()),
        max_retries: 2,
        ..Default::default()
    }
    .with_initial_backoff(Duration::from_millis(5));
    OpenAIBackend::new(config).unwrap()
}

fn completion(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 20, "completion_tokens": 7, "total_tokens": 27 }
    })
}

#[tokio::test]
async fn generate_success_sends_bearer_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("We open at 8.")))
        .expect(1)
        .mount(&server)
        .await;

    let result = backend(&server)
        .generate(&[Message::user("When do you open?")])
        .await
        .unwrap();

    assert_eq!(result.text, "We open at 8.");
    assert_eq!(result.tokens, 7);
    assert_eq!(result.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn generate_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Recovered")))
        .mount(&server)
        .await;

    let result = backend(&server).generate(&[Message::user("hi")]).await.unwrap();
    assert_eq!(result.text, "Recovered");
}

#[tokio::test]
async fn generate_does_not_retry_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .expect(1)
        .mount(&server)
        .await;

    let err = backend(&server).generate(&[Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, LlmError::Api(_)), "got {:?}", err);
}

#[tokio::test]
async fn generate_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = backend(&server).generate(&[Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, LlmError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn generate_rejects_empty_choices() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = backend(&server).generate(&[Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse(_)));
}

#[tokio::test]
async fn availability_probe() {
    let server = MockServer::start().await;
    assert!(!backend(&server).is_available().await);

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .mount(&server)
        .await;
    assert!(backend(&server).is_available().await);
}
