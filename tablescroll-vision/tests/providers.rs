mod common;

use serde_json::json;
use tablescroll_common::{ScrollError, ServiceFailure, VisionConfig};
use tablescroll_vision::anthropic::AnthropicClient;
use tablescroll_vision::gemini::GeminiClient;
use tablescroll_vision::openai::OpenAiClient;
use tablescroll_vision::traits::VisionClient;
use tablescroll_vision::{ImageData, Part, Turn, VisionRequest};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn frame_request() -> VisionRequest {
    VisionRequest::new(vec![
        Turn::user_text("Here are examples."),
        Turn::assistant_text("Understood."),
        Turn::user(vec![
            Part::Image(ImageData::from_base64(common::PNG_B64)),
            Part::Text("Should we keep scrolling?".into()),
        ]),
    ])
    .with_system("You judge tables.")
    .with_max_tokens(256)
    .with_temperature(0.5)
}

#[tokio::test]
async fn anthropic_sends_image_blocks_and_joins_text() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "system": "You judge tables.",
            "max_tokens": 256
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "claude-test",
            "content": [
                {"type": "text", "text": "<reasoning>rows remain</reasoning>"},
                {"type": "tool_use", "id": "x", "name": "n", "input": {}},
                {"type": "text", "text": "<decision>CONTINUE\n300px</decision>"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::with_base_url(
        "sk-ant-test",
        "claude-test".into(),
        &format!("{}/", server.uri()),
    )
    .unwrap();
    let reply = client.complete(&frame_request()).await.unwrap();
    assert!(reply.text.contains("<reasoning>rows remain</reasoning>"));
    assert!(reply.text.contains("300px"));
    assert_eq!(reply.tokens_used, Some(15));

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = received[0].body_json().unwrap();
    let last = &body["messages"][2]["content"];
    assert_eq!(last[0]["type"], "image");
    assert_eq!(last[0]["source"]["media_type"], "image/png");
    assert_eq!(last[1]["type"], "text");
    assert_eq!(body["messages"][1]["role"], "assistant");
}

#[tokio::test]
async fn anthropic_auth_failure_is_not_retryable() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        AnthropicClient::with_base_url("bad", "claude-test".into(), &format!("{}/", server.uri()))
            .unwrap();
    let err = client.complete(&frame_request()).await.unwrap_err();
    match &err {
        ScrollError::Service { kind, message } => {
            assert_eq!(*kind, ServiceFailure::Auth);
            assert!(message.contains("invalid x-api-key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn openai_uses_data_urls_and_bearer_auth() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o",
            "choices": [{"message": {"role": "assistant", "content": "<decision>STOP\nNONE</decision>"}}],
            "usage": {"total_tokens": 42}
        })))
        .mount(&server)
        .await;

    let client =
        OpenAiClient::with_base_url("sk-test".into(), "gpt-4o".into(), &format!("{}/", server.uri()))
            .unwrap();
    let reply = client.complete(&frame_request()).await.unwrap();
    assert!(reply.text.contains("STOP"));
    assert_eq!(reply.tokens_used, Some(42));

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = received[0].body_json().unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][2]["content"], "Understood.");
    let url = body["messages"][3]["content"][0]["image_url"]["url"]
        .as_str()
        .unwrap();
    assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));
}

#[tokio::test]
async fn openai_empty_choice_is_a_decode_failure() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"model": "gpt-4o", "choices": []})),
        )
        .mount(&server)
        .await;

    let client =
        OpenAiClient::with_base_url("sk-test".into(), "gpt-4o".into(), &format!("{}/", server.uri()))
            .unwrap();
    let err = client.complete(&frame_request()).await.unwrap_err();
    assert!(matches!(
        err,
        ScrollError::Service {
            kind: ServiceFailure::Decode,
            ..
        }
    ));
}

#[tokio::test]
async fn gemini_passes_key_as_query_and_inline_data() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .and(query_param("key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "<reasoning>r</reasoning>"}, {"text": "<decision>CONTINUE\n100px</decision>"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 7}
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url(
        "g-key".into(),
        "gemini-test".into(),
        &format!("{}/", server.uri()),
    )
    .unwrap();
    let reply = client.complete(&frame_request()).await.unwrap();
    assert_eq!(
        reply.text,
        "<reasoning>r</reasoning><decision>CONTINUE\n100px</decision>"
    );

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = received[0].body_json().unwrap();
    assert_eq!(body["contents"][1]["role"], "model");
    assert_eq!(
        body["contents"][2]["parts"][0]["inlineData"]["mimeType"],
        "image/png"
    );
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You judge tables.");
}

#[tokio::test]
async fn rate_limits_are_retried_before_surfacing() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_json(json!({"error": {"message": "slow down"}})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client =
        OpenAiClient::with_base_url("sk-test".into(), "gpt-4o".into(), &format!("{}/", server.uri()))
            .unwrap();
    let err = client.complete(&frame_request()).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("slow down"));
}

#[tokio::test]
async fn health_check_reports_false_on_failure() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "bad"}})))
        .mount(&server)
        .await;

    let client =
        AnthropicClient::with_base_url("k", "claude-test".into(), &format!("{}/", server.uri()))
            .unwrap();
    assert!(!client.health_check().await.unwrap());
}

#[test]
fn connect_requires_an_api_key() {
    let cfg = VisionConfig::Gemini {
        model: "gemini-test".into(),
        api_key: None,
        base_url: None,
    };
    let err = tablescroll_vision::connect(&cfg).err().unwrap();
    assert!(matches!(err, ScrollError::Config(_)));
}
