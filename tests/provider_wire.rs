use httpmock::prelude::*;

use diaforge::message::Message;
use diaforge::model::{ModelId, ProviderFamily};
use diaforge::providers::{
    ChatRequest, ImageAttachment, ModelClient, ProviderClient, ProviderEndpoints, ProviderError,
    drain,
};

fn client_for(server: &MockServer) -> ProviderClient {
    ProviderClient::from_env()
        .with_endpoints(ProviderEndpoints {
            openai: server.url("/openai/v1"),
            anthropic: server.url("/anthropic/v1"),
            gemini: server.url("/gemini/v1beta"),
        })
        .with_key(ProviderFamily::OpenAi, "test-openai-key")
        .with_key(ProviderFamily::Anthropic, "test-anthropic-key")
        .with_key(ProviderFamily::Gemini, "test-gemini-key")
}

#[tokio::test]
async fn openai_stream_concatenates_delta_chunks_until_done() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/openai/v1/chat/completions")
                .header("authorization", "Bearer test-openai-key")
                .json_body_partial(r#"{"model":"gpt-4o","stream":true,"temperature":0.0}"#);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"hel\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{}}]}\n\n",
                    "data: [DONE]\n\n",
                ));
        })
        .await;

    let client = client_for(&server);
    let request = ChatRequest::new(
        ModelId::parse("gpt-4o").unwrap(),
        vec![Message::user("say hello")],
    )
    .with_system("you are terse");
    let stream = client.stream(request).await.unwrap();
    let full = drain(stream, |_| {}).await.unwrap();

    assert_eq!(full, "hello");
    mock.assert_async().await;
}

#[tokio::test]
async fn openai_error_status_surfaces_the_api_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/openai/v1/chat/completions");
            then.status(429)
                .json_body(serde_json::json!({"error": {"message": "rate limited"}}));
        })
        .await;

    let client = client_for(&server);
    let request = ChatRequest::new(
        ModelId::parse("gpt-4o").unwrap(),
        vec![Message::user("hi")],
    );
    let err = client.stream(request).await.err().unwrap();
    match err {
        ProviderError::Api {
            status, message, ..
        } => {
            assert_eq!(status, 429);
            assert_eq!(message, "rate limited");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn anthropic_stream_extracts_content_block_deltas() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/anthropic/v1/messages")
                .header("x-api-key", "test-anthropic-key")
                .header("anthropic-version", "2023-06-01");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(concat!(
                    "event: message_start\n",
                    "data: {\"type\":\"message_start\"}\n\n",
                    "event: content_block_delta\n",
                    "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"a -> \"}}\n\n",
                    "event: content_block_delta\n",
                    "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"b\"}}\n\n",
                    "event: message_stop\n",
                    "data: {\"type\":\"message_stop\"}\n\n",
                ));
        })
        .await;

    let client = client_for(&server);
    let request = ChatRequest::new(
        ModelId::parse("claude-3-5-sonnet-20240620").unwrap(),
        vec![Message::user("diagram please")],
    );
    let stream = client.stream(request).await.unwrap();
    let full = drain(stream, |_| {}).await.unwrap();

    assert_eq!(full, "a -> b");
    mock.assert_async().await;
}

#[tokio::test]
async fn anthropic_vision_request_inlines_the_image_on_the_user_turn() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/anthropic/v1/messages")
                .body_contains("\"type\":\"image\"")
                .body_contains("\"media_type\":\"image/png\"")
                .body_contains("\"data\":\"aGVsbG8=\"");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"ok\"}}\n\n");
        })
        .await;

    let client = client_for(&server);
    let request = ChatRequest::new(
        ModelId::parse("claude-3-5-sonnet-20240620").unwrap(),
        vec![Message::user("critique this")],
    )
    .with_image(ImageAttachment::png("aGVsbG8=".to_string()));
    let stream = client.stream(request).await.unwrap();
    let full = drain(stream, |_| {}).await.unwrap();

    assert_eq!(full, "ok");
    mock.assert_async().await;
}

#[tokio::test]
async fn gemini_call_maps_roles_and_returns_one_chunk() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/gemini/v1beta/models/gemini-1.5-pro:generateContent")
                .query_param("key", "test-gemini-key")
                .body_contains("\"role\":\"model\"")
                .body_contains("systemInstruction");
            then.status(200).json_body(serde_json::json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{"text": "looks "}, {"text": "good"}]
                    }
                }]
            }));
        })
        .await;

    let client = client_for(&server);
    let request = ChatRequest::new(
        ModelId::parse("gemini-1.5-pro").unwrap(),
        vec![
            Message::user("critique"),
            Message::assistant("earlier reply"),
            Message::user("again"),
        ],
    )
    .with_system("be specific");
    let stream = client.stream(request).await.unwrap();
    let full = drain(stream, |_| {}).await.unwrap();

    assert_eq!(full, "looks good");
    mock.assert_async().await;
}

#[tokio::test]
async fn gemini_empty_candidates_yield_an_empty_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/gemini/v1beta/models/gemini-1.5-pro:generateContent");
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let client = client_for(&server);
    let request = ChatRequest::new(
        ModelId::parse("gemini-1.5-pro").unwrap(),
        vec![Message::user("hi")],
    );
    let stream = client.stream(request).await.unwrap();
    assert_eq!(drain(stream, |_| {}).await.unwrap(), "");
}
