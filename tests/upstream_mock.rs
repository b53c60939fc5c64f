//! Upstream client tests against a mocked HTTP server.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose;
use comicgen::upstream::fal::FalImages;
use comicgen::upstream::openai::{OpenAiImages, OpenAiText};
use comicgen::upstream::{ImageGenerator, TextGenerator, UpstreamError, http_client};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn client() -> reqwest::Client {
    http_client(TIMEOUT).expect("build client")
}

#[tokio::test]
async fn responses_api_returns_output_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4.1",
            "max_output_tokens": 1000,
            "text": { "format": { "type": "json_object" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": [
                { "type": "reasoning", "content": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": " {\"Scene 1\": \"a robot\"} " }
                ]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = OpenAiText::new(client(), &server.uri(), "sk-test", "gpt-4.1", TIMEOUT)
        .expect("valid base url");
    let answer = text
        .complete("plan a comic", 1000, 0.7)
        .await
        .expect("answer");
    assert_eq!(answer, "{\"Scene 1\": \"a robot\"}");
}

#[tokio::test]
async fn responses_api_errors_are_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let text = OpenAiText::new(client(), &server.uri(), "sk-test", "gpt-4.1", TIMEOUT)
        .expect("valid base url");
    let err = text.complete("plan", 1000, 0.7).await.expect_err("429");
    match err {
        UpstreamError::Status { status, body, .. } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn responses_api_missing_text_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": [] })))
        .mount(&server)
        .await;

    let text = OpenAiText::new(client(), &server.uri(), "sk-test", "gpt-4.1", TIMEOUT)
        .expect("valid base url");
    let err = text.complete("plan", 1000, 0.7).await.expect_err("no text");
    assert!(matches!(err, UpstreamError::InvalidResponse { .. }));
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "output_text": "{}" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let timeout = Duration::from_millis(100);
    let client = http_client(timeout).expect("build client");
    let text = OpenAiText::new(client, &server.uri(), "sk-test", "gpt-4.1", timeout)
        .expect("valid base url");
    let err = text.complete("plan", 1000, 0.7).await.expect_err("timeout");
    assert!(matches!(err, UpstreamError::Timeout { .. }));
}

#[tokio::test]
async fn fal_returns_image_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/schnell"))
        .and(header("authorization", "Key fal-test"))
        .and(body_partial_json(json!({ "prompt": "a robot", "num_images": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [
                { "url": "https://fal.media/files/1.png", "width": 1024, "height": 768 }
            ],
            "seed": 42
        })))
        .expect(1)
        .mount(&server)
        .await;

    let images = FalImages::new(
        client(),
        &format!("{}/", server.uri()),
        "fal-test",
        "fal-ai/flux/schnell",
        TIMEOUT,
    )
    .expect("valid base url");
    let urls = images.generate("a robot").await.expect("urls");
    assert_eq!(urls, vec!["https://fal.media/files/1.png"]);
}

#[tokio::test]
async fn fal_server_errors_surface_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/schnell"))
        .respond_with(ResponseTemplate::new(500).set_body_string("worker crashed"))
        .mount(&server)
        .await;

    let images = FalImages::new(client(), &server.uri(), "fal-test", "fal-ai/flux/schnell", TIMEOUT)
        .expect("valid base url");
    let err = images.generate("a robot").await.expect_err("500");
    assert!(matches!(err, UpstreamError::Status { status: 500, .. }));
}

#[tokio::test]
async fn openai_images_pass_urls_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({ "model": "dall-e-2", "response_format": "url" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": "https://images.example/panel.png" }]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let images = OpenAiImages::new(
        client(),
        &server.uri(),
        "sk-test",
        "dall-e-2",
        dir.path().to_path_buf(),
        TIMEOUT,
    )
    .expect("valid base url");
    let urls = images.generate("a robot").await.expect("urls");
    assert_eq!(urls, vec!["https://images.example/panel.png"]);
}

#[tokio::test]
async fn openai_images_store_base64_panels() {
    let server = MockServer::start().await;
    let png = b"\x89PNG\r\n\x1a\nnot really a png";
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({
            "model": "gpt-image-1",
            "quality": "medium",
            "output_format": "png"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "b64_json": general_purpose::STANDARD.encode(png) }]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let images = OpenAiImages::new(
        client(),
        &server.uri(),
        "sk-test",
        "gpt-image-1",
        dir.path().to_path_buf(),
        TIMEOUT,
    )
    .expect("valid base url");
    let urls = images.generate("a robot").await.expect("urls");
    assert_eq!(urls.len(), 1);

    let file = urls[0]
        .strip_prefix("/panels/")
        .expect("served from the panel route");
    assert!(file.ends_with(".png"));
    let stored = std::fs::read(dir.path().join(file)).expect("panel written");
    assert_eq!(stored, png);
}
