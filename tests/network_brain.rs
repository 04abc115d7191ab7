// OpenAI-compatible client against a local stand-in endpoint.

use std::time::Duration;

use focus_panel::{LlmError, NetworkBrain, TextGenerator};
use mockito::{Matcher, Server};
use secrecy::SecretString;

const COMPLETION: &str = r#"{
    "choices": [{ "message": { "role": "assistant", "content": "  Honestly, I'd try it.  " } }],
    "usage": { "prompt_tokens": 42, "completion_tokens": 6 }
}"#;

fn brain(server: &Server) -> NetworkBrain {
    NetworkBrain::new("groq", SecretString::new("test-key".to_string()), Some("test-model".into()))
        .unwrap()
        .with_base_url(&server.url())
        .with_rate_limit(0)
        .with_max_attempts(2)
}

#[tokio::test]
async fn completion_is_trimmed_and_authenticated() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJsonString(r#"{"model": "test-model"}"#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(COMPLETION)
        .expect(1)
        .create_async()
        .await;

    let text = brain(&server).complete("system", "user", 0.5, 64).await.unwrap();
    assert_eq!(text, "Honestly, I'd try it.");
    mock.assert_async().await;
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body("bad key")
        .expect(1)
        .create_async()
        .await;

    let err = brain(&server).complete("s", "u", 0.5, 64).await.unwrap_err();
    match err {
        LlmError::Status { status, body, provider } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad key");
            assert_eq!(provider, "groq");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limit_honours_retry_after_then_gives_up() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(2)
        .create_async()
        .await;

    let err = brain(&server).complete("s", "u", 0.5, 64).await.unwrap_err();
    assert!(matches!(err, LlmError::RateLimited { attempts: 2, .. }), "{err:?}");
    mock.assert_async().await;
}

#[tokio::test]
async fn oversized_retry_after_is_capped() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", "99999999999999999999999")
        .expect(2)
        .create_async()
        .await;

    let started = std::time::Instant::now();
    let err = brain(&server)
        .with_max_wait(Duration::from_millis(20))
        .complete("s", "u", 0.5, 64)
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::RateLimited { attempts: 2, .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    mock.assert_async().await;
}

#[tokio::test]
async fn payload_without_choices_is_invalid() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": []}"#)
        .create_async()
        .await;

    let err = brain(&server).complete("s", "u", 0.5, 64).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn open_circuit_short_circuits_without_a_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(403)
        .expect(1)
        .create_async()
        .await;

    let brain = brain(&server).with_circuit_breaker(1, Duration::from_secs(60));
    assert!(matches!(
        brain.complete("s", "u", 0.5, 64).await,
        Err(LlmError::Status { status: 403, .. })
    ));
    assert!(matches!(
        brain.complete("s", "u", 0.5, 64).await,
        Err(LlmError::CircuitOpen { .. })
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn complete_json_strips_fences() {
    let mut server = Server::new_async().await;
    let body = serde_json::json!({
        "choices": [{ "message": { "content": "Here you go:\n```json\n{\"changed_mind\": false, \"new_valence\": null}\n```" } }]
    });
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let json = brain(&server).complete_json("s", "u", 0.1, 64).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["changed_mind"], false);
    assert!(value["new_valence"].is_null());
}
