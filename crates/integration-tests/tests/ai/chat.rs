use indoc::indoc;
use integration_tests::*;
use serde_json::{Value, json};

const FREE_OPENAI: &str = indoc! {r#"
    [plans.free]
    providers = ["openai"]
    requests_per_day = 2
    requests_per_minute = 10
"#};

fn chat(provider: &str) -> Value {
    json!({
        "provider": provider,
        "messages": [{ "role": "user", "content": "What is the capital of France?" }],
        "options": { "temperature": 0.2, "maxTokens": 64 }
    })
}

#[tokio::test]
async fn chat_completion() {
    let vendor = MockVendor::start("Paris.").await;

    let server = TestServer::builder()
        .config(FREE_OPENAI)
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&chat("openai"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "success": true,
      "response": "Paris.",
      "usage": {
        "prompt_tokens": 5,
        "completion_tokens": 3,
        "total_tokens": 8
      }
    }
    "#);

    assert_eq!(vendor.hits(), 1);
    assert_eq!(vendor.last_authorization().as_deref(), Some("Bearer sk-server"));
}

#[tokio::test]
async fn daily_quota_is_enforced() {
    let vendor = MockVendor::start("Paris.").await;

    let server = TestServer::builder()
        .config(FREE_OPENAI)
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    for _ in 0..2 {
        let response = server
            .client
            .post("/api/ai/chat")
            .as_user("u1")
            .json(&chat("openai"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&chat("openai"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 429);
    assert!(response.headers().contains_key("retry-after"));

    let body: Value = response.json().await.unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Daily limit reached");
    assert_eq!(body["limit"], 2);
    assert!(body["resetAt"].as_str().unwrap().ends_with('Z'));

    // The refused call never reached the vendor.
    assert_eq!(vendor.hits(), 2);

    // Quotas are per user.
    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u2")
        .json(&chat("openai"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn provider_outside_the_plan() {
    let server = TestServer::start_default().await;

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&chat("claude"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "success": false,
      "error": "claude not available on plan free",
      "type": "entitlement_error",
      "allowedProviders": [
        "gemini"
      ]
    }
    "#);
}

#[tokio::test]
async fn subscription_unlocks_providers() {
    let vendor = MockVendor::start("Bonjour.").await;

    let server = TestServer::builder()
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    server.subscribe("u1", "pro");

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&chat("openai"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(vendor.hits(), 1);
}

#[tokio::test]
async fn empty_messages() {
    let server = TestServer::start_default().await;

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&json!({ "provider": "gemini", "messages": [] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();

    insta::assert_snapshot!(body["error"], @r#""Validation error: messages must contain at least one message""#);
}

#[tokio::test]
async fn vendor_failure_is_reported() {
    let vendor = MockVendor::with_response(
        reqwest::StatusCode::UNAUTHORIZED,
        json!({ "error": { "message": "Incorrect API key provided" } }),
    )
    .await;

    let server = TestServer::builder()
        .config(FREE_OPENAI)
        .vendor("openai", &vendor, "sk-revoked")
        .build()
        .await;

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&chat("openai"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);

    let body: Value = response.json().await.unwrap();

    assert_eq!(body["error"], "OpenAI API error (401): Incorrect API key provided");
    assert_eq!(body["type"], "api_error");

    // Client errors are not retried.
    assert_eq!(vendor.hits(), 1);
}

#[tokio::test]
async fn vendor_status_reaches_the_client() {
    let vendor = MockVendor::with_response(
        reqwest::StatusCode::SERVICE_UNAVAILABLE,
        json!({ "error": { "message": "The engine is currently overloaded" } }),
    )
    .await;

    let server = TestServer::builder()
        .config(FREE_OPENAI)
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&chat("openai"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "OpenAI API error (503): The engine is currently overloaded");

    // One retry for a vendor 5xx.
    assert_eq!(vendor.hits(), 2);
}

#[tokio::test]
async fn unreachable_vendor_is_a_server_error() {
    let server = TestServer::builder()
        .config(FREE_OPENAI)
        .config(indoc! {r#"
            [providers.openai]
            api_key = "sk-server"
            base_url = "http://127.0.0.1:1"
        "#})
        .build()
        .await;

    let response = server
        .client
        .post("/api/ai/chat")
        .as_user("u1")
        .json(&chat("openai"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);

    let body: Value = response.json().await.unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["type"], "transport_error");
    assert!(body["error"].as_str().unwrap().starts_with("Connection error"));
}
