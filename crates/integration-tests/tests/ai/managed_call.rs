use indoc::indoc;
use integration_tests::*;
use serde_json::{Value, json};

#[tokio::test]
async fn prompt_is_answered_in_managed_shape() {
    let vendor = MockVendor::start("Four.").await;

    let server = TestServer::builder()
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    server.subscribe("u1", "pro");

    let response = server
        .client
        .post("/api/ai/call")
        .as_user("u1")
        .json(&json!({ "provider": "openai", "prompt": "2 + 2?" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "success": true,
      "data": {
        "content": "Four.",
        "usage": {
          "prompt_tokens": 5,
          "completion_tokens": 3,
          "total_tokens": 8
        }
      },
      "tokensUsed": 8
    }
    "#);
}

#[tokio::test]
async fn per_minute_window() {
    let vendor = MockVendor::start("Yes.").await;

    let server = TestServer::builder()
        .config(indoc! {r#"
            [plans.starter]
            providers = ["openai"]
            requests_per_day = 50
            requests_per_minute = 1
        "#})
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    server.subscribe("u1", "starter");

    let call = json!({ "provider": "openai", "prompt": "Ready?" });

    let first = server
        .client
        .post("/api/ai/call")
        .as_user("u1")
        .json(&call)
        .send()
        .await
        .unwrap();

    assert_eq!(first.status(), 200);

    let second = server
        .client
        .post("/api/ai/call")
        .as_user("u1")
        .json(&call)
        .send()
        .await
        .unwrap();

    assert_eq!(second.status(), 429);

    let body: Value = second.json().await.unwrap();

    assert_eq!(body["success"], false);

    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Rate limit exceeded. Please wait 1 minute(s)."), "{error}");

    assert_eq!(vendor.hits(), 1);
}

#[tokio::test]
async fn unknown_provider() {
    let server = TestServer::start_default().await;

    let response = server
        .client
        .post("/api/ai/call")
        .as_user("u1")
        .json(&json!({ "provider": "hal9000", "prompt": "Open the pod bay doors" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "success": false,
      "error": "Unsupported provider: hal9000"
    }
    "#);
}

#[tokio::test]
async fn prompt_or_messages_required() {
    let server = TestServer::start_default().await;

    let response = server
        .client
        .post("/api/ai/call")
        .as_user("u1")
        .json(&json!({ "provider": "gemini" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Validation error: prompt or messages is required");
}
