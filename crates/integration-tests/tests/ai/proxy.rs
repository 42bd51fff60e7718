use indoc::indoc;
use integration_tests::*;
use serde_json::{Value, json};

fn completion_request() -> Value {
    json!({
        "model": "gpt-4o-mini",
        "messages": [{ "role": "user", "content": "Ping" }]
    })
}

#[tokio::test]
async fn legacy_proxy_passes_the_vendor_body_through() {
    let vendor = MockVendor::start("Pong.").await;

    let server = TestServer::builder()
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    let response = server
        .client
        .post("/openaiProxy")
        .as_user("u1")
        .json(&completion_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();

    assert_eq!(body["id"], "chatcmpl-test");
    assert_eq!(body["choices"][0]["message"]["content"], "Pong.");
    assert_eq!(vendor.last_authorization().as_deref(), Some("Bearer sk-server"));
}

#[tokio::test]
async fn legacy_proxy_ignores_plans_and_quotas() {
    let vendor = MockVendor::start("Pong.").await;

    let server = TestServer::builder()
        .config(indoc! {r#"
            [plans.free]
            providers = ["gemini"]
            requests_per_day = 0
            requests_per_minute = 1
        "#})
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    for _ in 0..3 {
        let response = server
            .client
            .post("/openaiProxy")
            .as_user("u1")
            .json(&completion_request())
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    assert_eq!(vendor.hits(), 3);
}

#[tokio::test]
async fn legacy_proxy_requires_credentials() {
    let vendor = MockVendor::start("Pong.").await;

    let server = TestServer::builder()
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    let response = server
        .client
        .post("/openaiProxy")
        .json(&completion_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(vendor.hits(), 0);
}

#[tokio::test]
async fn provider_proxy_checks_entitlement() {
    let vendor = MockVendor::start("Pong.").await;

    let server = TestServer::builder()
        .vendor("openai", &vendor, "sk-server")
        .build()
        .await;

    let response = server
        .client
        .post("/api/ai/proxy/openai")
        .as_user("u1")
        .json(&completion_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["allowedProviders"], json!(["gemini"]));

    server.subscribe("u1", "pro");

    let response = server
        .client
        .post("/api/ai/proxy/openai")
        .as_user("u1")
        .json(&completion_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(vendor.hits(), 1);
}
