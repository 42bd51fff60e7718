use indoc::indoc;
use integration_tests::*;
use serde_json::Value;

#[tokio::test]
async fn auth_routes_have_their_own_budget() {
    let server = TestServer::builder()
        .config(indoc! {r#"
            [server.rate_limits.auth]
            limit = 2
            interval = "60s"
        "#})
        .build()
        .await;

    for _ in 0..2 {
        let response = server
            .client
            .post("/api/auth/session")
            .as_user("u1")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    let response = server
        .client
        .post("/api/auth/session")
        .as_user("u1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 429);

    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after >= 1);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": "Too many requests",
      "message": "Too many authentication attempts, please try again later."
    }
    "#);

    // Other scopes still have budget.
    let response = server
        .client
        .get("/api/keys/managed")
        .as_user("u1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn global_budget_covers_every_api_route() {
    let server = TestServer::builder()
        .config(indoc! {r#"
            [server.rate_limits.global]
            limit = 3
            interval = "60s"
        "#})
        .build()
        .await;

    for _ in 0..3 {
        let response = server.client.get("/api/keys/managed").as_user("u1").send().await.unwrap();
        assert_eq!(response.status(), 403);
    }

    let response = server.client.post("/api/auth/session").as_user("u1").send().await.unwrap();
    assert_eq!(response.status(), 429);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Too many requests, please try again later.");

    // Outside of /api nothing is limited.
    for _ in 0..5 {
        let response = server.client.get("/health").send().await.unwrap();
        assert_eq!(response.status(), 200);
    }
}

#[tokio::test]
async fn limits_can_be_disabled() {
    let server = TestServer::builder()
        .config(indoc! {r#"
            [server.rate_limits]
            enabled = false

            [server.rate_limits.auth]
            limit = 1
            interval = "60s"
        "#})
        .build()
        .await;

    for _ in 0..3 {
        let response = server
            .client
            .post("/api/auth/session")
            .as_user("u1")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }
}
