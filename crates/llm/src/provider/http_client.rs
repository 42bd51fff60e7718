use std::time::Duration;

use axum::http;
use reqwest::Client;

/// Builder shared by every vendor client.
///
/// No request timeout is set here: the call policy bounds each attempt. Idle pooled
/// connections are dropped after a few seconds so DNS changes of vendor endpoints are
/// picked up.
pub(crate) fn default_http_client_builder(mut headers: http::HeaderMap) -> reqwest::ClientBuilder {
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}
