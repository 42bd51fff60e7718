use axum::Json;
use jiff::Timestamp;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct Health {
    status: &'static str,
    timestamp: Timestamp,
    version: &'static str,
}

/// Liveness probe, served without authentication.
pub(crate) async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
