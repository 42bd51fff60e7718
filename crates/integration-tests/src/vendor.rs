//! An OpenAI-compatible vendor running in the test process.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::{Value, json};

#[derive(Clone)]
struct VendorState {
    hits: Arc<AtomicUsize>,
    last_authorization: Arc<Mutex<Option<String>>>,
    status: StatusCode,
    reply: Value,
}

pub struct MockVendor {
    base_url: String,
    hits: Arc<AtomicUsize>,
    last_authorization: Arc<Mutex<Option<String>>>,
}

impl MockVendor {
    /// Answers every chat completion with `reply`.
    pub async fn start(reply: &str) -> Self {
        let body = json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": reply },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8 }
        });

        Self::with_response(StatusCode::OK, body).await
    }

    /// Answers every chat completion with a fixed status and body.
    pub async fn with_response(status: StatusCode, reply: Value) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let last_authorization = Arc::new(Mutex::new(None));

        let state = VendorState {
            hits: hits.clone(),
            last_authorization: last_authorization.clone(),
            status,
            reply,
        };

        let app = Router::new()
            .route("/chat/completions", post(completions))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{address}"),
            hits,
            last_authorization,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    /// Completed chat completion requests so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// The `authorization` header of the most recent request.
    pub fn last_authorization(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }
}

async fn completions(
    State(state): State<VendorState>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    *state.last_authorization.lock().unwrap() = authorization;

    (state.status, Json(state.reply))
}
