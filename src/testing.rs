//! In-process HTTP endpoint that records what destinations send it.

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    Json, Router,
};
use serde_json::Value;
use tokio::sync::Barrier;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone)]
struct Shared {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
    gate: Option<Arc<Barrier>>,
}

pub struct FakeEndpoint {
    base_url: String,
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeEndpoint {
    /// Answer every request with `status` and the JSON `reply`
    pub async fn start(status: StatusCode, reply: Value) -> Self {
        Self::serve(status, reply, None).await
    }

    /// Like `start`, but each request is held until `gate` releases, so
    /// endpoints sharing a gate only answer once all of them were reached
    pub async fn start_gated(status: StatusCode, reply: Value, gate: Arc<Barrier>) -> Self {
        Self::serve(status, reply, Some(gate)).await
    }

    async fn serve(status: StatusCode, reply: Value, gate: Option<Arc<Barrier>>) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shared = Shared {
            status,
            reply,
            seen: Arc::clone(&seen),
            gate,
        };

        let app = Router::new().fallback(record).with_state(shared);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            seen,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A URL nothing listens on
    pub fn unreachable_url(path: &str) -> String {
        format!("http://127.0.0.1:1{}", path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn record(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    shared.seen.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body,
    });
    if let Some(gate) = &shared.gate {
        gate.wait().await;
    }
    (shared.status, Json(shared.reply.clone()))
}
