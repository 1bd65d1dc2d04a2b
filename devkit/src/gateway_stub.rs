/*!
ESP32 gateway stub for development without hardware

Serves the same routes as the sensor board firmware on a random local port.
Every request is recorded, and the answer of each route can be scripted
(healthy JSON, HTTP error, garbage body, artificial latency).
*/

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use anyhow::Result;

use crate::fixtures::esp32_payload;

/// Scripted answer for a stub route
#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// HTTP 200 with the given JSON body
    Json(Value),
    /// Bare status code, empty body
    Status(u16),
    /// HTTP 200 with a raw (possibly invalid) body
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
}

struct StubInner {
    data: Mutex<StubBehavior>,
    activate: Mutex<StubBehavior>,
    deactivate: Mutex<StubBehavior>,
    latency: Mutex<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Stub HTTP server standing in for the sensor board
pub struct GatewayStub {
    addr: SocketAddr,
    inner: Arc<StubInner>,
    server: JoinHandle<()>,
}

impl GatewayStub {
    /// Starts the stub on 127.0.0.1 with a random port.
    /// `/data` answers a nominal reading, both buzzer routes answer 200.
    pub async fn start() -> Result<Self> {
        let inner = Arc::new(StubInner {
            data: Mutex::new(StubBehavior::Json(esp32_payload(25.0, 50.0, 80.0, 10.0))),
            activate: Mutex::new(StubBehavior::Status(200)),
            deactivate: Mutex::new(StubBehavior::Status(200)),
            latency: Mutex::new(Duration::ZERO),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/data", get(data_route))
            .route("/buzzer", post(activate_route))
            .route("/buzzer/deactivate", post(deactivate_route))
            .with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[STUB] gateway stub stopped: {}", e);
            }
        });

        log::info!("🔌 [STUB] ESP32 gateway listening on http://{}", addr);
        Ok(Self { addr, inner, server })
    }

    /// Base URL to hand to the kernel's device config
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_data(&self, behavior: StubBehavior) {
        *self.inner.data.lock().unwrap() = behavior;
    }

    pub fn set_activate(&self, behavior: StubBehavior) {
        *self.inner.activate.lock().unwrap() = behavior;
    }

    pub fn set_deactivate(&self, behavior: StubBehavior) {
        *self.inner.deactivate.lock().unwrap() = behavior;
    }

    /// Delay applied before every answer
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock().unwrap() = latency;
    }

    /// All requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    /// Number of requests received on a path
    pub fn count(&self, path: &str) -> usize {
        self.inner
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn clear(&self) {
        self.inner.requests.lock().unwrap().clear();
    }
}

impl Drop for GatewayStub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn data_route(State(inner): State<Arc<StubInner>>, method: Method, uri: Uri) -> Response {
    let behavior = inner.data.lock().unwrap().clone();
    answer(&inner, method, uri, behavior).await
}

async fn activate_route(State(inner): State<Arc<StubInner>>, method: Method, uri: Uri) -> Response {
    let behavior = inner.activate.lock().unwrap().clone();
    answer(&inner, method, uri, behavior).await
}

async fn deactivate_route(State(inner): State<Arc<StubInner>>, method: Method, uri: Uri) -> Response {
    let behavior = inner.deactivate.lock().unwrap().clone();
    answer(&inner, method, uri, behavior).await
}

async fn answer(inner: &StubInner, method: Method, uri: Uri, behavior: StubBehavior) -> Response {
    inner.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
    });
    log::info!("📥 [STUB] {} {}", method, uri.path());

    let latency = *inner.latency.lock().unwrap();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }

    match behavior {
        StubBehavior::Json(body) => (StatusCode::OK, Json(body)).into_response(),
        StubBehavior::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        StubBehavior::Raw(body) => (StatusCode::OK, body).into_response(),
    }
}
