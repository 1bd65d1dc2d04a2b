/**
 * SENSORHUB HTTP API - Main server of the kernel
 *
 * ROLE :
 * Exposes everything the dashboard talks to: buzzer control, live feed
 * upgrade, accounts, devices and thresholds, health.
 *
 * HOW IT WORKS :
 * - Axum router sharing one `AppState` built in main (no globals)
 * - JSON answers; form bodies where the dashboard posts HTML forms
 * - Account and device handlers live in account_routes / device_routes
 *
 * ROUTES :
 * - /health, /system/health, /api/latest
 * - POST /activate_buzzer, POST /deactivate_buzzer
 * - GET /ws (WebSocket, see realtime.rs)
 * - /signup, /login, /logout, /me, /settings, /update_theme
 * - /add_device, /modify_device, /remove_device, /get_devices, /get_thresholds
 */

use crate::account_routes;
use crate::connections::ConnectionRegistry;
use crate::device_routes;
use crate::gateway::{ActuatorCommand, DeviceGateway};
use crate::health::{HealthTracker, KernelHealth};
use crate::models::SensorData;
use crate::realtime;
use crate::relay::SharedRelay;
use crate::sessions::{session_token, SessionStore};
use crate::store::{AccountStore, DeviceStore, User};
use axum::http::{HeaderMap, StatusCode};
use axum::{extract::State, routing::{get, post}, Json, Router};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub relay: SharedRelay,
    pub gateway: DeviceGateway,
    pub connections: Arc<ConnectionRegistry>,
    pub health_tracker: HealthTracker,
    pub accounts: Arc<AccountStore>,
    pub devices: Arc<DeviceStore>,
    pub sessions: SessionStore,
    /// Held for writing while an account changes email, for reading by
    /// device handlers, so no device lands under a stale owner
    pub owner_lock: Arc<tokio::sync::RwLock<()>>,
}

impl AppState {
    /// User behind the request's session, if any
    pub fn current_user(&self, headers: &HeaderMap) -> Option<User> {
        let token = session_token(headers)?;
        let username = self.sessions.resolve(&token)?;
        self.accounts.find_by_username(&username)
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/latest", get(get_latest))
        .route("/activate_buzzer", post(activate_buzzer))
        .route("/deactivate_buzzer", post(deactivate_buzzer))
        .route("/ws", get(realtime::ws_handler))
        .route("/signup", post(account_routes::signup))
        .route("/login", post(account_routes::login))
        .route("/logout", post(account_routes::logout))
        .route("/me", get(account_routes::me))
        .route("/settings", post(account_routes::update_settings))
        .route("/update_theme", post(account_routes::update_theme))
        .route("/add_device", post(device_routes::add_device))
        .route("/modify_device", post(device_routes::modify_device))
        .route("/remove_device", post(device_routes::remove_device))
        .route("/get_devices", get(device_routes::get_devices))
        .route("/get_thresholds", get(device_routes::get_thresholds))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.connections))
}

// GET /api/latest (last published reading)
async fn get_latest(State(app): State<AppState>) -> Result<Json<SensorData>, StatusCode> {
    app.relay
        .latest()
        .map(|r| Json(r.to_wire()))
        .ok_or(StatusCode::NOT_FOUND)
}

// POST /activate_buzzer
async fn activate_buzzer(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    actuate(&app.gateway, ActuatorCommand::Activate).await
}

// POST /deactivate_buzzer
async fn deactivate_buzzer(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    actuate(&app.gateway, ActuatorCommand::Deactivate).await
}

async fn actuate(gateway: &DeviceGateway, command: ActuatorCommand) -> (StatusCode, Json<serde_json::Value>) {
    let verb = command.verb();
    match gateway.send_actuator_command(command).await {
        Ok(_) => {
            info!("[http] buzzer {}d", verb);
            (StatusCode::OK, Json(serde_json::json!({ "status": format!("Buzzer {verb}d") })))
        }
        Err(e) if e.is_transport() => {
            error!("[http] buzzer {} error: {}", verb, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": format!("Error: {e}") })),
            )
        }
        Err(e) => {
            warn!("[http] buzzer {} refused: {}", verb, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": format!("Failed to {verb} buzzer") })),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::gateway::test_gateway;
    use crate::relay::TelemetryRelay;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use tower::ServiceExt;

    pub fn test_app_state(base_url: &str, dir: &tempfile::TempDir) -> AppState {
        let gateway = test_gateway(base_url, 2000);
        let health_tracker = HealthTracker::new();
        AppState {
            relay: Arc::new(TelemetryRelay::new(gateway.clone(), 16, health_tracker.clone())),
            gateway,
            connections: Arc::new(ConnectionRegistry::default()),
            health_tracker,
            accounts: Arc::new(AccountStore::open(dir.path().join("users.json"), crate::store::accounts::TEST_COST).unwrap()),
            devices: Arc::new(DeviceStore::open(dir.path().join("devices.json")).unwrap()),
            sessions: SessionStore::new(),
            owner_lock: Arc::default(),
        }
    }

    /// Serves the full router on a random local port
    pub async fn serve(app: &AppState) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(app.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (addr, server)
    }

    pub async fn send(app: &AppState, request: Request<Body>) -> Response {
        build_router(app.clone()).oneshot(request).await.unwrap()
    }

    pub fn post_form(uri: &str, body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(token) = token {
            builder = builder.header(crate::sessions::SESSION_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(crate::sessions::SESSION_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    pub async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Signs up and logs in, returns the session token
    pub async fn login_as(app: &AppState, username: &str, email: &str) -> String {
        app.accounts.signup(username, email, "pw").await.unwrap();
        let response = send(app, post_form("/login", &format!("login_id={username}&password=pw"), None)).await;
        json_body(response).await["token"].as_str().unwrap().to_string()
    }
}
