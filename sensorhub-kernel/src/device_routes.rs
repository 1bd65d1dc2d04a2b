//! Device endpoints. Answers are always `{success, message|devices}` with
//! HTTP 200, except `/get_thresholds` which 404s on an unknown email.

use crate::http::AppState;
use crate::store::{DeviceView, LimitsUpdate, StoreError, ThresholdProfile};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct AddDeviceForm {
    pub device_name: String,
    pub device_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ModifyDeviceForm {
    pub device_id: String,
    #[serde(default)]
    pub light_limit: Option<String>,
    #[serde(default)]
    pub humidity_limit: Option<String>,
    #[serde(default)]
    pub temperature_limit: Option<String>,
    #[serde(default)]
    pub smoke_limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveDeviceForm {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub email: Option<String>,
}

fn reply(success: bool, message: impl Into<String>) -> Json<Value> {
    Json(json!({ "success": success, "message": message.into() }))
}

fn please_log_in() -> Json<Value> {
    reply(false, "Please log in first.")
}

fn store_failure(e: StoreError) -> Json<Value> {
    if matches!(e, StoreError::Io(_) | StoreError::Serialization(_) | StoreError::Hash(_)) {
        error!("[devices] {}", e);
    }
    reply(false, e.to_string())
}

/// Empty fields are skipped; anything else must be an integer
fn parse_limit(field: &str, raw: Option<&str>) -> Result<Option<i64>, String> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("{field} must be an integer, got '{v}'")),
    }
}

impl ModifyDeviceForm {
    fn limits(&self) -> Result<LimitsUpdate, String> {
        Ok(LimitsUpdate {
            light_limit: parse_limit("light_limit", self.light_limit.as_deref())?,
            humidity_limit: parse_limit("humidity_limit", self.humidity_limit.as_deref())?,
            temperature_limit: parse_limit("temperature_limit", self.temperature_limit.as_deref())?,
            smoke_limit: parse_limit("smoke_limit", self.smoke_limit.as_deref())?,
        })
    }
}

// POST /add_device
pub async fn add_device(State(app): State<AppState>, headers: HeaderMap, Form(form): Form<AddDeviceForm>) -> Json<Value> {
    let _owners = app.owner_lock.read().await;
    let Some(user) = app.current_user(&headers) else {
        return please_log_in();
    };

    match app.devices.add(&user.email, &form.device_name, &form.device_type) {
        Ok(_) => reply(true, "Device added successfully!"),
        Err(e) => store_failure(e),
    }
}

// POST /modify_device
pub async fn modify_device(State(app): State<AppState>, headers: HeaderMap, Form(form): Form<ModifyDeviceForm>) -> Json<Value> {
    let _owners = app.owner_lock.read().await;
    let Some(user) = app.current_user(&headers) else {
        return please_log_in();
    };

    let limits = match form.limits() {
        Ok(limits) => limits,
        Err(message) => return reply(false, message),
    };

    match app.devices.modify_limits(&user.email, &form.device_id, &limits) {
        Ok(device) => {
            info!("[devices] limits of {} updated", device.id);
            reply(true, "Device modified successfully!")
        }
        Err(e) => store_failure(e),
    }
}

// POST /remove_device
pub async fn remove_device(State(app): State<AppState>, headers: HeaderMap, Form(form): Form<RemoveDeviceForm>) -> Json<Value> {
    let _owners = app.owner_lock.read().await;
    let Some(user) = app.current_user(&headers) else {
        return please_log_in();
    };

    match app.devices.remove(&user.email, &form.device_id) {
        Ok(()) => reply(true, "Device removed successfully!"),
        Err(e) => store_failure(e),
    }
}

// GET /get_devices
pub async fn get_devices(State(app): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let _owners = app.owner_lock.read().await;
    let Some(user) = app.current_user(&headers) else {
        return please_log_in();
    };

    let devices: Vec<DeviceView> = app.devices.list_for_user(&user.email).iter().map(DeviceView::from).collect();
    Json(json!({ "success": true, "devices": devices }))
}

// GET /get_thresholds?email=
pub async fn get_thresholds(
    State(app): State<AppState>,
    Query(query): Query<ThresholdQuery>,
) -> Result<Json<ThresholdProfile>, (StatusCode, Json<Value>)> {
    query
        .email
        .as_deref()
        .and_then(|email| app.devices.thresholds_for_email(email))
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({ "error": "Device not found" }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("light_limit", None), Ok(None));
        assert_eq!(parse_limit("light_limit", Some("")), Ok(None));
        assert_eq!(parse_limit("light_limit", Some(" 42 ")), Ok(Some(42)));
        assert!(parse_limit("light_limit", Some("4.5")).unwrap_err().contains("light_limit"));
    }

    #[tokio::test]
    async fn test_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app_state("http://127.0.0.1:9", &dir);

        for request in [
            post_form("/add_device", "device_name=Kitchen&device_type=ESP32", None),
            post_form("/modify_device", "device_id=x", None),
            post_form("/remove_device", "device_id=x", None),
            get("/get_devices", None),
        ] {
            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                json_body(response).await,
                json!({ "success": false, "message": "Please log in first." })
            );
        }
    }

    #[tokio::test]
    async fn test_device_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app_state("http://127.0.0.1:9", &dir);
        let token = login_as(&app, "maya", "maya@example.com").await;

        let response = send(&app, post_form("/add_device", "device_name=Kitchen&device_type=ESP32", Some(&token))).await;
        assert_eq!(json_body(response).await["message"], "Device added successfully!");

        let listed = json_body(send(&app, get("/get_devices", Some(&token))).await).await;
        assert_eq!(listed["success"], true);
        assert_eq!(listed["devices"][0]["name"], "Kitchen");
        assert_eq!(listed["devices"][0]["type"], "ESP32");
        let id = listed["devices"][0]["id"].as_str().unwrap().to_string();

        let form = format!("device_id={id}&light_limit=&humidity_limit=70&temperature_limit=28&smoke_limit=");
        let response = send(&app, post_form("/modify_device", &form, Some(&token))).await;
        assert_eq!(json_body(response).await["message"], "Device modified successfully!");

        let thresholds = json_body(send(&app, get("/get_thresholds?email=maya%40example.com", None)).await).await;
        assert_eq!(thresholds, json!({ "light": null, "humidity": 70, "temperature": 28, "smoke": null }));

        let form = format!("device_id={id}&smoke_limit=abc");
        let response = json_body(send(&app, post_form("/modify_device", &form, Some(&token))).await).await;
        assert_eq!(response["success"], false);

        let response = send(&app, post_form("/remove_device", &format!("device_id={id}"), Some(&token))).await;
        assert_eq!(json_body(response).await["message"], "Device removed successfully!");

        let response = send(&app, post_form("/remove_device", &format!("device_id={id}"), Some(&token))).await;
        assert_eq!(json_body(response).await, json!({ "success": false, "message": "Device not found." }));
    }

    #[tokio::test]
    async fn test_other_users_device_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app_state("http://127.0.0.1:9", &dir);
        let theirs = app.devices.add("leo@example.com", "Garage", "ESP32").unwrap();
        let token = login_as(&app, "maya", "maya@example.com").await;

        let form = format!("device_id={}&temperature_limit=10", theirs.id);
        let response = json_body(send(&app, post_form("/modify_device", &form, Some(&token))).await).await;
        assert_eq!(response["message"], "Device not found.");
    }

    #[tokio::test]
    async fn test_thresholds_unknown_email_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app_state("http://127.0.0.1:9", &dir);

        for uri in ["/get_thresholds?email=nobody%40example.com", "/get_thresholds"] {
            let response = send(&app, get(uri, None)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(json_body(response).await, json!({ "error": "Device not found" }));
        }
    }
}
