//! Account endpoints: signup, login/logout, profile settings, theme.

use crate::http::AppState;
use crate::sessions::{expired_session_cookie, session_cookie, session_token};
use crate::store::{StoreError, UserView};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub login_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThemeRequest {
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    "dark".to_string()
}

pub(crate) fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(e: StoreError, fallback_message: &str) -> (StatusCode, Json<serde_json::Value>) {
    let status = store_error_status(&e);
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("[accounts] {}", e);
        fallback_message.to_string()
    } else {
        e.to_string()
    };
    (status, Json(json!({ "success": false, "message": message })))
}

fn not_logged_in() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Not logged in" })))
}

// POST /signup
pub async fn signup(State(app): State<AppState>, Form(form): Form<SignupForm>) -> (StatusCode, Json<serde_json::Value>) {
    match app.accounts.signup(&form.username, &form.email, &form.password).await {
        Ok(_) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "message": "Account created successfully. Please log in." })),
        ),
        Err(e) => failure(e, "An error occurred while creating your account. Please try again."),
    }
}

// POST /login
pub async fn login(State(app): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match app.accounts.authenticate(&form.login_id, &form.password).await {
        Ok(Some(user)) => {
            let token = app.sessions.create(&user.username);
            info!("[accounts] user {} logged in", user.username);
            (
                [(header::SET_COOKIE, session_cookie(&token))],
                Json(json!({
                    "success": true,
                    "message": "You were successfully logged in",
                    "token": token,
                })),
            )
                .into_response()
        }
        Ok(None) => {
            warn!("[accounts] login unsuccessful for {}", form.login_id);
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "success": false,
                    "message": "Login Unsuccessful. Please check username/email and password",
                })),
            )
                .into_response()
        }
        Err(e) => failure(e, "An error occurred during login.").into_response(),
    }
}

// POST /logout
pub async fn logout(State(app): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        app.sessions.revoke(&token);
    }
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(json!({ "success": true, "message": "You were successfully logged out" })),
    )
        .into_response()
}

// GET /me
pub async fn me(State(app): State<AppState>, headers: HeaderMap) -> Result<Json<UserView>, (StatusCode, Json<serde_json::Value>)> {
    app.current_user(&headers)
        .map(|user| Json(UserView::from(&user)))
        .ok_or_else(not_logged_in)
}

// POST /settings
pub async fn update_settings(
    State(app): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SettingsForm>,
) -> (StatusCode, Json<serde_json::Value>) {
    let _owners = app.owner_lock.write().await;
    let Some(user) = app.current_user(&headers) else {
        return not_logged_in();
    };

    let updated = match app
        .accounts
        .update_settings(&user.username, &form.username, &form.email, form.password.as_deref())
        .await
    {
        Ok(updated) => updated,
        Err(e) => return failure(e, "An error occurred while updating your settings."),
    };

    // devices must follow the email, or the account change is undone
    if let Err(e) = app.devices.rekey_owner(&user.email, &updated.email) {
        if let Err(restore_err) = app.accounts.restore(&user) {
            error!("[accounts] could not restore {} after failed rekey: {}", user.username, restore_err);
        }
        return failure(e, "An error occurred while updating your settings.");
    }
    app.sessions.rename(&user.username, &updated.username);

    if let Some(theme) = form.theme.as_deref().filter(|t| !t.is_empty()) {
        if let Err(e) = app.accounts.update_theme(&updated.username, theme) {
            return failure(e, "An error occurred while updating your settings.");
        }
    }

    info!("[accounts] settings updated for {}", updated.username);
    (StatusCode::OK, Json(json!({ "success": true, "message": "Settings updated successfully." })))
}

// POST /update_theme
pub async fn update_theme(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ThemeRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(user) = app.current_user(&headers) else {
        return not_logged_in();
    };

    match app.accounts.update_theme(&user.username, &req.theme) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Err(e) => failure(e, "An error occurred while saving the theme."),
    }
}
