//! In-memory login sessions: opaque token -> username.

use axum::http::{header, HeaderMap};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sensorhub_session";
pub const SESSION_HEADER: &str = "x-session-token";

#[derive(Clone)]
pub struct SessionStore {
    tokens: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { tokens: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.lock().insert(token.clone(), username.to_string());
        token
    }

    pub fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.lock().get(token).cloned()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.lock().remove(token).is_some()
    }

    /// Follows a username change on every open session
    pub fn rename(&self, old: &str, new: &str) {
        for username in self.tokens.lock().values_mut().filter(|u| u.as_str() == old) {
            *username = new.to_string();
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Token from the `x-session-token` header, else from the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0")
}
