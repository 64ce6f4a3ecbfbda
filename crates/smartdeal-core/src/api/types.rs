//! Wire types for the `/auth/*` endpoints.

use serde::{Deserialize, Serialize};

use crate::auth::User;

/// Request body for `/auth/login` and `/auth/register`.
#[derive(Debug, Serialize)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Error payload returned by the backend on non-OK responses.
///
/// `detail` is usually a string, but request validation failures return a
/// list of field errors instead.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Parse an error body, tolerating empty or non-JSON responses.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// The server-provided message, if it sent a usable one.
    pub fn message(&self) -> Option<&str> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}
