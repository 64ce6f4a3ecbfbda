use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account record returned by `/auth/me`, `/auth/login` and `/auth/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub email: String,
}

/// Session status derived from `SessionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionStatus {
    Unauthenticated,
    Verifying,
    Authenticated,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Unauthenticated => "Signed out",
            SessionStatus::Verifying => "Verifying",
            SessionStatus::Authenticated => "Signed in",
        }
    }
}

/// Authentication state for one application instance.
///
/// `user` is only ever set together with the token it was verified for.
#[derive(Clone, Default, PartialEq)]
pub struct SessionState {
    pub token: Option<String>,
    pub user: Option<User>,
    /// True only while the startup token check is in flight
    pub loading: bool,
    /// When `user` was established
    pub authenticated_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match (&self.token, &self.user) {
            (Some(_), Some(_)) if !self.loading => SessionStatus::Authenticated,
            (Some(_), None) if self.loading => SessionStatus::Verifying,
            _ => SessionStatus::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub(crate) fn authenticate(&mut self, token: String, user: User) {
        self.token = Some(token);
        self.user = Some(user);
        self.loading = false;
        self.authenticated_at = Some(Utc::now());
    }

    /// Drop token and user. Returns whether anything changed.
    pub(crate) fn clear(&mut self) -> bool {
        let changed = self.token.is_some() || self.user.is_some();
        self.token = None;
        self.user = None;
        self.authenticated_at = None;
        changed
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the bearer token itself
        f.debug_struct("SessionState")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("loading", &self.loading)
            .field("authenticated_at", &self.authenticated_at)
            .finish()
    }
}
