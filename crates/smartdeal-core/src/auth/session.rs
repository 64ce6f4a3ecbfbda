//! Session manager: the single owner of "who is signed in".
//!
//! One `SessionManager` is constructed per application instance and handed to
//! whatever needs it. State changes are published on a `watch` channel so UI
//! code can react to them without polling.
//!
//! Overlapping credential operations are resolved by generation: every change
//! to the session (a successful login, register or verify, and every logout)
//! advances the generation. A response is only applied if the generation is
//! unchanged since its request was sent, so a late response never overwrites
//! a newer session. Requests that fail change nothing and supersede nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::client::{LOGIN_PATH, REGISTER_PATH};
use crate::api::{current_auth_header, ApiClient, ApiError, CredentialReply};
use crate::config::Config;

use super::state::{SessionState, SessionStatus, User};
use super::store::{StoreError, TokenStore};

/// Shown when the request never reached the server
pub const NETWORK_ERROR: &str = "Network error";

/// Shown when a newer credential operation replaced this one
pub const SUPERSEDED_ERROR: &str = "Superseded by a newer request";

const MISSING_CREDENTIALS_ERROR: &str = "Email and password required";

/// Result of a login or registration attempt.
///
/// Expected failures (bad credentials, unreachable server) are reported here
/// rather than as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failure { error: String },
}

impl AuthOutcome {
    fn failure(error: impl Into<String>) -> Self {
        AuthOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AuthOutcome::Success => None,
            AuthOutcome::Failure { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CredentialAction {
    Login,
    Register,
}

impl CredentialAction {
    fn path(self) -> &'static str {
        match self {
            CredentialAction::Login => LOGIN_PATH,
            CredentialAction::Register => REGISTER_PATH,
        }
    }

    fn fallback_error(self) -> &'static str {
        match self {
            CredentialAction::Login => "Login failed",
            CredentialAction::Register => "Registration failed",
        }
    }

    fn name(self) -> &'static str {
        match self {
            CredentialAction::Login => "login",
            CredentialAction::Register => "register",
        }
    }
}

/// Clears the loading flag when verification ends, however it ends.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .send_if_modified(|state| std::mem::replace(&mut state.loading, false));
    }
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            api,
            store,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Build a manager with the configured API endpoint and token backend
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api = ApiClient::from_config(config)?;
        let store = config.token_store()?;
        Ok(Self::new(api, store))
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Receiver that observes every committed state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        Arc::clone(&self.store)
    }

    /// Authorization header built from the persisted token
    pub fn auth_header(&self) -> HeaderMap {
        current_auth_header(self.store.as_ref())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restore the persisted token, if any, and verify it with the backend.
    pub async fn initialize(&self) {
        let persisted = match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token");
                None
            }
        };

        let Some(token) = persisted else {
            debug!("No persisted token");
            self.state
                .send_if_modified(|state| std::mem::replace(&mut state.loading, false));
            return;
        };

        self.state.send_modify(|state| {
            state.token = Some(token.clone());
            state.user = None;
            state.authenticated_at = None;
            state.loading = true;
        });

        self.verify(&token).await;
    }

    /// Check `token` against `/auth/me`.
    ///
    /// Success keeps the token and sets the user. Any failure, including an
    /// unreachable server, clears the session and the persisted token.
    /// `loading` is false once this returns.
    pub async fn verify(&self, token: &str) {
        let generation = self.generation();
        let _loading = LoadingGuard { state: &self.state };

        match self.api.fetch_current_user(token).await {
            Ok(user) => {
                let user_id = user.id;
                let committed = self.commit(generation, |state| {
                    state.authenticate(token.to_string(), user);
                    Ok(())
                });
                if matches!(committed, Ok(true)) {
                    info!(user_id, "Session verified");
                } else {
                    debug!("Verification superseded");
                }
            }
            Err(e) => {
                if e.is_transport() {
                    warn!(error = %e, "Token verification request failed");
                } else {
                    debug!(error = %e, "Persisted token rejected");
                }
                self.discard(generation);
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, ApiError> {
        self.submit(CredentialAction::Login, email, password).await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<AuthOutcome, ApiError> {
        self.submit(CredentialAction::Register, email, password).await
    }

    /// Forget the session. Never fails; store errors are only logged.
    pub fn logout(&self) {
        let changed = self.state.send_if_modified(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to remove persisted token");
            }
            state.clear()
        });

        if changed {
            info!("Logged out");
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn submit(
        &self,
        action: CredentialAction,
        email: &str,
        password: &str,
    ) -> Result<AuthOutcome, ApiError> {
        if email.trim().is_empty() || password.is_empty() {
            return Ok(AuthOutcome::failure(MISSING_CREDENTIALS_ERROR));
        }

        let generation = self.generation();

        let reply = match self
            .api
            .submit_credentials(action.path(), email, password)
            .await
        {
            Ok(reply) => reply,
            Err(e) if e.is_transport() => {
                warn!(error = %e, action = action.name(), "Credential request failed");
                return Ok(AuthOutcome::failure(NETWORK_ERROR));
            }
            Err(e) => return Err(e),
        };

        match reply {
            CredentialReply::Rejected { status, detail } => {
                info!(status = %status, action = action.name(), "Credentials rejected");
                Ok(AuthOutcome::failure(
                    detail.unwrap_or_else(|| action.fallback_error().to_string()),
                ))
            }
            CredentialReply::Accepted(auth) => {
                let user_id = auth.user.id;
                let committed = self.commit(generation, |state| {
                    self.store.save(&auth.token)?;
                    state.authenticate(auth.token, auth.user);
                    Ok(())
                })?;

                if committed {
                    info!(user_id, action = action.name(), "Authenticated");
                    Ok(AuthOutcome::Success)
                } else {
                    debug!(action = action.name(), "Response superseded, discarding");
                    Ok(AuthOutcome::failure(SUPERSEDED_ERROR))
                }
            }
        }
    }

    /// Generation observed when a request is sent
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Apply `update` if nothing was committed since `generation` was read,
    /// advancing the generation when it succeeds.
    ///
    /// Runs under the state lock, so a logout cannot interleave between the
    /// generation check and the write. `update` must not mutate the state
    /// before its last fallible step.
    fn commit<F>(&self, generation: u64, update: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut SessionState) -> Result<(), StoreError>,
    {
        let mut result = Ok(false);
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            result = update(state).map(|()| true);
            if result.is_ok() {
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            result.is_ok()
        });
        result
    }

    /// Clear memory and the persisted token on behalf of `generation`.
    fn discard(&self, generation: u64) {
        let _ = self.commit(generation, |state| {
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to remove persisted token");
            }
            state.clear();
            Ok(())
        });
    }
}
