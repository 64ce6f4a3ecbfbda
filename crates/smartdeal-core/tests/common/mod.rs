//! In-process mock of the SmartDeal auth API for integration tests.
#![allow(dead_code)] // Not every test file uses every helper

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use smartdeal_core::{ApiClient, SessionManager, TokenStore};

/// Logins for emails with this prefix are answered after `SLOW_DELAY`
pub const SLOW_PREFIX: &str = "slow";
pub const SLOW_DELAY: Duration = Duration::from_millis(300);

/// Tokens are issued as `tok123`, `tok124`, ...
const FIRST_TOKEN: usize = 123;

#[derive(Debug, Clone)]
struct Account {
    id: i64,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct CredentialBody {
    email: String,
    password: String,
}

pub struct BackendState {
    accounts: Mutex<Vec<Account>>,
    tokens: Mutex<HashMap<String, i64>>,
    next_id: AtomicI64,
    next_token: AtomicUsize,
    pub me_calls: AtomicUsize,
}

impl BackendState {
    fn new() -> Self {
        let state = Self {
            accounts: Mutex::new(Vec::new()),
            tokens: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            next_token: AtomicUsize::new(FIRST_TOKEN),
            me_calls: AtomicUsize::new(0),
        };
        state.add_account("a@b.com", "secret");
        state.add_account("slow@b.com", "secret");
        state
    }

    fn add_account(&self, email: &str, password: &str) -> Account {
        let account = Account {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.accounts.lock().unwrap().push(account.clone());
        account
    }

    fn issue_token(&self, user_id: i64) -> String {
        let token = format!("tok{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        self.tokens.lock().unwrap().insert(token.clone(), user_id);
        token
    }

    fn account_by_token(&self, token: &str) -> Option<Account> {
        let user_id = *self.tokens.lock().unwrap().get(token)?;
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == user_id)
            .cloned()
    }

    fn token_reply(&self, account: &Account) -> Response {
        let token = self.issue_token(account.id);
        Json(json!({
            "token": token,
            "user": {"id": account.id, "email": account.email},
        }))
        .into_response()
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<CredentialBody>) -> Response {
    if body.email.starts_with(SLOW_PREFIX) {
        tokio::time::sleep(SLOW_DELAY).await;
    }

    let account = state
        .accounts
        .lock()
        .unwrap()
        .iter()
        .find(|a| a.email == body.email && a.password == body.password)
        .cloned();

    match account {
        Some(account) => state.token_reply(&account),
        None => detail(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    }
}

async fn register(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<CredentialBody>,
) -> Response {
    if body.password.len() < 6 {
        return detail(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters",
        );
    }

    let exists = state
        .accounts
        .lock()
        .unwrap()
        .iter()
        .any(|a| a.email == body.email);
    if exists {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }

    let account = state.add_account(&body.email, &body.password);
    state.token_reply(&account)
}

async fn me(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.me_calls.fetch_add(1, Ordering::SeqCst);

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token.and_then(|t| state.account_by_token(t)) {
        Some(account) => Json(json!({
            "id": account.id,
            "email": account.email,
            "created_at": "2024-05-01 12:00:00",
        }))
        .into_response(),
        None => detail(StatusCode::UNAUTHORIZED, "Invalid or expired token"),
    }
}

pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::new());
        let router = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/auth/me", get(me))
            .with_state(Arc::clone(&state));

        let base_url = serve(router).await;
        Self { base_url, state }
    }

    pub fn session(&self, store: Arc<dyn TokenStore>) -> SessionManager {
        session_for(&self.base_url, store)
    }

    pub fn me_calls(&self) -> usize {
        self.state.me_calls.load(Ordering::SeqCst)
    }
}

/// Serve `router` on an ephemeral port, returning its `/api` base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api", addr)
}

/// A base URL on a port nobody is listening on
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

pub fn session_for(base_url: &str, store: Arc<dyn TokenStore>) -> SessionManager {
    let api = ApiClient::new(base_url, Duration::from_secs(5)).unwrap();
    SessionManager::new(api, store)
}
