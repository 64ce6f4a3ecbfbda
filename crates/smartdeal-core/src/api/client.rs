//! API client for communicating with the SmartDeal REST API.
//!
//! `ApiClient` performs the raw `/auth/*` requests for the session manager.
//! `AuthorizedClient` is for everything else: it reads the persisted token on
//! every request, so it works without a handle on the in-memory session.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{TokenStore, User};
use crate::config::Config;

use super::types::{AuthResponse, Credentials, ErrorBody};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Exchange email/password for a token
pub const LOGIN_PATH: &str = "/auth/login";

/// Create an account and receive a token
pub const REGISTER_PATH: &str = "/auth/register";

/// Identity of the bearer token's owner
pub const ME_PATH: &str = "/auth/me";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay for rate limiting, doubled on each retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

/// Result of a login or registration request that reached the server.
#[derive(Debug)]
pub enum CredentialReply {
    /// 2xx with a well-formed token and user
    Accepted(AuthResponse),
    /// Non-OK status; `detail` is the server message if one was usable
    Rejected {
        status: StatusCode,
        detail: Option<String>,
    },
}

/// API client for the SmartDeal backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `http://host/api`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Ask the backend who owns `token`.
    pub async fn fetch_current_user(&self, token: &str) -> Result<User, ApiError> {
        let response = self
            .client
            .get(self.url(ME_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body = response.text().await?;

        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("user record: {}", e)))
    }

    /// POST `{email, password}` to a credential endpoint.
    ///
    /// Transport failures come back as `ApiError::NetworkError`; a 2xx whose
    /// body is not a token/user pair is `ApiError::InvalidResponse`.
    pub async fn submit_credentials(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<CredentialReply, ApiError> {
        let url = self.url(path);

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&Credentials { email, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(url = %url, status = %status, "Credentials rejected");
            let detail = ErrorBody::parse(&body).message().map(str::to_string);
            return Ok(CredentialReply::Rejected { status, detail });
        }

        let auth: AuthResponse = serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "{} from {}: {}",
                e,
                url,
                ApiError::truncate_body(&body)
            ))
        })?;

        Ok(CredentialReply::Accepted(auth))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Like `check_response`, but returns Ok(None) for rate limiting so the
    /// caller can back off and retry.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            Self::check_response(response).await.map(Some)
        }
    }
}

/// Build the `Authorization` header from the persisted token.
///
/// This reads the token store, not any in-memory session, so one-off callers
/// can attach credentials without holding a `SessionManager`. Returns an
/// empty map when no token is persisted or the store cannot be read.
pub fn current_auth_header(store: &dyn TokenStore) -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();

    let token = match store.load() {
        Ok(Some(token)) => token,
        Ok(None) => return headers,
        Err(e) => {
            warn!(error = %e, "Failed to read persisted token");
            return headers;
        }
    };

    match header::HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Err(_) => warn!("Persisted token is not a valid header value"),
    }

    headers
}

/// Client for authenticated API calls outside the session manager.
#[derive(Clone)]
pub struct AuthorizedClient {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    initial_backoff: Duration,
}

impl AuthorizedClient {
    pub fn new(api: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            store,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    /// Override the first rate-limit backoff delay
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// GET `path` with the persisted credential attached, decoding JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.api.url(path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .api
                .client
                .get(&url)
                .headers(current_auth_header(self.store.as_ref()))
                .send()
                .await?;

            match ApiClient::check_response_for_retry(response).await? {
                Some(response) => {
                    let body = response.text().await?;
                    return serde_json::from_str(&body).map_err(|e| {
                        ApiError::InvalidResponse(format!("{} from {}", e, url))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}
