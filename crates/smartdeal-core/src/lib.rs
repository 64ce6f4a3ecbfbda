//! SmartDeal core library.
//!
//! This crate holds everything a SmartDeal client needs to talk to the
//! account API:
//!
//! - `auth`: the `SessionManager`, session state and persistent token stores
//! - `api`: HTTP client, wire types and error handling for the backend
//! - `config`: application configuration (API base URL, token backend)
//!
//! A front end constructs one `SessionManager` per application instance and
//! passes it to whatever needs to know who is signed in.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{current_auth_header, ApiClient, ApiError, AuthorizedClient};
pub use auth::{
    AuthOutcome, FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionManager,
    SessionState, SessionStatus, StoreError, TokenStore, User,
};
pub use config::{Config, TokenStoreKind};
