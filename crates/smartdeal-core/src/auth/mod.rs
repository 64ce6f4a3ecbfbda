//! Authentication module for managing user sessions and tokens.
//!
//! This module provides:
//! - `SessionManager`: login, registration, logout and startup verification
//! - `SessionState`: the token/user pair plus the startup loading flag
//! - `TokenStore`: persistence for the bearer token across restarts, backed
//!   by a file, the OS keychain, or memory
//!
//! Only the raw token is persisted; the user record is always re-fetched
//! from `/auth/me` on startup.

pub mod credentials;
pub mod session;
pub mod state;
pub mod store;

pub use credentials::KeyringTokenStore;
pub use session::{AuthOutcome, SessionManager};
pub use state::{SessionState, SessionStatus, User};
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenStore, TOKEN_KEY};
