//! REST API client module for the SmartDeal backend.
//!
//! This module provides the `ApiClient` used by the session manager for the
//! `/auth/*` endpoints, and an `AuthorizedClient` for any other call that
//! needs the persisted bearer token attached.
//!
//! The backend uses JWT bearer token authentication obtained through
//! `/auth/login` or `/auth/register`.

pub mod client;
pub mod error;
pub mod types;

pub use client::{current_auth_header, ApiClient, AuthorizedClient, CredentialReply};
pub use error::ApiError;
pub use types::{AuthResponse, Credentials, ErrorBody};
