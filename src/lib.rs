//! Bearer-token HTTP client with a single-flight access token refresh.
//!
//! Requests go through [`ApiClient`], which attaches the stored access token
//! and, when the server answers 401, asks the shared [`SessionManager`] for a
//! new one. Only one refresh call is ever in flight; requests that fail while
//! it runs wait for its result and are replayed with the new token.

mod client;
mod config;
mod errors;
pub mod session;
pub mod telemetry;
pub mod token;
mod types;

pub use client::{ApiClient, ApiRequest};
pub use config::Config;
pub use errors::{Error, NetworkErrorKind};
pub use session::{LoginRedirect, NoRedirect, SessionManager};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::TokenPair;

#[cfg(test)]
mod tests;
