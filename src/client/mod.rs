use std::sync::Arc;

use reqwest::{Client, Url};

use crate::session::SessionManager;

mod impls;
mod request;

pub use request::ApiRequest;

/// HTTP client that attaches bearer tokens and renews them on 401.
///
/// Clones share the same connection pool and [`SessionManager`].
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    refresh_url: Url,
    login_url: Url,
    /// URL paths that bypass both header injection and refresh.
    auth_prefixes: Arc<Vec<String>>,
    session: Arc<SessionManager>,
}
