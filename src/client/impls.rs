use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    ApiClient,
    client::ApiRequest,
    config::Config,
    errors::{Error, NetworkErrorKind},
    session::{LoginRedirect, SessionManager},
    token::TokenStore,
    types::{LoginRequest, RefreshRequest, RefreshResponse, TokenPair},
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

impl ApiClient {
    /// Create a new ApiClient with its own session manager.
    /// # Arguments
    /// * `config` - Explicit configuration (`Config`), typically loaded via `Config::from_file` or `Config::from_env`.
    /// * `store` - Where the access and refresh tokens live between calls.
    /// * `redirect` - Invoked when the session ends because credentials could not be renewed.
    pub fn new(
        config: Config,
        store: Arc<dyn TokenStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self, Error> {
        let session = Arc::new(SessionManager::new(store, redirect));
        Self::with_session(config, session)
    }

    /// Create a client bound to an existing session manager, so several
    /// clients share one refresh gate.
    pub fn with_session(config: Config, session: Arc<SessionManager>) -> Result<Self, Error> {
        let base_url = config.base_url()?;
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        let refresh_url = join(&base_url, config.refresh_path())?;
        let login_url = join(&base_url, config.login_path())?;
        let mut auth_prefixes = config
            .auth_paths()
            .iter()
            .map(|p| join(&base_url, p).map(|url| url.path().to_string()))
            .collect::<Result<Vec<_>, Error>>()?;
        auth_prefixes.push(refresh_url.path().to_string());

        info!(
            base_url = %base_url,
            timeout_secs = config.timeout().as_secs(),
            "api client ready"
        );
        Ok(ApiClient {
            http,
            base_url,
            refresh_url,
            login_url,
            auth_prefixes: Arc::new(auth_prefixes),
            session,
        })
    }

    pub fn session(&self) -> Arc<SessionManager> {
        Arc::clone(&self.session)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        if path.contains("://") {
            return Url::parse(path)
                .map_err(|e| Error::Config(format!("Invalid request URL '{path}': {e}")));
        }
        join(&self.base_url, path)
    }

    pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest, Error> {
        Ok(ApiRequest::new(method, self.url(path)?))
    }

    /// Whether `url` shares scheme, host and port with the base URL.
    pub fn is_first_party(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin()
    }

    /// Whether `url` is a login, registration, social-auth or refresh endpoint.
    pub fn is_auth_endpoint(&self, url: &Url) -> bool {
        let path = url.path();
        self.auth_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Attaches `Authorization: Bearer <access>` when a token is stored and
    /// the target is a first-party, non-auth endpoint. Replaces any previous
    /// value.
    pub fn authorize(&self, request: &mut ApiRequest) {
        if !self.is_first_party(&request.url) || self.is_auth_endpoint(&request.url) {
            return;
        }
        let Some(token) = self.session.access_token() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!(
                url = %request.url,
                "stored access token is not a valid header value; sending unauthenticated"
            ),
        }
    }

    /// Runs `request` through the full pipeline: attach token, send, and on a
    /// 401 renew the access token once and replay.
    pub async fn send(&self, mut request: ApiRequest) -> Result<Response, Error> {
        loop {
            self.authorize(&mut request);
            let response = self.dispatch(&request).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            // 401s from other origins pass through
            if status != StatusCode::UNAUTHORIZED || !self.is_first_party(&request.url) {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    method = %request.method,
                    url = %request.url,
                    status = status.as_u16(),
                    "request.failed"
                );
                return Err(Error::Status(status, body));
            }

            if self.is_auth_endpoint(&request.url) {
                let body = response.text().await.unwrap_or_default();
                warn!(url = %request.url, "auth endpoint returned 401");
                return Err(Error::Auth(format!(
                    "401 Unauthorized from {}: {body}",
                    request.url.path()
                )));
            }

            if request.retried {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    "request.unauthorized after refresh; giving up"
                );
                return Err(Error::Auth(format!(
                    "401 Unauthorized for {} {} after token refresh",
                    request.method,
                    request.url.path()
                )));
            }

            warn!(method = %request.method, url = %request.url, "request.unauthorized (401)");
            request.retried = true;
            let stale = request.bearer().map(str::to_owned);
            let token = self
                .session
                .renew(stale.as_deref(), |refresh| self.refresh_access(refresh))
                .await?;
            request.set_bearer(&token)?;
            debug!(method = %request.method, url = %request.url, "request.replay");
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let request = self.request(Method::GET, path)?;
        self.send_json(request).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path)?.json(body)?;
        self.send_json(request).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::PUT, path)?.json(body)?;
        self.send_json(request).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::PATCH, path)?.json(body)?;
        self.send_json(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let request = self.request(Method::DELETE, path)?;
        self.send(request).await?;
        Ok(())
    }

    /// Exchanges credentials for a token pair and stores both tokens.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, Error> {
        let request = ApiRequest::new(Method::POST, self.login_url.clone())
            .json(&LoginRequest { username, password })?;
        let pair: TokenPair = self.send_json(request).await?;
        self.session.store().save_pair(&pair)?;
        info!(username, "login ok");
        Ok(pair)
    }

    /// Drops stored credentials. Does not contact the server.
    pub fn logout(&self) -> Result<(), Error> {
        self.session.end_session()?;
        info!("logged out; token store cleared");
        Ok(())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, Error> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<Response, Error> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            url = %request.url,
            retried = request.retried,
            "request.send"
        );
        let started = Instant::now();
        match builder.send().await {
            Ok(response) => {
                debug!(
                    method = %request.method,
                    url = %request.url,
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request.complete"
                );
                Ok(response)
            }
            Err(err) => Err(network_error(&request.method, &request.url, err)),
        }
    }

    /// Issues the refresh call directly, outside the interceptor pipeline.
    async fn refresh_access(&self, refresh_token: String) -> Result<String, Error> {
        let response = self
            .http
            .post(self.refresh_url.clone())
            .json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .send()
            .await
            .map_err(|err| network_error(&Method::POST, &self.refresh_url, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status == StatusCode::UNAUTHORIZED {
                Error::Auth(format!("refresh token rejected: {body}"))
            } else {
                Error::Status(status, body)
            });
        }

        let bytes = response.bytes().await?;
        let RefreshResponse { access } = serde_json::from_slice(&bytes)?;
        if access.is_empty() {
            return Err(Error::Auth(
                "refresh response carried an empty access token".into(),
            ));
        }
        Ok(access)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, Error> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| Error::Config(format!("Invalid path '{path}' for base '{base}': {e}")))
}

fn network_error(method: &Method, url: &Url, err: reqwest::Error) -> Error {
    let kind = NetworkErrorKind::classify(&err);
    warn!(
        method = %method,
        url = %url,
        kind = %kind,
        error = %err,
        "request.network_error"
    );
    Error::Network(kind, err)
}
