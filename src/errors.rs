use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;

/// Coarse diagnosis of a request that never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Other,
}

impl NetworkErrorKind {
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_connect() {
            NetworkErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            NetworkErrorKind::Body
        } else if err.is_request() || err.is_builder() {
            NetworkErrorKind::Request
        } else {
            NetworkErrorKind::Other
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkErrorKind::Timeout => write!(f, "timeout"),
            NetworkErrorKind::Connect => write!(f, "connect"),
            NetworkErrorKind::Request => write!(f, "request"),
            NetworkErrorKind::Body => write!(f, "body"),
            NetworkErrorKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(String),
    Network(NetworkErrorKind, reqwest::Error),
    Auth(String),
    /// The refresh call failed. Every request waiting on that refresh
    /// receives a clone of the same `Arc`.
    RefreshFailed(Arc<Error>),
    Status(StatusCode, String),
}

impl Error {
    /// True for failures that end the local session.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::RefreshFailed(_))
    }

    /// Status of the server response behind this error, if there was one.
    /// `Auth` errors are raised by the client itself and carry none.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(status, _) => Some(*status),
            Error::Network(_, err) => err.status(),
            Error::RefreshFailed(inner) => inner.status(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Json(err) => write!(f, "json error: {err}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Network(kind, err) => write!(f, "network error ({kind}): {err}"),
            Error::Auth(msg) => write!(f, "authentication error: {msg}"),
            Error::RefreshFailed(err) => write!(f, "token refresh failed: {err}"),
            Error::Status(status, body) => write!(f, "unexpected status {status}: {body}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Network(_, err) => Some(err),
            Error::RefreshFailed(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(NetworkErrorKind::classify(&err), err)
    }
}
