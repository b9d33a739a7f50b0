//! REST client error types and failure classification

use std::error::Error as StdError;
use thiserror::Error;

/// Errors surfaced by [`BoundClient`](crate::BoundClient).
///
/// HTTP error statuses (4xx/5xx) are never reported through this type; they
/// come back as ordinary responses whose status the caller inspects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestError {
    /// Client could not be built (TLS material, key store, proxy, target)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bound host could not be reached (refused, unresolvable, connect timeout, handshake)
    #[error("Host connection error: {0}")]
    Connectivity(String),

    /// Outgoing request was malformed; nothing was sent
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// Any other transport failure
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Result type for REST operations
pub type RestResult<T> = Result<T, RestError>;

/// Payload-free classification of a [`RestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestErrorKind {
    Configuration,
    Connectivity,
    RequestBuild,
    Execution,
}

impl RestError {
    /// Classify the error
    pub fn kind(&self) -> RestErrorKind {
        match self {
            RestError::Configuration(_) => RestErrorKind::Configuration,
            RestError::Connectivity(_) => RestErrorKind::Connectivity,
            RestError::RequestBuild(_) => RestErrorKind::RequestBuild,
            RestError::Execution(_) => RestErrorKind::Execution,
        }
    }

    /// True when further calls to the same host are pointless
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RestError::Connectivity(_))
    }

    /// Sanitize error message (remove credentials and authorization values)
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Classify a transport failure reported by reqwest.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        let message = describe(&err);
        if err.is_builder() {
            RestError::RequestBuild(message)
        } else if err.is_connect() {
            RestError::Connectivity(message)
        } else {
            RestError::Execution(message)
        }
    }
}

/// Render an error together with its source chain.
pub(crate) fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn sanitize_error_message(msg: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static URL_CREDS_RE: OnceLock<Regex> = OnceLock::new();
    static AUTH_HEADER_RE: OnceLock<Regex> = OnceLock::new();

    let url_creds_re = URL_CREDS_RE
        .get_or_init(|| Regex::new(r"(https?)://[^@/\s:]+:[^@/\s]+@").expect("valid regex"));
    let auth_header_re = AUTH_HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)((?:proxy-)?authorization:\s*basic|\bbasic)\s+[A-Za-z0-9+/]{8,}={0,2}")
            .expect("valid regex")
    });

    let sanitized = url_creds_re.replace_all(msg, "$1://[REDACTED]@");
    let sanitized = auth_header_re.replace_all(&sanitized, "$1 [REDACTED]");

    sanitized.to_string()
}
