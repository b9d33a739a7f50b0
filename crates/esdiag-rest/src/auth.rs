//! Preemptive Basic authentication for the target and the forward proxy

use crate::config::Endpoint;
use crate::error::{RestError, RestResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{HeaderValue, AUTHORIZATION};
use std::fmt;

/// A username/password pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// `Basic <base64(user:password)>`, marked sensitive
    fn basic_header(&self) -> RestResult<HeaderValue> {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {}", token)).map_err(|e| {
            RestError::Configuration(format!("invalid Basic credentials: {}", e))
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Which party a credential set authenticates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScope {
    Target,
    Proxy,
}

/// Authentication state fixed when a client is built.
///
/// Owned by exactly one [`BoundClient`](crate::BoundClient) and read-only
/// afterwards; nothing is re-resolved per request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    target: Option<Credentials>,
    proxy: Option<Credentials>,
    preemptive: Option<Endpoint>,
    authorization: Option<HeaderValue>,
}

impl AuthContext {
    /// Resolve credentials with the following precedence:
    ///
    /// 1. target only: preemptive Basic keyed to the target
    /// 2. proxy only: preemptive Basic keyed to the proxy
    /// 3. both: both registered, preemptive entry keyed to the proxy
    /// 4. neither: no preemptive entry
    pub(crate) fn resolve(
        target: &Endpoint,
        proxy: Option<&Endpoint>,
        target_credentials: Option<Credentials>,
        proxy_credentials: Option<Credentials>,
    ) -> RestResult<Self> {
        let preemptive = match (&target_credentials, &proxy_credentials, proxy) {
            (_, Some(_), None) => {
                return Err(RestError::Configuration(
                    "proxy credentials supplied without a proxy host".to_string(),
                ))
            }
            (_, Some(_), Some(proxy)) => Some(proxy.clone()),
            (Some(_), None, _) => Some(target.clone()),
            (None, None, _) => None,
        };

        let authorization = target_credentials
            .as_ref()
            .map(Credentials::basic_header)
            .transpose()?;

        Ok(Self {
            target: target_credentials,
            proxy: proxy_credentials,
            preemptive,
            authorization,
        })
    }

    /// Credentials registered for `scope`
    pub fn credentials_for(&self, scope: AuthScope) -> Option<&Credentials> {
        match scope {
            AuthScope::Target => self.target.as_ref(),
            AuthScope::Proxy => self.proxy.as_ref(),
        }
    }

    /// Endpoint the preemptive Basic scheme is cached for
    pub fn preemptive_host(&self) -> Option<&Endpoint> {
        self.preemptive.as_ref()
    }

    /// Attach the target's `Authorization` header, if any.
    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.authorization {
            Some(value) => request.header(AUTHORIZATION, value.clone()),
            None => request,
        }
    }

    /// Proxy route for `endpoint`, carrying `Proxy-Authorization` when proxy credentials exist.
    pub(crate) fn proxy_route(&self, endpoint: &Endpoint) -> RestResult<reqwest::Proxy> {
        let proxy = reqwest::Proxy::all(endpoint.to_string()).map_err(|e| {
            RestError::Configuration(format!("malformed proxy settings {}: {}", endpoint, e))
        })?;
        Ok(match &self.proxy {
            Some(credentials) => proxy.basic_auth(credentials.username(), credentials.password()),
            None => proxy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;

    fn target() -> Endpoint {
        Endpoint::new(Scheme::Https, "es01.internal", 9200).unwrap()
    }

    fn proxy() -> Endpoint {
        Endpoint::new(Scheme::Http, "squid.internal", 3128).unwrap()
    }

    #[test]
    fn test_target_only() {
        let auth = AuthContext::resolve(
            &target(),
            None,
            Some(Credentials::new("elastic", "changeme")),
            None,
        )
        .unwrap();

        assert_eq!(auth.credentials_for(AuthScope::Target).unwrap().username(), "elastic");
        assert!(auth.credentials_for(AuthScope::Proxy).is_none());
        assert_eq!(auth.preemptive_host(), Some(&target()));
    }

    #[test]
    fn test_target_only_behind_proxy_keys_target() {
        let auth = AuthContext::resolve(
            &target(),
            Some(&proxy()),
            Some(Credentials::new("elastic", "changeme")),
            None,
        )
        .unwrap();

        assert_eq!(auth.preemptive_host(), Some(&target()));
    }

    #[test]
    fn test_proxy_only() {
        let auth = AuthContext::resolve(
            &target(),
            Some(&proxy()),
            None,
            Some(Credentials::new("squid", "s3cret")),
        )
        .unwrap();

        assert!(auth.credentials_for(AuthScope::Target).is_none());
        assert_eq!(auth.credentials_for(AuthScope::Proxy).unwrap().username(), "squid");
        assert_eq!(auth.preemptive_host(), Some(&proxy()));
        assert!(auth.authorization.is_none());
    }

    #[test]
    fn test_both_keys_proxy() {
        let auth = AuthContext::resolve(
            &target(),
            Some(&proxy()),
            Some(Credentials::new("elastic", "changeme")),
            Some(Credentials::new("squid", "s3cret")),
        )
        .unwrap();

        assert!(auth.credentials_for(AuthScope::Target).is_some());
        assert!(auth.credentials_for(AuthScope::Proxy).is_some());
        assert_eq!(auth.preemptive_host(), Some(&proxy()));
        assert_ne!(auth.preemptive_host(), Some(&target()));
    }

    #[test]
    fn test_neither() {
        let auth = AuthContext::resolve(&target(), Some(&proxy()), None, None).unwrap();
        assert!(auth.preemptive_host().is_none());
        assert!(auth.credentials_for(AuthScope::Target).is_none());
        assert!(auth.credentials_for(AuthScope::Proxy).is_none());
    }

    #[test]
    fn test_proxy_credentials_need_proxy() {
        let err = AuthContext::resolve(
            &target(),
            None,
            None,
            Some(Credentials::new("squid", "s3cret")),
        )
        .unwrap_err();
        assert!(matches!(err, RestError::Configuration(_)));
    }

    #[test]
    fn test_basic_header_value() {
        let value = Credentials::new("elastic", "changeme").basic_header().unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic ZWxhc3RpYzpjaGFuZ2VtZQ==");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("elastic", "changeme"));
        assert!(!rendered.contains("changeme"));
    }
}
