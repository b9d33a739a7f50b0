//! REST client configuration

use crate::auth::Credentials;
use crate::error::{RestError, RestResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// URL scheme of the bound target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(RestError::Configuration(format!("Invalid scheme: {}", s))),
        }
    }
}

/// A (scheme, host, port) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint, rejecting an empty host or port 0.
    ///
    /// The host is stored in the canonical form `Url` gives it: lower-cased
    /// and punycode-encoded domains, compressed IPv6 without brackets.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> RestResult<Self> {
        let host = host.into();
        let host = host.trim();
        if host.is_empty() {
            return Err(RestError::Configuration("host cannot be empty".to_string()));
        }
        if port == 0 {
            return Err(RestError::Configuration(format!(
                "port for host {} must be non-zero",
                host
            )));
        }

        let invalid = |reason: &str| {
            RestError::Configuration(format!("invalid host '{}': {}", host, reason))
        };
        let literal = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let url = Url::parse(&format!("{}://{}:{}/", scheme, literal, port))
            .map_err(|e| invalid(&e.to_string()))?;
        // Anything beyond a bare host leaks into userinfo, path, query or port
        if url.path() != "/"
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
            || url.password().is_some()
            || url.port_or_known_default() != Some(port)
        {
            return Err(invalid("not a bare host name or address"));
        }
        let host = match url.host() {
            Some(url::Host::Domain(domain)) => domain.to_string(),
            Some(url::Host::Ipv4(addr)) => addr.to_string(),
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(invalid("no host")),
        };

        Ok(Self { scheme, host, port })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Root URL of the endpoint (`scheme://host:port/`)
    pub fn base_url(&self) -> RestResult<Url> {
        Url::parse(&format!("{}/", self)).map_err(|e| {
            RestError::Configuration(format!("Invalid endpoint {}: {}", self, e))
        })
    }

    /// True when `url` addresses this endpoint
    pub fn matches(&self, url: &Url) -> bool {
        let host = match url.host() {
            Some(url::Host::Domain(domain)) => domain.to_string(),
            Some(url::Host::Ipv4(addr)) => addr.to_string(),
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            None => return false,
        };
        url.scheme() == self.scheme.as_str()
            && host == self.host
            && url.port_or_known_default() == Some(self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// Fully resolved settings for one [`BoundClient`](crate::BoundClient).
///
/// Empty strings are treated as absent values. Timeouts serialize as
/// milliseconds (`connect_timeout_ms`, ...).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target host name or address
    pub host: String,

    /// Target port
    pub port: u16,

    /// Target scheme
    pub scheme: Scheme,

    /// Basic credentials for the target
    pub user: Option<String>,
    pub password: Option<String>,

    /// Forward proxy; all traffic is routed through it when set
    pub proxy_host: Option<String>,
    pub proxy_port: u16,

    /// Basic credentials for the proxy
    pub proxy_user: Option<String>,
    pub proxy_password: Option<String>,

    /// PKCS#12 store holding the client certificate and key for mutual TLS
    pub pki_keystore: Option<PathBuf>,
    pub pki_keystore_pass: Option<String>,

    /// Skip hostname verification in addition to chain verification
    pub bypass_verify: bool,

    /// Connection establishment timeout
    #[serde(with = "duration_ms", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,

    /// Maximum wait to lease the pooled transport
    #[serde(with = "duration_ms", rename = "connection_request_timeout_ms")]
    pub connection_request_timeout: Duration,

    /// Maximum wait between reads on an open connection
    #[serde(with = "duration_ms", rename = "socket_timeout_ms")]
    pub socket_timeout: Duration,

    /// Maximum idle connections kept for the target
    pub pool_max_idle_per_host: usize,

    /// Idle connections older than this are closed by the transport
    #[serde(with = "duration_ms", rename = "pool_idle_timeout_ms")]
    pub pool_idle_timeout: Duration,

    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9200,
            scheme: Scheme::Http,
            user: None,
            password: None,
            proxy_host: None,
            proxy_port: 0,
            proxy_user: None,
            proxy_password: None,
            pki_keystore: None,
            pki_keystore_pass: None,
            bypass_verify: false,
            connect_timeout: Duration::from_secs(30),
            connection_request_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: format!("esdiag-rest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a config for `host` with default values
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the target port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the target scheme
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set Basic credentials for the target
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Route traffic through a forward proxy
    pub fn proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy_host = Some(host.into());
        self.proxy_port = port;
        self
    }

    /// Set Basic credentials for the proxy
    pub fn proxy_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.proxy_user = Some(user.into());
        self.proxy_password = Some(password.into());
        self
    }

    /// Present a client identity from a PKCS#12 store
    pub fn pki_keystore(mut self, path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        self.pki_keystore = Some(path.into());
        self.pki_keystore_pass = Some(passphrase.into());
        self
    }

    /// Skip hostname verification (DANGER)
    pub fn bypass_verify(mut self, bypass: bool) -> Self {
        self.bypass_verify = bypass;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the pooled-transport lease timeout
    pub fn connection_request_timeout(mut self, timeout: Duration) -> Self {
        self.connection_request_timeout = timeout;
        self
    }

    /// Set the socket read timeout
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set all three timeouts from milliseconds
    pub fn timeouts_ms(mut self, connect: u64, request: u64, socket: u64) -> Self {
        self.connect_timeout = Duration::from_millis(connect);
        self.connection_request_timeout = Duration::from_millis(request);
        self.socket_timeout = Duration::from_millis(socket);
        self
    }

    /// Set max idle connections kept for the target
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Check the settings for consistency without loading any TLS material.
    pub fn validate(&self) -> RestResult<()> {
        self.target_endpoint()?;
        self.proxy_endpoint()?;
        if self.proxy_credentials().is_some() && present(&self.proxy_host).is_none() {
            return Err(RestError::Configuration(
                "proxy credentials supplied without a proxy host".to_string(),
            ));
        }
        if self.connection_request_timeout.is_zero() {
            return Err(RestError::Configuration(
                "connection request timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target_endpoint(&self) -> RestResult<Endpoint> {
        Endpoint::new(self.scheme, &self.host, self.port)
    }

    /// Proxy endpoint, if a proxy host is set. Proxies are always spoken to over plain HTTP.
    pub fn proxy_endpoint(&self) -> RestResult<Option<Endpoint>> {
        match present(&self.proxy_host) {
            Some(host) => Endpoint::new(Scheme::Http, host, self.proxy_port)
                .map(Some)
                .map_err(|e| RestError::Configuration(format!("malformed proxy settings: {}", e))),
            None => Ok(None),
        }
    }

    pub(crate) fn target_credentials(&self) -> Option<Credentials> {
        present(&self.user).map(|user| {
            Credentials::new(user, self.password.as_deref().unwrap_or_default())
        })
    }

    pub(crate) fn proxy_credentials(&self) -> Option<Credentials> {
        present(&self.proxy_user).map(|user| {
            Credentials::new(user, self.proxy_password.as_deref().unwrap_or_default())
        })
    }

    pub(crate) fn keystore_path(&self) -> Option<&Path> {
        self.pki_keystore
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub(crate) fn keystore_passphrase(&self) -> &str {
        self.pki_keystore_pass.as_deref().unwrap_or_default()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| present(value).map(|_| "[REDACTED]");
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("proxy_host", &self.proxy_host)
            .field("proxy_port", &self.proxy_port)
            .field("proxy_user", &self.proxy_user)
            .field("proxy_password", &redact(&self.proxy_password))
            .field("pki_keystore", &self.pki_keystore)
            .field("pki_keystore_pass", &redact(&self.pki_keystore_pass))
            .field("bypass_verify", &self.bypass_verify)
            .field("connect_timeout", &self.connect_timeout)
            .field("connection_request_timeout", &self.connection_request_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .finish()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
