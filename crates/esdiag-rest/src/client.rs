//! REST client bound to a single target endpoint

use crate::auth::AuthContext;
use crate::config::{ClientConfig, Endpoint};
use crate::envelope::ResultEnvelope;
use crate::error::{RestError, RestResult};
use crate::pool::{ConnectionPool, PoolStats, TransportSettings};
use crate::response::{from_reqwest, HttpResponse};
use crate::tls::{self, ClientIdentity};
use http::header::{ACCEPT, CONTENT_TYPE};
use reqwest::cookie::Jar;
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Connections idle longer than this are evicted after each POST
const POST_SWEEP_IDLE: Duration = Duration::from_secs(5);

/// HTTP(S) client permanently bound to one (scheme, host, port).
///
/// Built once from a resolved [`ClientConfig`]; credentials, proxy route and
/// TLS material are fixed at that point. Intended for sequential use by one
/// caller.
///
/// # Example
///
/// ```ignore
/// use esdiag_rest::{BoundClient, ClientConfig, Scheme};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::new("es01.internal")
///         .scheme(Scheme::Https)
///         .basic_auth("elastic", "changeme");
///
///     let client = BoundClient::build(&config)?;
///     let health = client.get_to_file("/_cluster/health", "cluster_health.json").await?;
///     println!("{} -> {}", health.url(), health.status());
///
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct BoundClient {
    target: Endpoint,
    base_url: Url,
    auth: AuthContext,
    pool: ConnectionPool,
}

impl BoundClient {
    /// Resolve credentials, proxy, TLS material and timeouts into a client.
    #[instrument(skip(config), fields(host = %config.host, port = config.port, scheme = %config.scheme))]
    pub fn build(config: &ClientConfig) -> RestResult<Self> {
        config.validate()?;

        let target = config.target_endpoint()?;
        let proxy_endpoint = config.proxy_endpoint()?;
        let auth = AuthContext::resolve(
            &target,
            proxy_endpoint.as_ref(),
            config.target_credentials(),
            config.proxy_credentials(),
        )?;
        let proxy = proxy_endpoint
            .as_ref()
            .map(|endpoint| auth.proxy_route(endpoint))
            .transpose()?;

        let identity = config
            .keystore_path()
            .map(|path| ClientIdentity::from_pkcs12_file(path, config.keystore_passphrase()))
            .transpose()
            .inspect_err(|e| error!(error = %e, "Connection setup failed"))?;
        let has_identity = identity.is_some();

        let settings = TransportSettings {
            target: target.clone(),
            tls: tls::client_config(config.bypass_verify, identity)?,
            proxy,
            connect_timeout: config.connect_timeout,
            socket_timeout: config.socket_timeout,
            pool_max_idle_per_host: config.pool_max_idle_per_host,
            pool_idle_timeout: config.pool_idle_timeout,
            user_agent: config.user_agent.clone(),
            cookies: Arc::new(Jar::default()),
        };
        let pool = ConnectionPool::open(settings, config.connection_request_timeout)?;
        let base_url = target.base_url()?;

        info!(
            endpoint = %target,
            proxy = ?proxy_endpoint.as_ref().map(ToString::to_string),
            pki = has_identity,
            bypass_verify = config.bypass_verify,
            "REST client ready"
        );

        Ok(Self {
            target,
            base_url,
            auth,
            pool,
        })
    }

    /// The endpoint every request goes to
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Authentication state resolved at build time
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// GET `url` and wrap the response with the URL that produced it.
    pub async fn get(&self, url: &str) -> RestResult<ResultEnvelope> {
        let response = self.exec_get(url).await?;
        Ok(ResultEnvelope::new(response, url))
    }

    /// Like [`get`](Self::get), tagging the envelope with an output file name.
    pub async fn get_to_file(&self, url: &str, file_name: &str) -> RestResult<ResultEnvelope> {
        let response = self.exec_get(url).await?;
        Ok(ResultEnvelope::with_file_name(response, url, file_name))
    }

    /// Raw GET against the bound endpoint
    pub async fn exec_get(&self, url: &str) -> RestResult<HttpResponse> {
        debug!(url, "GET");
        self.execute(Method::GET, url, None).await
    }

    /// POST a JSON payload, then sweep the connection pool.
    ///
    /// The sweep runs exactly once per call whatever the outcome. An empty
    /// payload is sent as-is; anything else must be JSON (newline-delimited
    /// documents are accepted).
    pub async fn post(&self, path: &str, payload: &str) -> RestResult<HttpResponse> {
        debug!(path, bytes = payload.len(), "POST");
        let result = match check_json(payload) {
            Ok(()) => self.execute(Method::POST, path, Some(payload.to_owned())).await,
            Err(e) => {
                error!(error = %e, "Error with json body");
                Err(e)
            }
        };
        self.pool.sweep(POST_SWEEP_IDLE);
        result
    }

    /// Serialize `value` and POST it.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> RestResult<HttpResponse> {
        match serde_json::to_string(value) {
            Ok(payload) => self.post(path, &payload).await,
            Err(e) => {
                self.pool.sweep(POST_SWEEP_IDLE);
                Err(RestError::RequestBuild(format!(
                    "Could not serialize request body: {}",
                    e
                )))
            }
        }
    }

    /// DELETE `path`
    pub async fn delete(&self, path: &str) -> RestResult<HttpResponse> {
        debug!(path, "DELETE");
        self.execute(Method::DELETE, path, None).await
    }

    /// Release the transport and its pooled connections.
    ///
    /// Later calls are no-ops. Failures are logged, never returned.
    pub async fn close(&self) {
        match self.pool.close().await {
            Ok(true) => debug!(endpoint = %self.target, "REST client closed"),
            Ok(false) => debug!(endpoint = %self.target, "REST client already closed"),
            Err(e) => warn!(
                error = %e.sanitized_message(),
                "Error occurred closing client connection"
            ),
        }
    }

    /// Resolve `url` against the bound endpoint.
    fn resolve(&self, url: &str) -> RestResult<Url> {
        let resolved = self.base_url.join(url).map_err(|e| {
            RestError::RequestBuild(format!("Invalid request path '{}': {}", url, e))
        })?;
        if !self.target.matches(&resolved) {
            return Err(RestError::RequestBuild(format!(
                "'{}' does not address the bound endpoint {}",
                url, self.target
            )));
        }
        Ok(resolved)
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        json_body: Option<String>,
    ) -> RestResult<HttpResponse> {
        let resolved = self.resolve(url)?;
        let transport = self.pool.lease().await?;

        let mut request = self.auth.apply(transport.request(method, resolved));
        if let Some(body) = json_body {
            request = request
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => from_reqwest(response, start.elapsed().as_millis() as u64).await,
            Err(e) => Err(RestError::from_transport(e)),
        };
        drop(transport);
        self.pool.release();

        result.inspect_err(|e| match e {
            RestError::Connectivity(_) => {
                error!(endpoint = %self.target, error = %e.sanitized_message(), "Host connection error")
            }
            _ => error!(error = %e.sanitized_message(), "Unexpected Execution Error"),
        })
    }
}

/// Reject payloads that are not JSON before anything is sent.
fn check_json(payload: &str) -> RestResult<()> {
    if payload.trim().is_empty() {
        return Ok(());
    }
    serde_json::Deserializer::from_str(payload)
        .into_iter::<serde::de::IgnoredAny>()
        .try_for_each(|doc| doc.map(|_| ()))
        .map_err(|e| RestError::RequestBuild(format!("Malformed json body: {}", e)))
}

impl std::fmt::Debug for BoundClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundClient")
            .field("target", &self.target)
            .field("preemptive_auth", &self.auth.preemptive_host())
            .field("pool", &self.pool.stats())
            .finish()
    }
}
