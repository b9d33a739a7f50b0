//! Pooled transport owned by one bound client

use crate::config::Endpoint;
use crate::error::{RestError, RestResult};
use reqwest::cookie::Jar;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

const MAX_REDIRECTS: usize = 10;

/// Everything needed to (re)build the reqwest transport
pub(crate) struct TransportSettings {
    pub target: Endpoint,
    pub tls: rustls::ClientConfig,
    pub proxy: Option<reqwest::Proxy>,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub user_agent: String,
    /// Shared by every transport built from these settings
    pub cookies: Arc<Jar>,
}

impl TransportSettings {
    pub(crate) fn build(&self) -> RestResult<reqwest::Client> {
        let target = self.target.clone();
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if target.matches(attempt.url()) {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let builder = reqwest::Client::builder()
            .use_preconfigured_tls(self.tls.clone())
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.socket_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(&self.user_agent)
            .cookie_provider(self.cookies.clone())
            .gzip(true)
            .brotli(true)
            .redirect(redirect);

        let builder = match &self.proxy {
            Some(proxy) => builder.proxy(proxy.clone()),
            None => builder.no_proxy(),
        };

        builder.build().map_err(|e| {
            RestError::Configuration(format!(
                "Error establishing http connection for {}: {}",
                self.target,
                crate::error::describe(&e)
            ))
        })
    }
}

/// Snapshot of pool bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Maintenance passes run so far
    pub sweeps: u64,
    /// Passes that discarded idle connections
    pub evictions: u64,
    /// Whether the transport is still available
    pub open: bool,
}

/// Single-target connection pool.
///
/// Requests hold the transport under a read lock for their whole duration;
/// acquiring it is bounded by the acquisition timeout. Sweeps and close take
/// the write lock, so close waits for in-flight requests.
pub(crate) struct ConnectionPool {
    settings: TransportSettings,
    slot: RwLock<Option<reqwest::Client>>,
    acquire_timeout: Duration,
    epoch: Instant,
    last_release_ms: AtomicU64,
    sweeps: AtomicU64,
    evictions: AtomicU64,
}

impl ConnectionPool {
    /// Build the transport and store it in the pool.
    pub(crate) fn open(settings: TransportSettings, acquire_timeout: Duration) -> RestResult<Self> {
        let transport = settings.build()?;
        Ok(Self {
            settings,
            slot: RwLock::new(Some(transport)),
            acquire_timeout,
            epoch: Instant::now(),
            last_release_ms: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Lease the transport for one request; the lease blocks close and
    /// eviction until dropped.
    pub(crate) async fn lease(&self) -> RestResult<RwLockReadGuard<'_, reqwest::Client>> {
        let slot = tokio::time::timeout(self.acquire_timeout, self.slot.read())
            .await
            .map_err(|_| {
                RestError::Execution(format!(
                    "Timeout waiting for connection from pool after {:?}",
                    self.acquire_timeout
                ))
            })?;
        RwLockReadGuard::try_map(slot, Option::as_ref)
            .map_err(|_| RestError::Execution("client has been closed".to_string()))
    }

    /// Record that a request finished with the transport.
    pub(crate) fn release(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_release_ms.store(now, Ordering::Relaxed);
    }

    /// Time since the transport was last released
    pub(crate) fn idle_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_release_ms.load(Ordering::Relaxed)))
    }

    /// Run one maintenance pass.
    ///
    /// Connections the peer has closed or whose keep-alive expired are
    /// dropped by the transport on checkout. When the pool has been idle
    /// longer than `max_idle`, the transport is rebuilt, discarding every
    /// pooled connection. Returns true if connections were evicted.
    pub(crate) fn sweep(&self, max_idle: Duration) -> bool {
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        let idle = self.idle_for();
        if idle <= max_idle {
            return false;
        }

        // Opportunistic: skip the pass when the slot is contended
        let Ok(mut slot) = self.slot.try_write() else {
            debug!("Pool busy, skipping idle eviction");
            return false;
        };
        if slot.is_none() {
            return false;
        }

        match self.settings.build() {
            Ok(fresh) => {
                *slot = Some(fresh);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(idle_ms = idle.as_millis() as u64, "Evicted idle connections");
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not rebuild transport; keeping existing connections");
                false
            }
        }
    }

    /// Drop the transport and its connections. Returns false if already closed.
    pub(crate) async fn close(&self) -> RestResult<bool> {
        let mut slot = tokio::time::timeout(self.acquire_timeout, self.slot.write())
            .await
            .map_err(|_| {
                RestError::Execution(format!(
                    "Timeout waiting for in-flight requests after {:?}",
                    self.acquire_timeout
                ))
            })?;
        Ok(slot.take().is_some())
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            open: self
                .slot
                .try_read()
                .map(|slot| slot.is_some())
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;

    fn pool() -> ConnectionPool {
        let settings = TransportSettings {
            target: Endpoint::new(Scheme::Http, "localhost", 9200).unwrap(),
            tls: crate::tls::client_config(false, None).unwrap(),
            proxy: None,
            connect_timeout: Duration::from_secs(1),
            socket_timeout: Duration::from_secs(1),
            pool_max_idle_per_host: 1,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: "esdiag-rest-test".to_string(),
            cookies: Arc::new(Jar::default()),
        };
        ConnectionPool::open(settings, Duration::from_secs(1)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_recently_used_connections() {
        let pool = pool();
        pool.release();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!pool.sweep(Duration::from_secs(5)));
        let stats = pool.stats();
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_connections() {
        let pool = pool();
        pool.release();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(pool.sweep(Duration::from_secs(5)));
        assert_eq!(pool.stats().evictions, 1);
        assert!(pool.lease().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let pool = pool();
        assert!(pool.close().await.unwrap());
        assert!(!pool.close().await.unwrap());
        assert!(!pool.stats().open);

        let err = pool.lease().await.unwrap_err();
        assert!(matches!(err, RestError::Execution(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_active_lease() {
        let pool = pool();
        let lease = pool.lease().await.unwrap();

        let err = pool.close().await.unwrap_err();
        assert!(matches!(err, RestError::Execution(_)));
        assert!(!pool.sweep(Duration::ZERO));

        drop(lease);
        assert!(pool.close().await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_after_close_is_noop() {
        let pool = pool();
        pool.close().await.unwrap();
        assert!(!pool.sweep(Duration::ZERO));
        assert_eq!(pool.stats().sweeps, 1);
    }
}
