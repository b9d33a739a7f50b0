//! esdiag-rest: REST client bound to a single cluster endpoint
//!
//! Issues GET/POST/DELETE requests against one fixed host while handling
//! Basic credentials for the target, forward-proxy routing with its own
//! credentials, mutual TLS from a PKCS#12 store, a trust-all TLS policy with
//! optional hostname verification, per-call timeouts and connection-pool
//! hygiene.
//!
//! # Architecture
//!
//! - `BoundClient`: built once from a `ClientConfig`, owns the transport
//! - `AuthContext`: credentials and preemptive-auth host fixed at build time
//! - `ResultEnvelope`: response + originating URL + optional output file name
//! - `RestError`: configuration, connectivity, request-build and execution failures
//!
//! Installing a `tracing` subscriber is left to the caller.

pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pool;
pub mod response;
pub mod tls;

pub use auth::{AuthContext, AuthScope, Credentials};
pub use client::BoundClient;
pub use config::{ClientConfig, Endpoint, Scheme};
pub use envelope::ResultEnvelope;
pub use error::{RestError, RestErrorKind, RestResult};
pub use pool::PoolStats;
pub use response::{HttpResponse, HttpResponseBuilder};
pub use tls::ClientIdentity;
