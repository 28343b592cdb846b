//! Gateway Contracts
//!
//! The collector talks to the outside world through three narrow traits:
//!
//! - [`RpcGateway`]: JSON-RPC method calls against a node or public endpoint
//! - [`MetricsGateway`]: Prometheus scrapes filtered down to the requested series
//! - [`GeoGateway`]: IP geolocation
//!
//! The `reqwest` implementations live in the submodules; tests plug in
//! in-memory fakes.

pub mod geo;
pub mod prometheus;
pub mod rpc;

pub use geo::IpInfoClient;
pub use prometheus::{MetricSpec, PromType, PrometheusClient, ScrapedMetric};
pub use rpc::{JsonRpcClient, RpcMethod};

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::types::GeoInfo;

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport-level failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error calling {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error("rpc error {code} from {method}: {message}")]
    Rpc { method: String, code: i64, message: String },

    #[error("{method} returned an empty result")]
    EmptyResult { method: String },

    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("metric '{name}' not found in scrape")]
    MissingMetric { name: String },
}

/// JSON-RPC contract
#[async_trait]
pub trait RpcGateway: Send + Sync {
    /// Call `method` on `endpoint` and return its decoded `result` value
    ///
    /// A `null` result must be reported as [`GatewayError::EmptyResult`].
    async fn call(&self, endpoint: &str, method: RpcMethod) -> Result<serde_json::Value, GatewayError>;
}

/// Prometheus scrape contract
#[async_trait]
pub trait MetricsGateway: Send + Sync {
    /// Scrape `endpoint` and return one value per requested spec, keyed by name
    ///
    /// Specs that match no series are simply absent from the result.
    async fn scrape(
        &self,
        endpoint: &str,
        specs: &[MetricSpec],
    ) -> Result<HashMap<String, ScrapedMetric>, GatewayError>;
}

/// Geolocation contract
#[async_trait]
pub trait GeoGateway: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GatewayError>;
}

/// Deadline and cancellation applied to every gateway call of a cycle
#[derive(Debug, Clone)]
pub struct CallPolicy {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallPolicy {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// Race `call` against the deadline and the cycle's cancellation
    pub async fn run<T, F>(&self, operation: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(GatewayError::Cancelled {
                operation: operation.to_string(),
            }),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout {
                    operation: operation.to_string(),
                    timeout: self.timeout,
                }),
            },
        }
    }
}

/// Render an ISO country code as a regional indicator flag
pub fn flag_glyph(country_code: &str) -> String {
    if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }

    country_code
        .to_ascii_uppercase()
        .chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}
