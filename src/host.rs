//! Polled participants
//!
//! A [`Host`] is built fresh for every cycle by its collector task, which
//! owns it until it is handed back through the result channel.

use serde::Serialize;
use std::net::IpAddr;
use tracing::debug;

use crate::address::{Address, AddressError};
use crate::gateway::{CallPolicy, GatewayError, GeoGateway, MetricSpec, MetricsGateway, RpcGateway};
use crate::metrics::{MetricKind, Metrics, MetricsError};
use crate::types::{GeoInfo, HostStatus, TableType};

/// Failures that drop a host from the cycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("{address}: {source}")]
    Address { address: String, source: AddressError },

    #[error("{address}: geolocation failed: {source}")]
    Geolocation { address: String, source: GatewayError },

    #[error("{address}: cannot resolve host for geolocation")]
    Unresolved { address: String },

    #[error("{address}: all {failures} gateway calls failed, first: {first}")]
    Unreachable {
        address: String,
        failures: usize,
        first: GatewayError,
    },

    #[error("{address}: collector task aborted: {reason}")]
    Aborted { address: String, reason: String },
}

/// One polled node, validator or RPC endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub table: TableType,
    pub address: Address,
    pub rpc_url: Option<String>,
    pub metrics_url: Option<String>,
    pub status: HostStatus,
    pub location: Option<GeoInfo>,
    pub metrics: Metrics,

    /// Per-call failures that did not sink the host
    pub errors: Vec<String>,
}

impl Host {
    /// Derive the endpoints `table` needs from `address`
    pub fn new(table: TableType, address: Address, metrics: Metrics) -> Result<Self, HostError> {
        let derive = |url: Result<String, AddressError>| {
            url.map_err(|source| HostError::Address {
                address: address.to_string(),
                source,
            })
        };

        let rpc_url = if table.uses_rpc() {
            Some(derive(address.rpc_url())?)
        } else {
            None
        };
        let metrics_url = if table.uses_metrics() {
            Some(derive(address.metrics_url())?)
        } else {
            None
        };

        Ok(Self {
            table,
            address,
            rpc_url,
            metrics_url,
            status: HostStatus::default(),
            location: None,
            metrics,
            errors: Vec::new(),
        })
    }

    /// Address key and rate windows to carry into the next cycle
    pub fn into_carried(self) -> (String, Metrics) {
        (self.address.key(), self.metrics.carry_forward())
    }

    /// Resolve the host's location
    pub async fn locate(&mut self, geo: &dyn GeoGateway, policy: &CallPolicy) -> Result<(), HostError> {
        let ip = self.resolve_ip().await.ok_or_else(|| HostError::Unresolved {
            address: self.address.to_string(),
        })?;

        let info = policy
            .run("geolocation", geo.lookup(ip))
            .await
            .map_err(|source| HostError::Geolocation {
                address: self.address.to_string(),
                source,
            })?;

        self.location = Some(info);
        Ok(())
    }

    async fn resolve_ip(&self) -> Option<IpAddr> {
        if let Some(ip) = self.address.ip() {
            return Some(ip);
        }

        tokio::net::lookup_host((self.address.host(), 0))
            .await
            .ok()?
            .next()
            .map(|addr| addr.ip())
    }

    /// Fetch and ingest every metric the host's table tracks
    ///
    /// Individual failures are recorded on the host; the host is only lost
    /// when every gateway call failed.
    pub async fn populate(
        &mut self,
        rpc: &dyn RpcGateway,
        scraper: &dyn MetricsGateway,
        policy: &CallPolicy,
    ) -> Result<(), HostError> {
        let mut attempted = 0usize;
        let mut failures: Vec<GatewayError> = Vec::new();

        if let Some(url) = self.rpc_url.clone() {
            for kind in MetricKind::rpc_calls(self.table) {
                let Some(method) = kind.rpc_method() else {
                    continue;
                };
                attempted += 1;

                match policy.run(method.name(), rpc.call(&url, method)).await {
                    Ok(value) => {
                        if let Err(e) = self.metrics.ingest(*kind, value.into()) {
                            self.record_ingest(e);
                        }
                    }
                    Err(e) => {
                        self.errors.push(e.to_string());
                        failures.push(e);
                    }
                }
            }
        }

        if let Some(url) = self.metrics_url.clone() {
            let kinds = MetricKind::scraped(self.table);
            let specs: Vec<MetricSpec> = kinds.iter().filter_map(|k| k.metric_spec()).collect();
            attempted += 1;

            match policy.run("metrics scrape", scraper.scrape(&url, &specs)).await {
                Ok(scraped) => {
                    for kind in kinds {
                        match scraped.get(kind.name()) {
                            Some(metric) => {
                                if let Err(e) = self.metrics.ingest_scraped(*kind, metric) {
                                    self.record_ingest(e);
                                }
                            }
                            None => self.errors.push(
                                GatewayError::MissingMetric {
                                    name: kind.name().to_string(),
                                }
                                .to_string(),
                            ),
                        }
                    }
                }
                Err(e) => {
                    self.errors.push(e.to_string());
                    failures.push(e);
                }
            }
        }

        if attempted > 0 && failures.len() == attempted {
            let failures_count = failures.len();
            let first = failures.swap_remove(0);
            return Err(HostError::Unreachable {
                address: self.address.to_string(),
                failures: failures_count,
                first,
            });
        }

        debug!(
            "{} {}: {} calls, {} failed, {} issues",
            self.table,
            self.address,
            attempted,
            failures.len(),
            self.errors.len()
        );
        Ok(())
    }

    fn record_ingest(&mut self, error: MetricsError) {
        debug!("{} {}: {}", self.table, self.address, error);
        self.errors.push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_follow_table() {
        let address = Address::parse("10.0.0.1")
            .unwrap()
            .with_rpc_port(9000)
            .with_metrics_port(9184);

        let node = Host::new(TableType::Node, address.clone(), Metrics::default()).unwrap();
        assert_eq!(node.rpc_url.as_deref(), Some("http://10.0.0.1:9000"));
        assert_eq!(node.metrics_url.as_deref(), Some("http://10.0.0.1:9184/metrics"));
        assert_eq!(node.status, HostStatus::Grey);

        let rpc = Host::new(TableType::Rpc, address.clone(), Metrics::default()).unwrap();
        assert!(rpc.metrics_url.is_none());

        let validator = Host::new(TableType::Validator, address, Metrics::default()).unwrap();
        assert!(validator.rpc_url.is_none());
    }

    #[test]
    fn test_missing_port_fails_host() {
        let address = Address::parse("/dns/val.example.com/udp/8084").unwrap();
        let err = Host::new(TableType::Validator, address, Metrics::default()).unwrap_err();
        assert!(matches!(
            err,
            HostError::Address {
                source: AddressError::MissingPort { purpose: "metrics", .. },
                ..
            }
        ));
    }
}
