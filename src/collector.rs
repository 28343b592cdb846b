//! Host Collector
//!
//! Fans out one task per unique address of a table, gathers the resulting
//! hosts through a bounded channel and reports per-address failures without
//! failing the whole collection.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::address::Address;
use crate::gateway::{CallPolicy, GeoGateway, MetricsGateway, RpcGateway, DEFAULT_CALL_TIMEOUT};
use crate::host::{Host, HostError};
use crate::metrics::{Metrics, DEFAULT_RATE_WINDOW};
use crate::types::TableType;

/// How geolocation failures affect a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoMode {
    /// No lookups
    #[default]
    Disabled,

    /// Look up, keep the host when the lookup fails
    BestEffort,

    /// A failed lookup drops the host
    Required,
}

/// Collection failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectError {
    #[error("no {table} hosts collected ({} failures)", errors.len())]
    NoHosts {
        table: TableType,
        errors: Vec<HostError>,

        /// Carried metrics of the failed addresses, keyed by address key
        retained: HashMap<String, Metrics>,
    },
}

impl CollectError {
    /// Carried metrics to hand to the next cycle
    pub fn into_retained(self) -> HashMap<String, Metrics> {
        match self {
            CollectError::NoHosts { retained, .. } => retained,
        }
    }
}

/// Hosts built for a table plus the addresses that failed
#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub hosts: Vec<Host>,
    pub errors: Vec<HostError>,

    /// Carried metrics of addresses that produced no host, keyed by address key
    pub retained: HashMap<String, Metrics>,
}

/// A failed address, with the metrics it carried when there were any
type HostResult = Result<Host, (HostError, Option<(String, Metrics)>)>;

/// Concurrent per-address acquisition
#[derive(Clone)]
pub struct HostCollector {
    rpc: Arc<dyn RpcGateway>,
    scraper: Arc<dyn MetricsGateway>,
    geo: Option<Arc<dyn GeoGateway>>,
    geo_mode: GeoMode,
    call_timeout: Duration,
    window_size: usize,
}

impl HostCollector {
    pub fn new(rpc: Arc<dyn RpcGateway>, scraper: Arc<dyn MetricsGateway>) -> Self {
        Self {
            rpc,
            scraper,
            geo: None,
            geo_mode: GeoMode::Disabled,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            window_size: DEFAULT_RATE_WINDOW,
        }
    }

    pub fn with_geolocation(mut self, geo: Arc<dyn GeoGateway>, mode: GeoMode) -> Self {
        self.geo = Some(geo);
        self.geo_mode = mode;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Collect every unique address of `table`
    ///
    /// `carried` holds the previous cycle's metrics keyed by address key;
    /// matching entries are moved into their host and come back in
    /// `retained` when the host fails.
    pub async fn collect(
        &self,
        table: TableType,
        addresses: &[Address],
        mut carried: HashMap<String, Metrics>,
        cancel: &CancellationToken,
    ) -> Result<CollectOutcome, CollectError> {
        let mut seen = HashSet::with_capacity(addresses.len());
        let unique: Vec<&Address> = addresses
            .iter()
            .filter(|address| {
                let fresh = seen.insert(address.key());
                if !fresh {
                    debug!("Skipping duplicate {} address {}", table, address);
                }
                fresh
            })
            .collect();

        if unique.is_empty() {
            return Err(CollectError::NoHosts {
                table,
                errors: Vec::new(),
                retained: HashMap::new(),
            });
        }

        let policy = CallPolicy::new(self.call_timeout, cancel.clone());
        let (tx, mut rx) = mpsc::channel(unique.len());

        let (labels, handles): (Vec<String>, Vec<_>) = unique
            .into_iter()
            .map(|address| {
                let collector = self.clone();
                let policy = policy.clone();
                let tx = tx.clone();
                let address = address.clone();
                let metrics = carried
                    .remove(&address.key())
                    .unwrap_or_else(|| Metrics::new(self.window_size));

                let label = address.to_string();
                let handle = tokio::spawn(async move {
                    let result = collector.collect_host(table, address, metrics, &policy).await;
                    // Capacity equals the task count, so this never waits
                    let _ = tx.send(result).await;
                });
                (label, handle)
            })
            .unzip();

        let mut aborted = Vec::new();
        for (address, joined) in labels.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                warn!("⚠️  {} collector task for {} aborted: {}", table, address, e);
                aborted.push(HostError::Aborted {
                    address,
                    reason: e.to_string(),
                });
            }
        }
        drop(tx);

        let mut outcome = CollectOutcome::default();
        while let Some(result) = rx.recv().await {
            match result {
                Ok(host) => outcome.hosts.push(host),
                Err((e, carried)) => {
                    if let Some((key, metrics)) = carried {
                        outcome.retained.insert(key, metrics);
                    }
                    outcome.errors.push(e);
                }
            }
        }
        outcome.errors.extend(aborted);

        if outcome.hosts.is_empty() {
            return Err(CollectError::NoHosts {
                table,
                errors: outcome.errors,
                retained: outcome.retained,
            });
        }

        debug!(
            "Collected {} {} hosts ({} failed)",
            outcome.hosts.len(),
            table,
            outcome.errors.len()
        );
        Ok(outcome)
    }

    async fn collect_host(
        &self,
        table: TableType,
        address: Address,
        metrics: Metrics,
        policy: &CallPolicy,
    ) -> HostResult {
        // Without derivable URLs the address never produced windows to keep
        let mut host = Host::new(table, address, metrics).map_err(|e| (e, None))?;

        if let Some(geo) = &self.geo {
            match self.geo_mode {
                GeoMode::Disabled => {}
                GeoMode::BestEffort => {
                    if let Err(e) = host.locate(geo.as_ref(), policy).await {
                        debug!("{}", e);
                        host.errors.push(e.to_string());
                    }
                }
                GeoMode::Required => {
                    if let Err(e) = host.locate(geo.as_ref(), policy).await {
                        return Err((e, Some(host.into_carried())));
                    }
                }
            }
        }

        if let Err(e) = host.populate(self.rpc.as_ref(), self.scraper.as_ref(), policy).await {
            return Err((e, Some(host.into_carried())));
        }
        Ok(host)
    }
}
