// Collector and controller scenarios against in-memory gateways

pub mod collector;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::gateway::{GatewayError, GeoGateway, MetricSpec, MetricsGateway, RpcGateway, RpcMethod, ScrapedMetric};
use crate::types::GeoInfo;

// ===== FAKE GATEWAYS =====

/// Scripted JSON-RPC endpoints
#[derive(Default)]
pub struct FakeRpc {
    responses: Mutex<HashMap<String, HashMap<RpcMethod, Value>>>,
    down: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    exploding: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

impl FakeRpc {
    pub fn set(&self, endpoint: &str, method: RpcMethod, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .insert(method, value);
    }

    /// Serve chain progress counters the way a node does
    pub fn chain(&self, endpoint: &str, transactions: u64, checkpoint: u64) {
        self.set(endpoint, RpcMethod::TotalTransactionBlocks, json!(transactions.to_string()));
        self.set(
            endpoint,
            RpcMethod::LatestCheckpointSequenceNumber,
            json!(checkpoint.to_string()),
        );
    }

    pub fn take_down(&self, endpoint: &str) {
        self.down.lock().unwrap().insert(endpoint.to_string());
    }

    pub fn bring_up(&self, endpoint: &str) {
        self.down.lock().unwrap().remove(endpoint);
    }

    pub fn hang(&self, endpoint: &str) {
        self.hanging.lock().unwrap().insert(endpoint.to_string());
    }

    /// Panic inside the collector task that calls `endpoint`
    pub fn explode(&self, endpoint: &str) {
        self.exploding.lock().unwrap().insert(endpoint.to_string());
    }
}

#[async_trait]
impl RpcGateway for FakeRpc {
    async fn call(&self, endpoint: &str, method: RpcMethod) -> Result<Value, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hanging.lock().unwrap().contains(endpoint) {
            futures::future::pending::<()>().await;
        }

        let exploding = self.exploding.lock().unwrap().contains(endpoint);
        if exploding {
            panic!("{} exploded", endpoint);
        }

        if self.down.lock().unwrap().contains(endpoint) {
            return Err(GatewayError::Transport {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            });
        }

        self.responses
            .lock()
            .unwrap()
            .get(endpoint)
            .and_then(|methods| methods.get(&method))
            .cloned()
            .ok_or_else(|| GatewayError::EmptyResult {
                method: method.name().to_string(),
            })
    }
}

/// Scripted Prometheus endpoints
#[derive(Default)]
pub struct FakeScraper {
    series: Mutex<HashMap<String, HashMap<String, ScrapedMetric>>>,
    down: Mutex<HashSet<String>>,
}

impl FakeScraper {
    pub fn set(&self, endpoint: &str, name: &str, value: f64) {
        self.set_labeled(endpoint, name, value, &[]);
    }

    pub fn set_labeled(&self, endpoint: &str, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.series.lock().unwrap().entry(endpoint.to_string()).or_default().insert(
            name.to_string(),
            ScrapedMetric {
                value,
                labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            },
        );
    }

    pub fn take_down(&self, endpoint: &str) {
        self.down.lock().unwrap().insert(endpoint.to_string());
    }

    pub fn bring_up(&self, endpoint: &str) {
        self.down.lock().unwrap().remove(endpoint);
    }
}

#[async_trait]
impl MetricsGateway for FakeScraper {
    async fn scrape(
        &self,
        endpoint: &str,
        specs: &[MetricSpec],
    ) -> Result<HashMap<String, ScrapedMetric>, GatewayError> {
        if self.down.lock().unwrap().contains(endpoint) {
            return Err(GatewayError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            });
        }

        let series = self.series.lock().unwrap();
        let available = series.get(endpoint).cloned().unwrap_or_default();
        Ok(specs
            .iter()
            .filter_map(|spec| available.get(spec.name).map(|m| (spec.name.to_string(), m.clone())))
            .collect())
    }
}

/// Geolocation that only knows a fixed set of IPs
#[derive(Default)]
pub struct FakeGeo {
    known: HashMap<IpAddr, GeoInfo>,
}

impl FakeGeo {
    pub fn with(mut self, ip: &str, country_code: &str) -> Self {
        self.known.insert(
            ip.parse().unwrap(),
            GeoInfo {
                country_code: country_code.to_string(),
                country_name: country_code.to_string(),
                flag: crate::gateway::flag_glyph(country_code),
                organization: "Test Hosting".to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl GeoGateway for FakeGeo {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GatewayError> {
        self.known.get(&ip).cloned().ok_or_else(|| GatewayError::Status {
            endpoint: ip.to_string(),
            status: 404,
        })
    }
}

// ===== FIXTURES =====

/// System state whose epoch started an hour ago and lasts a day
pub fn system_state(validators: &[(&str, u64, u64, u128)]) -> Value {
    let start = Utc::now() - ChronoDuration::hours(1);
    let active: Vec<Value> = validators
        .iter()
        .map(|(address, power, price, stake)| {
            json!({
                "suiAddress": address,
                "name": format!("validator-{}", address),
                "votingPower": power.to_string(),
                "gasPrice": price.to_string(),
                "nextEpochGasPrice": price.to_string(),
                "stakingPoolSuiBalance": stake.to_string(),
                "nextEpochStake": stake.to_string(),
            })
        })
        .collect();

    json!({
        "epoch": "42",
        "protocolVersion": "70",
        "referenceGasPrice": "750",
        "epochStartTimestampMs": start.timestamp_millis().to_string(),
        "epochDurationMs": "86400000",
        "activeValidators": active,
        "atRiskValidators": [],
        "validatorReportRecords": [["0xc", ["0xa", "0xb"]]],
    })
}

pub fn validators_apy() -> Value {
    json!({
        "apys": [{"address": "0xa", "apy": 0.028}, {"address": "0xb", "apy": 0.031}],
        "epoch": "42",
    })
}
