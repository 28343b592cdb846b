//! Monitor Configuration
//!
//! Polling cadence, lag tolerances, geolocation and the endpoint lists of
//! each table. Loaded from TOML, overridden from the command line.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::address::{Address, AddressError, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use crate::collector::GeoMode;
use crate::gas::GasPriceField;
use crate::health::LagTolerance;
use crate::types::TableType;

/// One configured endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// URL, multiaddr or `host[:port]`
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_port: Option<u16>,
}

impl EndpointConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            rpc_port: None,
            metrics_port: None,
            peer_port: None,
        }
    }

    /// Parse the address and fill in the ports `table` needs
    ///
    /// Explicit ports win over ports embedded in the address; missing ones
    /// fall back to the protocol defaults.
    pub fn resolve(&self, table: TableType) -> Result<Address, AddressError> {
        let mut address = Address::parse(&self.address)?;

        match self.rpc_port {
            Some(port) => address = address.with_rpc_port(port),
            None if table.uses_rpc() && address.rpc_port().is_none() => {
                address = address.with_rpc_port(DEFAULT_RPC_PORT)
            }
            None => {}
        }

        match self.metrics_port {
            Some(port) => address = address.with_metrics_port(port),
            None if table.uses_metrics() && address.metrics_port().is_none() => {
                address = address.with_metrics_port(DEFAULT_METRICS_PORT)
            }
            None => {}
        }

        if let Some(port) = self.peer_port {
            address = address.with_peer_port(port);
        }

        Ok(address)
    }
}

/// Geolocation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub mode: GeoMode,

    /// ipinfo.io access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Which tables are polled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    pub rpc: bool,
    pub nodes: bool,
    pub validators: bool,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            rpc: true,
            nodes: true,
            validators: true,
        }
    }
}

/// Main configuration for the fleet monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // === Timing ===

    /// Interval between collection cycles (seconds)
    pub poll_interval_secs: u64,

    /// Deadline of a single gateway call (seconds)
    pub call_timeout_secs: u64,

    /// Samples per rate window
    pub rate_window: usize,

    // === API ===

    /// Port for the HTTP status API
    pub api_port: u16,

    /// Serve the HTTP status API
    pub enable_api: bool,

    // === Statistics ===

    /// Quote the gas price statistics are computed over
    pub gas_price_field: GasPriceField,

    // === Sections ===

    pub tolerance: LagTolerance,
    pub geolocation: GeoConfig,
    pub tables: TablesConfig,

    // === Endpoints ===

    /// Reference RPC endpoints
    pub rpc: Vec<EndpointConfig>,

    /// Full nodes
    pub nodes: Vec<EndpointConfig>,

    /// Validators
    pub validators: Vec<EndpointConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            call_timeout_secs: 5,
            rate_window: 5,
            api_port: 9185,
            enable_api: true,
            gas_price_field: GasPriceField::NextEpoch,
            tolerance: LagTolerance::default(),
            geolocation: GeoConfig::default(),
            tables: TablesConfig::default(),
            rpc: vec![EndpointConfig::new("https://fullnode.mainnet.sui.io:443")],
            nodes: vec![],
            validators: vec![],
        }
    }
}

impl MonitorConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    pub fn with_geo_token(mut self, token: Option<String>) -> Self {
        if token.is_some() {
            self.geolocation.token = token;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn is_enabled(&self, table: TableType) -> bool {
        match table {
            TableType::Rpc => self.tables.rpc,
            TableType::Node => self.tables.nodes,
            TableType::Validator => self.tables.validators,
        }
    }

    /// Tables switched on, reference first
    pub fn active_tables(&self) -> Vec<TableType> {
        TableType::ALL.into_iter().filter(|t| self.is_enabled(*t)).collect()
    }

    pub fn endpoints(&self, table: TableType) -> &[EndpointConfig] {
        match table {
            TableType::Rpc => &self.rpc,
            TableType::Node => &self.nodes,
            TableType::Validator => &self.validators,
        }
    }

    /// Resolved addresses of `table`
    pub fn addresses(&self, table: TableType) -> anyhow::Result<Vec<Address>> {
        self.endpoints(table)
            .iter()
            .map(|endpoint| {
                endpoint
                    .resolve(table)
                    .map_err(|e| anyhow::anyhow!("{} endpoint '{}': {}", table, endpoint.address, e))
            })
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.is_empty() {
            anyhow::bail!("at least one rpc endpoint is required as reference");
        }

        if !self.tables.rpc {
            anyhow::bail!("the rpc table provides the reference host and cannot be disabled");
        }

        if self.rate_window < 2 {
            anyhow::bail!("rate_window ({}) must be at least 2", self.rate_window);
        }

        if self.call_timeout_secs == 0 {
            anyhow::bail!("call_timeout_secs must be greater than zero");
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }

        if self.geolocation.mode == GeoMode::Required && self.geolocation.token.is_none() {
            anyhow::bail!("geolocation mode 'required' needs an access token");
        }

        for table in TableType::ALL {
            self.addresses(table)?;
        }

        Ok(())
    }
}
