//! Fleet Monitor
//!
//! Polls a fleet of full nodes, validators and reference RPC endpoints,
//! classifies every host against the most advanced reference host and
//! derives the validator set's reference gas price statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FLEET MONITOR                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Controller        ←── one cycle per poll interval         │
//! │  HostCollector     ←── one task per address, per table     │
//! │  Metrics           ←── typed ingest, rate windows          │
//! │  classify          ←── Green / Yellow / Red per host       │
//! │  gas               ←── reference gas price statistics      │
//! │  HTTP API          ←── status, report and telemetry        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod address;
pub mod api;
pub mod collector;
pub mod config;
pub mod controller;
pub mod gas;
pub mod gateway;
pub mod health;
pub mod host;
pub mod metrics;
pub mod system_state;
pub mod types;

#[cfg(test)]
mod tests;

pub use address::Address;
pub use collector::{CollectError, CollectOutcome, GeoMode, HostCollector};
pub use config::MonitorConfig;
pub use controller::{Controller, CycleError, CycleReport, FleetState, SharedFleetState};
pub use gas::{GasPriceField, GasPriceStatistics};
pub use health::{classify, LagTolerance};
pub use host::{Host, HostError};
pub use metrics::{MetricKind, Metrics, MetricsError, WireValue};
pub use types::{HostStatus, TableType};
