//! Core types shared by the collector, aggregator and classifier
//!
//! Tables are a closed set: adding one is a compile-time change that every
//! exhaustive match in the crate has to acknowledge.

use serde::{Deserialize, Serialize};

// =============================================================================
// TABLES
// =============================================================================

/// Category of polled participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// Trusted public RPC endpoints; one of them becomes the reference host
    Rpc,

    /// Full nodes exposing both RPC and metrics
    Node,

    /// Validators, usually exposing metrics only
    Validator,
}

impl TableType {
    /// All tables in polling order (reference first)
    pub const ALL: [TableType; 3] = [TableType::Rpc, TableType::Node, TableType::Validator];

    /// Does this table fetch data over JSON-RPC?
    pub fn uses_rpc(&self) -> bool {
        match self {
            TableType::Rpc | TableType::Node => true,
            TableType::Validator => false,
        }
    }

    /// Does this table scrape a Prometheus endpoint?
    pub fn uses_metrics(&self) -> bool {
        match self {
            TableType::Rpc => false,
            TableType::Node | TableType::Validator => true,
        }
    }

    /// Is this the mandatory reference table?
    pub fn is_reference(&self) -> bool {
        matches!(self, TableType::Rpc)
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableType::Rpc => write!(f, "rpc"),
            TableType::Node => write!(f, "node"),
            TableType::Validator => write!(f, "validator"),
        }
    }
}

// =============================================================================
// HEALTH STATUS
// =============================================================================

/// Health verdict for a single host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Never classified yet
    #[default]
    Grey,

    /// Healthy and keeping up with the reference
    Green,

    /// Alive but lagging behind the reference
    Yellow,

    /// Not reporting, stalled, or reporting impossible values
    Red,
}

impl HostStatus {
    /// Is the host considered usable?
    pub fn is_healthy(&self) -> bool {
        matches!(self, HostStatus::Green | HostStatus::Yellow)
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostStatus::Grey => write!(f, "grey"),
            HostStatus::Green => write!(f, "green"),
            HostStatus::Yellow => write!(f, "yellow"),
            HostStatus::Red => write!(f, "red"),
        }
    }
}

// =============================================================================
// GEOLOCATION
// =============================================================================

/// Location details resolved for a host IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// ISO 3166-1 alpha-2 code ("DE")
    pub country_code: String,

    /// Human readable country name
    pub country_name: String,

    /// Regional indicator flag glyph
    pub flag: String,

    /// Hosting organisation / ASN owner
    pub organization: String,
}
