//! Health Classifier
//!
//! Turns a host's metrics into a [`HostStatus`] relative to the reference
//! host. Classification is pure; the caller stores the verdict.

use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;
use crate::types::{HostStatus, TableType};

/// Raw sync ratio above which a host is reporting impossible values
const MAX_RAW_SYNC_PERCENTAGE: u64 = 110;

/// How far a host may trail the reference before it turns yellow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagTolerance {
    /// Transactions per window
    pub tps: u64,

    /// Total transaction blocks
    pub transactions: u64,

    /// Latest checkpoint sequence number
    pub checkpoints: u64,
}

impl Default for LagTolerance {
    fn default() -> Self {
        Self {
            tps: 20,
            transactions: 50,
            checkpoints: 30,
        }
    }
}

/// Classify `host` against `reference`
///
/// Never returns [`HostStatus::Grey`]; that is reserved for hosts that were
/// not classified yet.
pub fn classify(host: &Metrics, reference: &Metrics, table: TableType, tolerance: &LagTolerance) -> HostStatus {
    match table {
        TableType::Validator => {
            if !host.updated || host.uptime.is_empty() {
                HostStatus::Red
            } else {
                HostStatus::Green
            }
        }
        TableType::Node | TableType::Rpc => {
            if is_failing(host) {
                HostStatus::Red
            } else if is_lagging(host, reference, tolerance) {
                HostStatus::Yellow
            } else {
                HostStatus::Green
            }
        }
    }
}

fn is_failing(host: &Metrics) -> bool {
    !host.updated
        || host.total_transaction_blocks == 0
        || host.latest_checkpoint == 0
        || host.tx_sync_percentage == 0
        || host.tx_sync_raw_percentage > MAX_RAW_SYNC_PERCENTAGE
        || host.checkpoint_sync_raw_percentage > MAX_RAW_SYNC_PERCENTAGE
        || (host.transactions_per_second() == 0 && host.windows.transactions.is_warmed_up())
}

fn is_lagging(host: &Metrics, reference: &Metrics, tolerance: &LagTolerance) -> bool {
    let behind = |own: u64, reference: u64, allowed: u64| own < reference.saturating_sub(allowed);

    behind(
        host.transactions_per_second(),
        reference.transactions_per_second(),
        tolerance.tps,
    ) || behind(
        host.total_transaction_blocks,
        reference.total_transaction_blocks,
        tolerance.transactions,
    ) || behind(host.latest_checkpoint, reference.latest_checkpoint, tolerance.checkpoints)
}
