//! Metric kinds and their declared wire representation

use serde::Serialize;

use crate::gateway::{MetricSpec, PromType, RpcMethod};
use crate::types::TableType;

/// Representation a metric is expected to arrive in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WireFormat {
    /// Decimal integer inside a JSON string ("1234567")
    IntegerString,

    /// Prometheus sample value
    Float,

    /// Free text (label values)
    Text,

    /// Structured JSON object
    Object,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::IntegerString => write!(f, "integer string"),
            WireFormat::Float => write!(f, "float"),
            WireFormat::Text => write!(f, "text"),
            WireFormat::Object => write!(f, "object"),
        }
    }
}

/// Series that feed a rate window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RateSeries {
    Transactions,
    Checkpoints,
    SyncedCheckpoints,
    Rounds,
    Certificates,
}

/// Every metric the aggregator knows how to ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MetricKind {
    // RPC
    TotalTransactionBlocks,
    LatestCheckpoint,
    SystemState,
    ValidatorsApy,

    // Prometheus
    Uptime,
    Version,
    Commit,
    HighestKnownCheckpoint,
    HighestSyncedCheckpoint,
    LastExecutedCheckpoint,
    TotalTransactionCertificates,
    TotalTransactionEffects,
    CurrentRound,
    HighestProcessedRound,
    LastCommittedRound,
    NetworkPeers,
    KnownPeers,
    CertificatesCreated,
    ConsensusCommitLatency,
}

const RPC_TABLE_CALLS: &[MetricKind] = &[
    MetricKind::TotalTransactionBlocks,
    MetricKind::LatestCheckpoint,
    MetricKind::SystemState,
    MetricKind::ValidatorsApy,
];

const NODE_RPC_CALLS: &[MetricKind] = &[MetricKind::TotalTransactionBlocks, MetricKind::LatestCheckpoint];

const NODE_SCRAPED: &[MetricKind] = &[
    MetricKind::Uptime,
    MetricKind::HighestKnownCheckpoint,
    MetricKind::HighestSyncedCheckpoint,
    MetricKind::LastExecutedCheckpoint,
    MetricKind::TotalTransactionCertificates,
    MetricKind::TotalTransactionEffects,
    MetricKind::NetworkPeers,
    MetricKind::KnownPeers,
];

const VALIDATOR_SCRAPED: &[MetricKind] = &[
    MetricKind::Uptime,
    MetricKind::HighestSyncedCheckpoint,
    MetricKind::LastExecutedCheckpoint,
    MetricKind::CurrentRound,
    MetricKind::HighestProcessedRound,
    MetricKind::LastCommittedRound,
    MetricKind::CertificatesCreated,
    MetricKind::NetworkPeers,
    MetricKind::ConsensusCommitLatency,
];

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::TotalTransactionBlocks => "total_transaction_blocks",
            MetricKind::LatestCheckpoint => "latest_checkpoint",
            MetricKind::SystemState => "system_state",
            MetricKind::ValidatorsApy => "validators_apy",
            MetricKind::Uptime => "uptime",
            MetricKind::Version => "version",
            MetricKind::Commit => "commit",
            MetricKind::HighestKnownCheckpoint => "highest_known_checkpoint",
            MetricKind::HighestSyncedCheckpoint => "highest_synced_checkpoint",
            MetricKind::LastExecutedCheckpoint => "last_executed_checkpoint",
            MetricKind::TotalTransactionCertificates => "total_transaction_certificates",
            MetricKind::TotalTransactionEffects => "total_transaction_effects",
            MetricKind::CurrentRound => "current_round",
            MetricKind::HighestProcessedRound => "highest_processed_round",
            MetricKind::LastCommittedRound => "last_committed_round",
            MetricKind::NetworkPeers => "sui_network_peers",
            MetricKind::KnownPeers => "sui_network_known_peers",
            MetricKind::CertificatesCreated => "certificates_created",
            MetricKind::ConsensusCommitLatency => "consensus_commit_latency",
        }
    }

    /// Expected representation on the wire
    pub fn wire_format(&self) -> WireFormat {
        match self {
            MetricKind::TotalTransactionBlocks | MetricKind::LatestCheckpoint => WireFormat::IntegerString,
            MetricKind::SystemState | MetricKind::ValidatorsApy => WireFormat::Object,
            MetricKind::Version | MetricKind::Commit => WireFormat::Text,
            MetricKind::Uptime
            | MetricKind::HighestKnownCheckpoint
            | MetricKind::HighestSyncedCheckpoint
            | MetricKind::LastExecutedCheckpoint
            | MetricKind::TotalTransactionCertificates
            | MetricKind::TotalTransactionEffects
            | MetricKind::CurrentRound
            | MetricKind::HighestProcessedRound
            | MetricKind::LastCommittedRound
            | MetricKind::NetworkPeers
            | MetricKind::KnownPeers
            | MetricKind::CertificatesCreated
            | MetricKind::ConsensusCommitLatency => WireFormat::Float,
        }
    }

    /// Window fed by this metric, if any
    pub fn rate_series(&self) -> Option<RateSeries> {
        match self {
            MetricKind::TotalTransactionBlocks => Some(RateSeries::Transactions),
            MetricKind::LatestCheckpoint => Some(RateSeries::Checkpoints),
            MetricKind::HighestSyncedCheckpoint => Some(RateSeries::SyncedCheckpoints),
            MetricKind::CurrentRound => Some(RateSeries::Rounds),
            MetricKind::TotalTransactionCertificates | MetricKind::CertificatesCreated => {
                Some(RateSeries::Certificates)
            }
            _ => None,
        }
    }

    /// RPC method serving this metric
    pub fn rpc_method(&self) -> Option<RpcMethod> {
        match self {
            MetricKind::TotalTransactionBlocks => Some(RpcMethod::TotalTransactionBlocks),
            MetricKind::LatestCheckpoint => Some(RpcMethod::LatestCheckpointSequenceNumber),
            MetricKind::SystemState => Some(RpcMethod::LatestSystemState),
            MetricKind::ValidatorsApy => Some(RpcMethod::ValidatorsApy),
            _ => None,
        }
    }

    /// Prometheus series serving this metric
    pub fn metric_spec(&self) -> Option<MetricSpec> {
        let spec = match self {
            MetricKind::Uptime => MetricSpec::new(self.name(), PromType::Counter),
            MetricKind::TotalTransactionCertificates
            | MetricKind::TotalTransactionEffects
            | MetricKind::CertificatesCreated => MetricSpec::new(self.name(), PromType::Counter),
            MetricKind::HighestProcessedRound => {
                MetricSpec::new(self.name(), PromType::Gauge).with_label("source", "own")
            }
            MetricKind::HighestKnownCheckpoint
            | MetricKind::HighestSyncedCheckpoint
            | MetricKind::LastExecutedCheckpoint
            | MetricKind::CurrentRound
            | MetricKind::LastCommittedRound
            | MetricKind::NetworkPeers
            | MetricKind::KnownPeers => MetricSpec::new(self.name(), PromType::Gauge),
            MetricKind::ConsensusCommitLatency => MetricSpec::new(self.name(), PromType::Summary),
            _ => return None,
        };
        Some(spec)
    }

    /// Kinds fetched over RPC for a table, in ingest order
    pub fn rpc_calls(table: TableType) -> &'static [MetricKind] {
        match table {
            TableType::Rpc => RPC_TABLE_CALLS,
            TableType::Node => NODE_RPC_CALLS,
            TableType::Validator => &[],
        }
    }

    /// Kinds scraped from Prometheus for a table
    pub fn scraped(table: TableType) -> &'static [MetricKind] {
        match table {
            TableType::Rpc => &[],
            TableType::Node => NODE_SCRAPED,
            TableType::Validator => VALIDATOR_SCRAPED,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
