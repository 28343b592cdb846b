//! Metrics Aggregator
//!
//! Per-host typed metric state. Raw gateway values enter through
//! [`Metrics::ingest`], which checks them against the representation each
//! [`MetricKind`] declares, converts them once and feeds the rate windows.
//! Derived values (backlogs, progress percentages, formatted uptime) are
//! maintained alongside the raw counters.

pub mod kind;
pub mod window;

pub use kind::{MetricKind, RateSeries, WireFormat};
pub use window::RateWindow;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gateway::ScrapedMetric;
use crate::system_state::{EpochInfo, SystemState, SystemStateError, ValidatorsApy};

/// Default rate window length, in samples
pub const DEFAULT_RATE_WINDOW: usize = 5;

/// Label carrying `<version>-<commit>` on the uptime series
const VERSION_LABEL: &str = "version";

// =============================================================================
// VALUES
// =============================================================================

/// A raw value as delivered by a gateway
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Text(String),
    Number(f64),
    Object(serde_json::Value),
}

impl WireValue {
    fn type_name(&self) -> &'static str {
        match self {
            WireValue::Text(_) => "text",
            WireValue::Number(_) => "number",
            WireValue::Object(_) => "object",
        }
    }
}

impl From<serde_json::Value> for WireValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => WireValue::Text(s),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => WireValue::Number(f),
                None => WireValue::Text(n.to_string()),
            },
            other => WireValue::Object(other),
        }
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Number(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::Text(value.to_string())
    }
}

/// Metric ingest / derivation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    #[error("{metric}: expected {expected}, got {found}")]
    UnexpectedType {
        metric: MetricKind,
        expected: WireFormat,
        found: &'static str,
    },

    #[error("{metric}: cannot parse '{raw}'")]
    Parse { metric: MetricKind, raw: String },

    #[error("{metric}: failed to decode: {message}")]
    Decode { metric: MetricKind, message: String },

    #[error("{metric}: reference value is zero")]
    ZeroReference { metric: MetricKind },

    #[error("{metric} is not an integer metric")]
    NotInteger { metric: MetricKind },

    #[error("validator APYs received before the system state")]
    MissingSystemState,

    #[error("{0}")]
    SystemState(#[from] SystemStateError),
}

/// `min(100, round(100 · own / reference))`
pub fn progress_percentage(own: u64, reference: u64, metric: MetricKind) -> Result<u64, MetricsError> {
    Ok(raw_percentage(own, reference, metric)?.min(100))
}

fn raw_percentage(own: u64, reference: u64, metric: MetricKind) -> Result<u64, MetricsError> {
    if reference == 0 {
        return Err(MetricsError::ZeroReference { metric });
    }

    let scaled = own as u128 * 100;
    let rounded = (2 * scaled + reference as u128) / (2 * reference as u128);
    Ok(u64::try_from(rounded).unwrap_or(u64::MAX))
}

/// `"Xd Yh Zm"`, dropping leading zero units
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// Split `<version>-<commit>`; the version itself never contains a dash
pub fn split_version(label: &str) -> (&str, &str) {
    match label.split_once('-') {
        Some((version, commit)) => (version, commit),
        None => (label, ""),
    }
}

// =============================================================================
// WINDOWS
// =============================================================================

/// One window per rate series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateWindows {
    pub transactions: RateWindow,
    pub checkpoints: RateWindow,
    pub synced_checkpoints: RateWindow,
    pub rounds: RateWindow,
    pub certificates: RateWindow,
}

impl RateWindows {
    pub fn new(capacity: usize) -> Self {
        Self {
            transactions: RateWindow::new(capacity),
            checkpoints: RateWindow::new(capacity),
            synced_checkpoints: RateWindow::new(capacity),
            rounds: RateWindow::new(capacity),
            certificates: RateWindow::new(capacity),
        }
    }

    pub fn get(&self, series: RateSeries) -> &RateWindow {
        match series {
            RateSeries::Transactions => &self.transactions,
            RateSeries::Checkpoints => &self.checkpoints,
            RateSeries::SyncedCheckpoints => &self.synced_checkpoints,
            RateSeries::Rounds => &self.rounds,
            RateSeries::Certificates => &self.certificates,
        }
    }

    fn get_mut(&mut self, series: RateSeries) -> &mut RateWindow {
        match series {
            RateSeries::Transactions => &mut self.transactions,
            RateSeries::Checkpoints => &mut self.checkpoints,
            RateSeries::SyncedCheckpoints => &mut self.synced_checkpoints,
            RateSeries::Rounds => &mut self.rounds,
            RateSeries::Certificates => &mut self.certificates,
        }
    }
}

// =============================================================================
// METRICS
// =============================================================================

/// Typed metrics of one host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    /// Set by the first successful ingest of a cycle
    pub updated: bool,
    pub updated_at: Option<DateTime<Utc>>,

    pub total_transaction_blocks: u64,
    pub total_transaction_certificates: u64,
    pub total_transaction_effects: u64,

    pub latest_checkpoint: u64,
    pub highest_known_checkpoint: u64,
    pub highest_synced_checkpoint: u64,
    pub last_executed_checkpoint: u64,
    pub checkpoint_sync_backlog: u64,
    pub checkpoint_exec_backlog: u64,

    pub current_round: u64,
    pub highest_processed_round: u64,
    pub last_committed_round: u64,
    pub certificates_created: u64,
    pub consensus_commit_latency_sum: f64,

    pub network_peers: u64,
    pub known_peers: u64,

    pub uptime: String,
    pub version: String,
    pub commit: String,

    pub tx_sync_percentage: u64,
    pub tx_sync_raw_percentage: u64,
    pub checkpoint_sync_percentage: u64,
    pub checkpoint_sync_raw_percentage: u64,

    pub windows: RateWindows,

    pub system_state: Option<SystemState>,
    pub epoch: Option<EpochInfo>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW)
    }
}

impl Metrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            updated: false,
            updated_at: None,
            total_transaction_blocks: 0,
            total_transaction_certificates: 0,
            total_transaction_effects: 0,
            latest_checkpoint: 0,
            highest_known_checkpoint: 0,
            highest_synced_checkpoint: 0,
            last_executed_checkpoint: 0,
            checkpoint_sync_backlog: 0,
            checkpoint_exec_backlog: 0,
            current_round: 0,
            highest_processed_round: 0,
            last_committed_round: 0,
            certificates_created: 0,
            consensus_commit_latency_sum: 0.0,
            network_peers: 0,
            known_peers: 0,
            uptime: String::new(),
            version: String::new(),
            commit: String::new(),
            tx_sync_percentage: 0,
            tx_sync_raw_percentage: 0,
            checkpoint_sync_percentage: 0,
            checkpoint_sync_raw_percentage: 0,
            windows: RateWindows::new(window_size),
            system_state: None,
            epoch: None,
        }
    }

    /// Fresh metrics for the next cycle, keeping the rate windows
    pub fn carry_forward(self) -> Self {
        Self {
            windows: self.windows,
            ..Self::new(DEFAULT_RATE_WINDOW)
        }
    }

    /// Ingest one raw value
    pub fn ingest(&mut self, kind: MetricKind, value: WireValue) -> Result<(), MetricsError> {
        self.ingest_at(kind, value, Utc::now())
    }

    /// Ingest one raw value, deriving epoch timing relative to `now`
    pub fn ingest_at(&mut self, kind: MetricKind, value: WireValue, now: DateTime<Utc>) -> Result<(), MetricsError> {
        let expected = kind.wire_format();

        match (expected, value) {
            (WireFormat::IntegerString, WireValue::Text(raw)) => {
                let parsed = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| MetricsError::Parse { metric: kind, raw })?;
                self.store_integer(kind, parsed);
            }
            (WireFormat::Float, WireValue::Number(raw)) => {
                if !raw.is_finite() || raw < 0.0 {
                    return Err(MetricsError::Parse {
                        metric: kind,
                        raw: raw.to_string(),
                    });
                }
                if kind == MetricKind::ConsensusCommitLatency {
                    self.consensus_commit_latency_sum = raw;
                } else if kind == MetricKind::Uptime {
                    self.uptime = format_uptime(raw as u64);
                } else {
                    self.store_integer(kind, raw as u64);
                }
            }
            (WireFormat::Text, WireValue::Text(raw)) => match kind {
                MetricKind::Version => self.version = raw,
                MetricKind::Commit => self.commit = raw,
                _ => return Err(MetricsError::NotInteger { metric: kind }),
            },
            (WireFormat::Object, WireValue::Object(raw)) => self.ingest_object(kind, raw, now)?,
            (expected, found) => {
                return Err(MetricsError::UnexpectedType {
                    metric: kind,
                    expected,
                    found: found.type_name(),
                })
            }
        }

        self.updated = true;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Ingest a scraped Prometheus series; the uptime series also carries
    /// the version label
    pub fn ingest_scraped(&mut self, kind: MetricKind, scraped: &ScrapedMetric) -> Result<(), MetricsError> {
        self.ingest(kind, WireValue::Number(scraped.value))?;

        if kind == MetricKind::Uptime {
            if let Some(label) = scraped.labels.get(VERSION_LABEL) {
                let (version, commit) = split_version(label);
                self.ingest(MetricKind::Version, version.into())?;
                self.ingest(MetricKind::Commit, commit.into())?;
            }
        }
        Ok(())
    }

    fn ingest_object(&mut self, kind: MetricKind, raw: serde_json::Value, now: DateTime<Utc>) -> Result<(), MetricsError> {
        match kind {
            MetricKind::SystemState => {
                let state: SystemState = serde_json::from_value(raw).map_err(|e| MetricsError::Decode {
                    metric: kind,
                    message: e.to_string(),
                })?;

                // Keep the snapshot for gas statistics even if its epoch is stale
                let epoch = state.epoch_info(now);
                self.system_state = Some(state);
                self.epoch = Some(epoch?);
            }
            MetricKind::ValidatorsApy => {
                let apys: ValidatorsApy = serde_json::from_value(raw).map_err(|e| MetricsError::Decode {
                    metric: kind,
                    message: e.to_string(),
                })?;
                self.system_state
                    .as_mut()
                    .ok_or(MetricsError::MissingSystemState)?
                    .set_apys(apys);
            }
            _ => return Err(MetricsError::NotInteger { metric: kind }),
        }
        Ok(())
    }

    fn store_integer(&mut self, kind: MetricKind, value: u64) {
        match kind {
            MetricKind::TotalTransactionBlocks => self.total_transaction_blocks = value,
            MetricKind::LatestCheckpoint => self.latest_checkpoint = value,
            MetricKind::HighestKnownCheckpoint => self.highest_known_checkpoint = value,
            MetricKind::HighestSyncedCheckpoint => self.highest_synced_checkpoint = value,
            MetricKind::LastExecutedCheckpoint => self.last_executed_checkpoint = value,
            MetricKind::TotalTransactionCertificates => self.total_transaction_certificates = value,
            MetricKind::TotalTransactionEffects => self.total_transaction_effects = value,
            MetricKind::CurrentRound => self.current_round = value,
            MetricKind::HighestProcessedRound => self.highest_processed_round = value,
            MetricKind::LastCommittedRound => self.last_committed_round = value,
            MetricKind::NetworkPeers => self.network_peers = value,
            MetricKind::KnownPeers => self.known_peers = value,
            MetricKind::CertificatesCreated => self.certificates_created = value,
            _ => return,
        }

        if let Some(series) = kind.rate_series() {
            self.windows.get_mut(series).push(value);
        }

        self.checkpoint_sync_backlog = self
            .highest_known_checkpoint
            .saturating_sub(self.highest_synced_checkpoint);
        self.checkpoint_exec_backlog = self
            .highest_synced_checkpoint
            .saturating_sub(self.last_executed_checkpoint);
    }

    /// Integer value of `kind`
    pub fn integer(&self, kind: MetricKind) -> Result<u64, MetricsError> {
        let value = match kind {
            MetricKind::TotalTransactionBlocks => self.total_transaction_blocks,
            MetricKind::LatestCheckpoint => self.latest_checkpoint,
            MetricKind::HighestKnownCheckpoint => self.highest_known_checkpoint,
            MetricKind::HighestSyncedCheckpoint => self.highest_synced_checkpoint,
            MetricKind::LastExecutedCheckpoint => self.last_executed_checkpoint,
            MetricKind::TotalTransactionCertificates => self.total_transaction_certificates,
            MetricKind::TotalTransactionEffects => self.total_transaction_effects,
            MetricKind::CurrentRound => self.current_round,
            MetricKind::HighestProcessedRound => self.highest_processed_round,
            MetricKind::LastCommittedRound => self.last_committed_round,
            MetricKind::NetworkPeers => self.network_peers,
            MetricKind::KnownPeers => self.known_peers,
            MetricKind::CertificatesCreated => self.certificates_created,
            _ => return Err(MetricsError::NotInteger { metric: kind }),
        };
        Ok(value)
    }

    /// Refresh tx-sync and checkpoint-sync percentages against `reference`
    ///
    /// Both are attempted; the first failure is returned.
    pub fn update_progress(&mut self, reference: &Metrics) -> Result<(), MetricsError> {
        let tx = self.sync_ratio(MetricKind::TotalTransactionBlocks, reference);
        if let Ok((clamped, raw)) = tx {
            self.tx_sync_percentage = clamped;
            self.tx_sync_raw_percentage = raw;
        }

        let checkpoint = self.sync_ratio(MetricKind::LatestCheckpoint, reference);
        if let Ok((clamped, raw)) = checkpoint {
            self.checkpoint_sync_percentage = clamped;
            self.checkpoint_sync_raw_percentage = raw;
        }

        tx.and(checkpoint).map(|_| ())
    }

    fn sync_ratio(&self, kind: MetricKind, reference: &Metrics) -> Result<(u64, u64), MetricsError> {
        let (own, reference) = (self.integer(kind)?, reference.integer(kind)?);
        Ok((
            progress_percentage(own, reference, kind)?,
            raw_percentage(own, reference, kind)?,
        ))
    }

    pub fn rate(&self, series: RateSeries) -> u64 {
        self.windows.get(series).rate()
    }

    pub fn transactions_per_second(&self) -> u64 {
        self.rate(RateSeries::Transactions)
    }

    pub fn checkpoints_per_second(&self) -> u64 {
        self.rate(RateSeries::Checkpoints)
    }
}
