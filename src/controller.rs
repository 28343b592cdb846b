//! Cycle Controller
//!
//! Runs one collection cycle at a time: the reference RPC table first, then
//! the remaining active tables concurrently, classification against the
//! chosen reference host, and the gas price statistics of its snapshot.
//!
//! ```text
//! Rpc ──► reference ──┬──► Node hosts ──────► classify
//!                     ├──► Validator hosts ─► classify
//!                     └──► SystemState ─────► gas statistics
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::api::Telemetry;
use crate::collector::{CollectError, CollectOutcome, HostCollector};
use crate::config::MonitorConfig;
use crate::gas::{compute_statistics, GasPriceField, GasPriceStatistics};
use crate::health::{classify, LagTolerance};
use crate::host::Host;
use crate::metrics::Metrics;
use crate::system_state::{EpochInfo, ValidatorReport};
use crate::types::{HostStatus, TableType};

/// Errors that abort a whole cycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("no reference rpc endpoints configured")]
    NoReferenceEndpoints,

    #[error("all tables are disabled")]
    NoActiveTables,

    #[error("reference rpc unavailable: {reason}")]
    ReferenceUnavailable { reason: String },
}

/// Hosts of one table in a cycle
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: TableType,
    pub hosts: Vec<Host>,

    /// Addresses that produced no host
    pub errors: Vec<String>,
}

impl TableReport {
    pub fn count(&self, status: HostStatus) -> usize {
        self.hosts.iter().filter(|h| h.status == status).count()
    }

    /// Hosts graded green or yellow
    pub fn healthy(&self) -> usize {
        self.hosts.iter().filter(|h| h.status.is_healthy()).count()
    }
}

/// Everything learned in one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Address of the reference host
    pub reference: Address,

    /// Tables that produced at least one host
    pub tables: BTreeMap<TableType, TableReport>,

    pub reference_gas_price: Option<u64>,
    pub gas: Option<GasPriceStatistics>,
    pub epoch: Option<EpochInfo>,
    pub validator_reports: Vec<ValidatorReport>,

    /// Non-fatal problems of the cycle
    pub warnings: Vec<String>,
}

impl CycleReport {
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.tables.values().flat_map(|t| t.hosts.iter())
    }
}

/// State shared between the controller and its readers
#[derive(Debug, Default)]
pub struct FleetState {
    /// Tables polled by the next cycle
    pub active_tables: BTreeSet<TableType>,

    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,

    /// Metrics carried into the next cycle, per table and address key
    carried: CarriedMetrics,
}

type CarriedMetrics = HashMap<TableType, HashMap<String, Metrics>>;

impl FleetState {
    pub fn new(active_tables: impl IntoIterator<Item = TableType>) -> Self {
        Self {
            active_tables: active_tables.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Number of addresses with carried rate windows
    pub fn carried_hosts(&self) -> usize {
        self.carried.values().map(HashMap::len).sum()
    }
}

pub type SharedFleetState = Arc<RwLock<FleetState>>;

/// Cycle orchestration
pub struct Controller {
    collector: HostCollector,
    endpoints: BTreeMap<TableType, Vec<Address>>,
    tolerance: LagTolerance,
    gas_field: GasPriceField,
    state: SharedFleetState,
    telemetry: Arc<Telemetry>,
}

impl Controller {
    pub fn new(
        collector: HostCollector,
        endpoints: BTreeMap<TableType, Vec<Address>>,
        state: SharedFleetState,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            collector,
            endpoints,
            tolerance: LagTolerance::default(),
            gas_field: GasPriceField::default(),
            state,
            telemetry,
        }
    }

    /// Build a controller for every table of `config`
    pub fn from_config(
        config: &MonitorConfig,
        collector: HostCollector,
        state: SharedFleetState,
        telemetry: Arc<Telemetry>,
    ) -> anyhow::Result<Self> {
        let mut endpoints = BTreeMap::new();
        for table in TableType::ALL {
            endpoints.insert(table, config.addresses(table)?);
        }

        Ok(Self::new(collector, endpoints, state, telemetry)
            .with_tolerance(config.tolerance)
            .with_gas_price_field(config.gas_price_field))
    }

    pub fn with_tolerance(mut self, tolerance: LagTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_gas_price_field(mut self, field: GasPriceField) -> Self {
        self.gas_field = field;
        self
    }

    pub fn state(&self) -> SharedFleetState {
        Arc::clone(&self.state)
    }

    /// Switch a table on or off for the following cycles
    pub async fn set_table_active(&self, table: TableType, active: bool) {
        let mut state = self.state.write().await;
        if active {
            state.active_tables.insert(table);
        } else {
            state.active_tables.remove(&table);
            state.carried.remove(&table);
        }
    }

    fn addresses(&self, table: TableType) -> &[Address] {
        self.endpoints.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run one full cycle and publish its report
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let result = self.execute(started_at, cancel).await;

        let elapsed = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        self.telemetry.set_last_cycle_ms(elapsed);

        let mut state = self.state.write().await;
        match &result {
            Ok(report) => {
                self.telemetry.inc_cycles_run();
                self.telemetry.set_status_counts(report.hosts().map(|h| &h.status));
                if let (Some(rgp), Some(gas)) = (report.reference_gas_price, &report.gas) {
                    self.telemetry.set_gas_prices(rgp, gas.estimated_next);
                }

                state.last_report = Some(report.clone());
                state.last_error = None;
            }
            Err(e) => {
                self.telemetry.inc_cycles_failed();
                state.last_error = Some(e.to_string());
            }
        }

        result
    }

    async fn execute(&self, started_at: DateTime<Utc>, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        let (active, mut carried) = {
            let mut state = self.state.write().await;
            if state.active_tables.is_empty() {
                return Err(CycleError::NoActiveTables);
            }
            if !state.active_tables.iter().any(TableType::is_reference) || self.addresses(TableType::Rpc).is_empty() {
                return Err(CycleError::NoReferenceEndpoints);
            }
            (state.active_tables.clone(), std::mem::take(&mut state.carried))
        };

        let mut warnings = Vec::new();

        // Reference table
        let rpc = self
            .collector
            .collect(
                TableType::Rpc,
                self.addresses(TableType::Rpc),
                carried.remove(&TableType::Rpc).unwrap_or_default(),
                cancel,
            )
            .await;

        let mut rpc = match rpc {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                carried.insert(TableType::Rpc, e.into_retained());
                self.restore(carried).await;
                return Err(CycleError::ReferenceUnavailable { reason });
            }
        };

        let Some(index) = select_reference(&rpc.hosts) else {
            let reason = format!("none of {} rpc hosts reported chain progress", rpc.hosts.len());
            let mut windows = rpc.retained;
            windows.extend(rpc.hosts.into_iter().map(Host::into_carried));
            carried.insert(TableType::Rpc, windows);
            self.restore(carried).await;
            return Err(CycleError::ReferenceUnavailable { reason });
        };
        let reference = rpc.hosts[index].metrics.clone();
        let reference_address = rpc.hosts[index].address.clone();
        info!(
            "🎯 Reference {} at checkpoint {} ({} transactions, {} tx / {} checkpoints per window)",
            reference_address,
            reference.latest_checkpoint,
            reference.total_transaction_blocks,
            reference.transactions_per_second(),
            reference.checkpoints_per_second()
        );

        let mut tables = BTreeMap::new();
        let mut retained = CarriedMetrics::new();
        retained.insert(TableType::Rpc, std::mem::take(&mut rpc.retained));
        self.grade(TableType::Rpc, &mut rpc.hosts, &reference);
        tables.insert(TableType::Rpc, self.table_report(TableType::Rpc, rpc));

        // Dependent tables
        let node_metrics = carried.remove(&TableType::Node).unwrap_or_default();
        let validator_metrics = carried.remove(&TableType::Validator).unwrap_or_default();
        let (nodes, validators) = tokio::join!(
            self.collect_dependent(TableType::Node, &active, node_metrics, cancel),
            self.collect_dependent(TableType::Validator, &active, validator_metrics, cancel),
        );

        for (table, result) in [(TableType::Node, nodes), (TableType::Validator, validators)] {
            match result {
                Some(Ok(mut outcome)) => {
                    retained.insert(table, std::mem::take(&mut outcome.retained));
                    self.grade(table, &mut outcome.hosts, &reference);
                    tables.insert(table, self.table_report(table, outcome));
                }
                Some(Err(e)) => {
                    warn!("⚠️  {}", e);
                    self.telemetry.add_host_failures(failure_count(&e));
                    warnings.push(e.to_string());
                    retained.insert(table, e.into_retained());
                }
                None => {}
            }
        }

        // Statistics of the reference snapshot
        let mut gas = None;
        let mut reference_gas_price = None;
        let mut validator_reports = Vec::new();

        match &reference.system_state {
            Some(state) => {
                match compute_statistics(&state.active_validators, self.gas_field) {
                    Ok(stats) => gas = Some(stats),
                    Err(e) => {
                        warn!("⚠️  Gas price statistics unavailable: {}", e);
                        warnings.push(e.to_string());
                    }
                }

                match state.current_reference_gas_price() {
                    Ok(price) => reference_gas_price = Some(price),
                    Err(e) => warnings.push(e.to_string()),
                }

                match state.validator_reports() {
                    Ok(reports) => validator_reports = reports,
                    Err(e) => warnings.push(e.to_string()),
                }
            }
            None => warnings.push(format!("reference {} returned no system state", reference_address)),
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            reference: reference_address,
            tables,
            reference_gas_price,
            gas,
            epoch: reference.epoch.clone(),
            validator_reports,
            warnings,
        };

        self.carry_forward(&report, retained).await;

        info!(
            "🔄 Cycle complete: {} hosts across {} tables, {} warnings",
            report.hosts().count(),
            report.tables.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    async fn collect_dependent(
        &self,
        table: TableType,
        active: &BTreeSet<TableType>,
        previous: HashMap<String, Metrics>,
        cancel: &CancellationToken,
    ) -> Option<Result<CollectOutcome, CollectError>> {
        if !active.contains(&table) {
            return None;
        }

        let addresses = self.addresses(table);
        if addresses.is_empty() {
            debug!("No {} endpoints configured", table);
            return None;
        }

        Some(self.collector.collect(table, addresses, previous, cancel).await)
    }

    /// Refresh progress percentages and classify every host of `table`
    fn grade(&self, table: TableType, hosts: &mut [Host], reference: &Metrics) {
        for host in hosts.iter_mut() {
            if table != TableType::Validator {
                if let Err(e) = host.metrics.update_progress(reference) {
                    host.errors.push(e.to_string());
                }
            }
            host.status = classify(&host.metrics, reference, table, &self.tolerance);
            debug!("{} {} is {}", table, host.address, host.status);
        }
    }

    fn table_report(&self, table: TableType, outcome: CollectOutcome) -> TableReport {
        for error in &outcome.errors {
            warn!("⚠️  {}", error);
        }

        self.telemetry.add_hosts_collected(outcome.hosts.len() as u64);
        self.telemetry.add_host_failures(outcome.errors.len() as u64);

        TableReport {
            table,
            hosts: outcome.hosts,
            errors: outcome.errors.iter().map(ToString::to_string).collect(),
        }
    }

    /// Replace the carried windows with this cycle's hosts
    ///
    /// `next` starts with the windows of addresses that produced no host.
    async fn carry_forward(&self, report: &CycleReport, mut next: CarriedMetrics) {
        for (table, table_report) in &report.tables {
            let entry = next.entry(*table).or_default();
            for host in &table_report.hosts {
                entry.insert(host.address.key(), host.metrics.clone().carry_forward());
            }
        }

        let mut state = self.state.write().await;
        next.retain(|table, _| state.active_tables.contains(table));
        state.carried = next;
    }

    /// Put windows back after a cycle failed
    async fn restore(&self, carried: CarriedMetrics) {
        let mut state = self.state.write().await;
        for (table, metrics) in carried {
            if state.active_tables.contains(&table) {
                state.carried.entry(table).or_default().extend(metrics);
            }
        }
    }
}

/// Rpc host with the most chain progress
///
/// Highest latest checkpoint wins, ties go to the higher transaction count.
/// Hosts that never reported both counters are not eligible.
pub fn select_reference(hosts: &[Host]) -> Option<usize> {
    hosts
        .iter()
        .enumerate()
        .filter(|(_, h)| h.metrics.updated && h.metrics.latest_checkpoint > 0 && h.metrics.total_transaction_blocks > 0)
        .max_by_key(|(_, h)| (h.metrics.latest_checkpoint, h.metrics.total_transaction_blocks))
        .map(|(i, _)| i)
}

fn failure_count(error: &CollectError) -> u64 {
    match error {
        CollectError::NoHosts { errors, .. } => errors.len() as u64,
    }
}
