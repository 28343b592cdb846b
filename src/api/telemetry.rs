//! Monitor Self-Telemetry
//!
//! Counters describing the monitor itself, exposed on the HTTP API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::types::HostStatus;

/// Telemetry collector for the fleet monitor
#[derive(Default)]
pub struct Telemetry {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Completed collection cycles
    pub cycles_run: AtomicU64,

    /// Cycles that ended in a fatal error
    pub cycles_failed: AtomicU64,

    /// Hosts built across all cycles
    pub hosts_collected: AtomicU64,

    /// Addresses dropped across all cycles
    pub host_failures: AtomicU64,

    /// Duration of the last cycle
    pub last_cycle_ms: AtomicU64,

    /// Reference gas price of the current epoch
    pub reference_gas_price: AtomicU64,

    /// Estimated next reference gas price
    pub estimated_gas_price: AtomicU64,

    /// Hosts per verdict in the last cycle
    pub hosts_green: AtomicU64,
    pub hosts_yellow: AtomicU64,
    pub hosts_red: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn inc_cycles_run(&self) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_hosts_collected(&self, count: u64) {
        self.hosts_collected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_host_failures(&self, count: u64) {
        self.host_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_last_cycle_ms(&self, ms: u64) {
        self.last_cycle_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_gas_prices(&self, reference: u64, estimated: u64) {
        self.reference_gas_price.store(reference, Ordering::Relaxed);
        self.estimated_gas_price.store(estimated, Ordering::Relaxed);
    }

    /// Replace the per-verdict gauges with the counts of the last cycle
    pub fn set_status_counts<'a>(&self, statuses: impl IntoIterator<Item = &'a HostStatus>) {
        let (mut green, mut yellow, mut red) = (0, 0, 0);
        for status in statuses {
            match status {
                HostStatus::Green => green += 1,
                HostStatus::Yellow => yellow += 1,
                HostStatus::Red => red += 1,
                HostStatus::Grey => {}
            }
        }

        self.hosts_green.store(green, Ordering::Relaxed);
        self.hosts_yellow.store(yellow, Ordering::Relaxed);
        self.hosts_red.store(red, Ordering::Relaxed);
    }

    /// Export telemetry in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP fleet_monitor_uptime_seconds Monitor uptime in seconds\n\
             # TYPE fleet_monitor_uptime_seconds gauge\n\
             fleet_monitor_uptime_seconds {}\n\n",
            self.uptime_secs()
        ));

        // Cycles
        output.push_str(&format!(
            "# HELP fleet_monitor_cycles_total Completed collection cycles\n\
             # TYPE fleet_monitor_cycles_total counter\n\
             fleet_monitor_cycles_total {}\n\n",
            self.cycles_run.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP fleet_monitor_cycles_failed_total Cycles aborted by a fatal error\n\
             # TYPE fleet_monitor_cycles_failed_total counter\n\
             fleet_monitor_cycles_failed_total {}\n\n",
            self.cycles_failed.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP fleet_monitor_last_cycle_milliseconds Duration of the last cycle\n\
             # TYPE fleet_monitor_last_cycle_milliseconds gauge\n\
             fleet_monitor_last_cycle_milliseconds {}\n\n",
            self.last_cycle_ms.load(Ordering::Relaxed)
        ));

        // Hosts
        output.push_str(&format!(
            "# HELP fleet_monitor_hosts_collected_total Hosts built\n\
             # TYPE fleet_monitor_hosts_collected_total counter\n\
             fleet_monitor_hosts_collected_total {}\n\n",
            self.hosts_collected.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP fleet_monitor_host_failures_total Addresses dropped from a cycle\n\
             # TYPE fleet_monitor_host_failures_total counter\n\
             fleet_monitor_host_failures_total {}\n\n",
            self.host_failures.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP fleet_monitor_hosts Hosts per health verdict in the last cycle\n\
             # TYPE fleet_monitor_hosts gauge\n",
        );
        for (status, gauge) in [
            (HostStatus::Green, &self.hosts_green),
            (HostStatus::Yellow, &self.hosts_yellow),
            (HostStatus::Red, &self.hosts_red),
        ] {
            output.push_str(&format!(
                "fleet_monitor_hosts{{status=\"{}\"}} {}\n",
                status,
                gauge.load(Ordering::Relaxed)
            ));
        }
        output.push('\n');

        // Gas
        output.push_str(&format!(
            "# HELP fleet_monitor_reference_gas_price Reference gas price of the current epoch\n\
             # TYPE fleet_monitor_reference_gas_price gauge\n\
             fleet_monitor_reference_gas_price {}\n\n",
            self.reference_gas_price.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP fleet_monitor_estimated_gas_price Estimated next reference gas price\n\
             # TYPE fleet_monitor_estimated_gas_price gauge\n\
             fleet_monitor_estimated_gas_price {}\n\n",
            self.estimated_gas_price.load(Ordering::Relaxed)
        ));

        output
    }

    /// Export telemetry as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "cycles": {
                "run": self.cycles_run.load(Ordering::Relaxed),
                "failed": self.cycles_failed.load(Ordering::Relaxed),
                "last_ms": self.last_cycle_ms.load(Ordering::Relaxed),
            },
            "hosts": {
                "collected": self.hosts_collected.load(Ordering::Relaxed),
                "failures": self.host_failures.load(Ordering::Relaxed),
                "green": self.hosts_green.load(Ordering::Relaxed),
                "yellow": self.hosts_yellow.load(Ordering::Relaxed),
                "red": self.hosts_red.load(Ordering::Relaxed),
            },
            "gas": {
                "reference": self.reference_gas_price.load(Ordering::Relaxed),
                "estimated_next": self.estimated_gas_price.load(Ordering::Relaxed),
            },
        })
    }
}
