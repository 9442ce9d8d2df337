use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use sysinfo::{Networks, System};

/// Host-metrics sampling, abstracted so the task runner never depends on a
/// concrete platform API. One cycle's CPU/RAM/interface figures all come
/// through this trait.
pub trait MetricsProvider: Send + Sync {
    /// Blocks for `sample_window`, returning the average CPU utilization
    /// percent over that span.
    fn cpu_percent(&self, sample_window: Duration) -> f64;

    /// Point-in-time memory utilization percent; the task runner does its
    /// own 1 Hz averaging across a cycle by calling this repeatedly.
    fn memory_percent(&self) -> f64;

    /// Combined send+recv packet count per interface, as of now.
    fn interface_packet_counters(&self) -> HashMap<String, u64>;

    /// The interfaces this host actually has, for the task runner's
    /// requested-vs-available intersection.
    fn interface_names(&self) -> HashSet<String>;
}

pub struct SysinfoMetrics {
    system: Mutex<System>,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        SysinfoMetrics { system: Mutex::new(System::new_all()) }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SysinfoMetrics {
    fn cpu_percent(&self, sample_window: Duration) -> f64 {
        let mut system = self.system.lock().expect("metrics lock poisoned");
        system.refresh_cpu_usage();
        drop(system);
        std::thread::sleep(sample_window);
        let mut system = self.system.lock().expect("metrics lock poisoned");
        system.refresh_cpu_usage();
        system.global_cpu_usage() as f64
    }

    fn memory_percent(&self) -> f64 {
        let mut system = self.system.lock().expect("metrics lock poisoned");
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (system.used_memory() as f64 / total as f64) * 100.0
    }

    fn interface_packet_counters(&self) -> HashMap<String, u64> {
        let networks = Networks::new_with_refreshed_list();
        networks
            .iter()
            .map(|(name, data)| (name.clone(), data.total_packets_received() + data.total_packets_transmitted()))
            .collect()
    }

    fn interface_names(&self) -> HashSet<String> {
        let networks = Networks::new_with_refreshed_list();
        networks.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_percent_is_a_valid_percentage() {
        let metrics = SysinfoMetrics::new();
        let pct = metrics.memory_percent();
        assert!((0.0..=100.0).contains(&pct), "memory_percent out of range: {pct}");
    }

    #[test]
    fn cpu_percent_blocks_for_roughly_the_sample_window() {
        let metrics = SysinfoMetrics::new();
        let start = std::time::Instant::now();
        let pct = metrics.cpu_percent(Duration::from_millis(50));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(pct >= 0.0);
    }
}
