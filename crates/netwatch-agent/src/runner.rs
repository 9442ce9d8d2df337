use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use netwatch_metrics::MetricsProvider;
use netwatch_proto::{derive_alert, Alert, Report, Task};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One instance per (device, task). Cadence = `report_frequency` seconds per
/// cycle; cycles are strictly serial for a given task, but each task runs as
/// its own tokio task so distinct tasks proceed in parallel.
pub struct TaskRunner {
    device_id: String,
    task: Task,
    metrics: Arc<dyn MetricsProvider>,
    report_tx: mpsc::UnboundedSender<Report>,
    alert_tx: mpsc::UnboundedSender<Alert>,
}

impl TaskRunner {
    /// Intersects the task's requested interfaces with the host's actual
    /// interfaces; missing ones are warned about, not fatal.
    pub fn new(
        device_id: String,
        mut task: Task,
        metrics: Arc<dyn MetricsProvider>,
        report_tx: mpsc::UnboundedSender<Report>,
        alert_tx: mpsc::UnboundedSender<Alert>,
    ) -> Self {
        let available = metrics.interface_names();
        let (present, missing): (Vec<String>, Vec<String>) =
            task.interfaces.iter().cloned().partition(|iface| available.contains(iface));
        if !missing.is_empty() {
            warn!(
                "task {} requested interfaces [{}] that don't exist here; proceeding with [{}]",
                task.task_id,
                missing.join(", "),
                present.join(", ")
            );
        }
        task.interfaces = present;

        TaskRunner { device_id, task, metrics, report_tx, alert_tx }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            let report = self.run_cycle().await;
            let thresholds = self.task.alert_thresholds();
            let alert = derive_alert(&report, &thresholds);

            if self.report_tx.send(report).is_err() {
                break;
            }
            if let Some(alert) = alert {
                let _ = self.alert_tx.send(alert);
            }
        }
    }

    /// Starts one concurrent sampler per enabled measurement kind and waits
    /// for all of them before building the cycle's report.
    async fn run_cycle(&mut self) -> Report {
        let duration = Duration::from_secs(self.task.report_frequency_secs.max(1) as u64);
        let mut report = Report::new(self.device_id.clone(), self.task.task_id.clone());

        let cpu_handle = self.task.measure_cpu.then(|| {
            let metrics = self.metrics.clone();
            tokio::task::spawn_blocking(move || metrics.cpu_percent(duration))
        });
        let ram_handle = self.task.measure_ram.then(|| {
            let metrics = self.metrics.clone();
            tokio::task::spawn_blocking(move || sample_ram_average(metrics.as_ref(), duration))
        });
        let iface_handle = (!self.task.interfaces.is_empty()).then(|| {
            let metrics = self.metrics.clone();
            let ifaces = self.task.interfaces.clone();
            tokio::task::spawn_blocking(move || sample_interface_traffic(metrics.as_ref(), &ifaces, duration))
        });

        if let Some(handle) = cpu_handle {
            match handle.await {
                Ok(value) => report.measurements.cpu_percent = Some(value),
                Err(e) => warn!("CPU sampler for task {} panicked: {e}", self.task.task_id),
            }
        }
        if let Some(handle) = ram_handle {
            match handle.await {
                Ok(value) => report.measurements.ram_percent = Some(value),
                Err(e) => warn!("RAM sampler for task {} panicked: {e}", self.task.task_id),
            }
        }
        if let Some(handle) = iface_handle {
            match handle.await {
                Ok(value) => report.measurements.interface_traffic = Some(value),
                Err(e) => warn!("interface sampler for task {} panicked: {e}", self.task.task_id),
            }
        }

        info!("task {} completed a cycle: {:?}", self.task.task_id, report.measurements);
        report
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One reading per second over the cycle, averaged to one decimal.
fn sample_ram_average(metrics: &dyn MetricsProvider, duration: Duration) -> f64 {
    let seconds = duration.as_secs().max(1);
    let mut sum = 0.0;
    for _ in 0..seconds {
        let tick_start = Instant::now();
        sum += metrics.memory_percent();
        let elapsed = tick_start.elapsed();
        if elapsed < Duration::from_secs(1) {
            std::thread::sleep(Duration::from_secs(1) - elapsed);
        }
    }
    round1(sum / seconds as f64)
}

/// Snapshots per-interface packet counters before and after the cycle,
/// dividing the delta by the cycle duration.
fn sample_interface_traffic(
    metrics: &dyn MetricsProvider,
    ifaces: &[String],
    duration: Duration,
) -> HashMap<String, f64> {
    let before = metrics.interface_packet_counters();
    std::thread::sleep(duration);
    let after = metrics.interface_packet_counters();

    ifaces
        .iter()
        .filter_map(|iface| {
            let start = *before.get(iface)?;
            let end = *after.get(iface)?;
            let pps = end.saturating_sub(start) as f64 / duration.as_secs_f64();
            Some((iface.clone(), round1(pps)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FakeMetrics {
        cpu: f64,
        mem: f64,
        counters: HashMap<String, u64>,
        names: HashSet<String>,
    }

    impl MetricsProvider for FakeMetrics {
        fn cpu_percent(&self, _sample_window: Duration) -> f64 {
            self.cpu
        }
        fn memory_percent(&self) -> f64 {
            self.mem
        }
        fn interface_packet_counters(&self) -> HashMap<String, u64> {
            self.counters.clone()
        }
        fn interface_names(&self) -> HashSet<String> {
            self.names.clone()
        }
    }

    #[test]
    fn ram_average_rounds_to_one_decimal() {
        let metrics = FakeMetrics {
            cpu: 0.0,
            mem: 33.33,
            counters: HashMap::new(),
            names: HashSet::new(),
        };
        let avg = sample_ram_average(&metrics, Duration::from_secs(1));
        assert_eq!(avg, 33.3);
    }

    #[test]
    fn interface_traffic_only_covers_available_interfaces() {
        let mut before_after = HashMap::new();
        before_after.insert("eth0".to_string(), 2000u64);
        let metrics = FakeMetrics { cpu: 0.0, mem: 0.0, counters: before_after, names: HashSet::new() };
        let result = sample_interface_traffic(&metrics, &["eth0".to_string(), "eth9".to_string()], Duration::from_millis(1));
        assert!(result.contains_key("eth0"));
        assert!(!result.contains_key("eth9"));
    }
}
