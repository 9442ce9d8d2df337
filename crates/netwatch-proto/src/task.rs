use serde::{Deserialize, Serialize};

use crate::codec::{decode, encode};
use crate::error::Result;

/// A measurement job, immutable after distribution. Identified by `taskID`.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub report_frequency_secs: u32,

    pub measure_cpu: bool,
    pub alertflow_cpu_percent: Option<i64>,

    pub measure_ram: bool,
    pub alertflow_ram_percent: Option<i64>,

    pub interfaces: Vec<String>,
    pub alertflow_interface_pps: Option<i64>,

    pub iperf_measure_throughput: bool,
    pub iperf_as_server: bool,
    pub iperf_options: Option<String>,

    pub iperf_measure_jitter: bool,
    pub alertflow_jitter_ms: Option<i64>,

    pub iperf_measure_packet_loss: bool,
    pub alertflow_packetloss_percent: Option<i64>,

    pub ping_measure_latency: bool,
    pub alertflow_latency_ms: Option<i64>,
    pub ping_options: Option<String>,
}

/// The active alert thresholds for a task, keyed by measurement-kind code.
/// A kind is present only if its measurement is enabled *and* a threshold
/// value was configured (interface thresholds additionally require a
/// non-empty interface list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertThresholds {
    pub cpu_percent: Option<i64>,
    pub ram_percent: Option<i64>,
    pub interface_pps: Option<i64>,
}

impl Task {
    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            cpu_percent: self.measure_cpu.then_some(self.alertflow_cpu_percent).flatten(),
            ram_percent: self.measure_ram.then_some(self.alertflow_ram_percent).flatten(),
            interface_pps: (!self.interfaces.is_empty())
                .then_some(self.alertflow_interface_pps)
                .flatten(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&WireTask::from(self))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let wire: WireTask = decode(data)?;
        Ok(wire.into())
    }
}

#[derive(Serialize, Deserialize)]
struct WireTask {
    ti: String,
    rf: u32,
    c: (bool, Option<i64>),
    r: (bool, Option<i64>),
    t: (Vec<String>, Option<i64>),
    b: bool,
    j: (bool, Option<i64>),
    p: (bool, Option<i64>),
    l: (bool, Option<i64>),
    s: bool,
    oi: Option<String>,
    op: Option<String>,
}

impl From<&Task> for WireTask {
    fn from(t: &Task) -> Self {
        WireTask {
            ti: t.task_id.clone(),
            rf: t.report_frequency_secs,
            c: (t.measure_cpu, t.alertflow_cpu_percent),
            r: (t.measure_ram, t.alertflow_ram_percent),
            t: (t.interfaces.clone(), t.alertflow_interface_pps),
            b: t.iperf_measure_throughput,
            j: (t.iperf_measure_jitter, t.alertflow_jitter_ms),
            p: (t.iperf_measure_packet_loss, t.alertflow_packetloss_percent),
            l: (t.ping_measure_latency, t.alertflow_latency_ms),
            s: t.iperf_as_server,
            oi: t.iperf_options.clone(),
            op: t.ping_options.clone(),
        }
    }
}

impl From<WireTask> for Task {
    fn from(w: WireTask) -> Self {
        Task {
            task_id: w.ti,
            report_frequency_secs: w.rf,
            measure_cpu: w.c.0,
            alertflow_cpu_percent: w.c.1,
            measure_ram: w.r.0,
            alertflow_ram_percent: w.r.1,
            interfaces: w.t.0,
            alertflow_interface_pps: w.t.1,
            iperf_measure_throughput: w.b,
            iperf_measure_jitter: w.j.0,
            alertflow_jitter_ms: w.j.1,
            iperf_measure_packet_loss: w.p.0,
            alertflow_packetloss_percent: w.p.1,
            ping_measure_latency: w.l.0,
            alertflow_latency_ms: w.l.1,
            iperf_as_server: w.s,
            iperf_options: w.oi,
            ping_options: w.op,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task {
            task_id: "t1".into(),
            report_frequency_secs: 5,
            measure_cpu: true,
            alertflow_cpu_percent: Some(90),
            measure_ram: false,
            alertflow_ram_percent: None,
            interfaces: vec!["eth0".into(), "eth1".into()],
            alertflow_interface_pps: Some(1000),
            iperf_measure_throughput: true,
            iperf_as_server: false,
            iperf_options: Some("-t 30".into()),
            iperf_measure_jitter: false,
            alertflow_jitter_ms: None,
            iperf_measure_packet_loss: false,
            alertflow_packetloss_percent: None,
            ping_measure_latency: true,
            alertflow_latency_ms: Some(50),
            ping_options: None,
        }
    }

    #[test]
    fn round_trip() {
        let t = sample();
        let encoded = t.encode().unwrap();
        assert_eq!(Task::decode(&encoded).unwrap(), t);
    }

    #[test]
    fn thresholds_require_enabled_and_present() {
        let t = sample();
        let thresholds = t.alert_thresholds();
        assert_eq!(thresholds.cpu_percent, Some(90));
        // measure_ram is false, so its threshold never surfaces even though set to None here.
        assert_eq!(thresholds.ram_percent, None);
        assert_eq!(thresholds.interface_pps, Some(1000));
    }

    #[test]
    fn interface_threshold_absent_without_interfaces() {
        let mut t = sample();
        t.interfaces.clear();
        assert_eq!(t.alert_thresholds().interface_pps, None);
    }

    #[test]
    fn missing_threshold_value_means_no_limit() {
        let mut t = sample();
        t.alertflow_cpu_percent = None;
        assert_eq!(t.alert_thresholds().cpu_percent, None);
    }
}
