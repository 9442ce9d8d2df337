use serde::{Deserialize, Serialize};

use crate::codec::{decode, encode};
use crate::error::{ProtoError, Result};
use crate::report::{exceeds, Report};
use crate::task::AlertThresholds;

/// The six kinds of threshold violation a report can produce a spike for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpikeKind {
    Cpu,
    Ram,
    IfaceTraffic,
    Throughput,
    PacketLoss,
    Jitter,
}

impl SpikeKind {
    fn code(self) -> char {
        match self {
            SpikeKind::Cpu => 'c',
            SpikeKind::Ram => 'r',
            SpikeKind::IfaceTraffic => 't',
            SpikeKind::Throughput => 'b',
            SpikeKind::PacketLoss => 'p',
            SpikeKind::Jitter => 'j',
        }
    }

    fn from_code(code: char) -> Result<Self> {
        match code {
            'c' => Ok(SpikeKind::Cpu),
            'r' => Ok(SpikeKind::Ram),
            't' => Ok(SpikeKind::IfaceTraffic),
            'b' => Ok(SpikeKind::Throughput),
            'p' => Ok(SpikeKind::PacketLoss),
            'j' => Ok(SpikeKind::Jitter),
            other => Err(ProtoError::UnknownSpikeCode(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SpikeKind::Cpu => "CPU",
            SpikeKind::Ram => "RAM",
            SpikeKind::IfaceTraffic => "IFACE_TRAFFIC",
            SpikeKind::Throughput => "THROUGHPUT",
            SpikeKind::PacketLoss => "PACKET_LOSS",
            SpikeKind::Jitter => "JITTER",
        }
    }
}

/// Event-driven notification that one or more measured values crossed
/// their threshold. Constructing one with `IfaceTraffic` among the spikes
/// but an empty interface list is a programming error (see `new`).
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub device_id: String,
    pub task_id: String,
    pub spikes: Vec<SpikeKind>,
    pub interfaces: Vec<String>,
}

impl Alert {
    pub fn new(
        device_id: impl Into<String>,
        task_id: impl Into<String>,
        spikes: Vec<SpikeKind>,
        interfaces: Vec<String>,
    ) -> Result<Self> {
        if spikes.contains(&SpikeKind::IfaceTraffic) && interfaces.is_empty() {
            return Err(ProtoError::TrafficAlertWithoutInterfaces);
        }
        Ok(Alert { device_id: device_id.into(), task_id: task_id.into(), spikes, interfaces })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&WireAlert::from(self))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let wire: WireAlert = decode(data)?;
        wire.try_into()
    }

    /// The JSON shape persisted to `<taskID>spikes.json`.
    pub fn to_log_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("device_id".into(), serde_json::json!(self.device_id));
        map.insert("task_id".into(), serde_json::json!(self.task_id));
        map.insert(
            "spikes".into(),
            serde_json::json!(self.spikes.iter().map(|s| s.name()).collect::<Vec<_>>()),
        );
        if self.spikes.contains(&SpikeKind::IfaceTraffic) {
            map.insert("interfaces".into(), serde_json::json!(self.interfaces));
        }
        serde_json::Value::Object(map)
    }
}

#[derive(Serialize, Deserialize)]
struct WireAlert {
    di: String,
    ti: String,
    s: Vec<char>,
    #[serde(default)]
    i: Vec<String>,
}

impl From<&Alert> for WireAlert {
    fn from(a: &Alert) -> Self {
        WireAlert {
            di: a.device_id.clone(),
            ti: a.task_id.clone(),
            s: a.spikes.iter().map(|s| s.code()).collect(),
            i: a.interfaces.clone(),
        }
    }
}

impl TryFrom<WireAlert> for Alert {
    type Error = ProtoError;

    fn try_from(w: WireAlert) -> Result<Self> {
        let spikes = w.s.into_iter().map(SpikeKind::from_code).collect::<Result<Vec<_>>>()?;
        Alert::new(w.di, w.ti, spikes, w.i)
    }
}

/// Pure, deterministic alert derivation from a report and its task's active
/// thresholds: an alert exists iff at least one measurement meets or
/// exceeds its threshold.
pub fn derive_alert(report: &Report, thresholds: &AlertThresholds) -> Option<Alert> {
    let mut spikes = Vec::new();

    if let Some(cpu) = report.measurements.cpu_percent {
        if exceeds(cpu, thresholds.cpu_percent) {
            spikes.push(SpikeKind::Cpu);
        }
    }
    if let Some(ram) = report.measurements.ram_percent {
        if exceeds(ram, thresholds.ram_percent) {
            spikes.push(SpikeKind::Ram);
        }
    }

    let mut spiked_interfaces = Vec::new();
    if let Some(traffic) = &report.measurements.interface_traffic {
        let mut ifaces: Vec<&String> = traffic.keys().collect();
        ifaces.sort();
        for iface in ifaces {
            if exceeds(traffic[iface], thresholds.interface_pps) {
                spiked_interfaces.push(iface.clone());
            }
        }
        if !spiked_interfaces.is_empty() {
            spikes.push(SpikeKind::IfaceTraffic);
        }
    }

    if spikes.is_empty() {
        return None;
    }

    Alert::new(report.device_id.clone(), report.task_id.clone(), spikes, spiked_interfaces).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn traffic_alert_without_interfaces_is_rejected() {
        let err = Alert::new("r1", "t1", vec![SpikeKind::IfaceTraffic], vec![]);
        assert!(err.is_err());
    }

    #[test]
    fn round_trip() {
        let a = Alert::new("r1", "t1", vec![SpikeKind::Cpu, SpikeKind::IfaceTraffic], vec!["eth0".into()]).unwrap();
        let encoded = a.encode().unwrap();
        assert_eq!(Alert::decode(&encoded).unwrap(), a);
    }

    #[test]
    fn derive_none_when_nothing_spikes() {
        let mut r = Report::new("r1", "t1");
        r.measurements.cpu_percent = Some(10.0);
        let thresholds = AlertThresholds { cpu_percent: Some(90), ram_percent: None, interface_pps: None };
        assert!(derive_alert(&r, &thresholds).is_none());
    }

    #[test]
    fn derive_cpu_spike_no_interfaces() {
        let mut r = Report::new("r1", "t1");
        r.measurements.cpu_percent = Some(95.0);
        let thresholds = AlertThresholds { cpu_percent: Some(90), ram_percent: None, interface_pps: None };
        let alert = derive_alert(&r, &thresholds).unwrap();
        assert_eq!(alert.spikes, vec![SpikeKind::Cpu]);
        assert!(alert.interfaces.is_empty());
    }

    #[test]
    fn derive_interface_only_alert() {
        let mut r = Report::new("r1", "t1");
        r.measurements.interface_traffic =
            Some(HashMap::from([("eth0".to_string(), 1200.0), ("eth1".to_string(), 400.0)]));
        let thresholds = AlertThresholds { cpu_percent: None, ram_percent: None, interface_pps: Some(1000) };
        let alert = derive_alert(&r, &thresholds).unwrap();
        assert_eq!(alert.spikes, vec![SpikeKind::IfaceTraffic]);
        assert_eq!(alert.interfaces, vec!["eth0".to_string()]);
    }

    #[test]
    fn missing_threshold_never_fires() {
        let mut r = Report::new("r1", "t1");
        r.measurements.ram_percent = Some(99.9);
        let thresholds = AlertThresholds { cpu_percent: None, ram_percent: None, interface_pps: None };
        assert!(derive_alert(&r, &thresholds).is_none());
    }
}
