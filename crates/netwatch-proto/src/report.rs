use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::{decode, encode};
use crate::error::Result;

/// One sampling cycle's measurements for a (device, task) pair. Absent
/// fields simply mean that sampler was not enabled (or failed) this cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements {
    pub cpu_percent: Option<f64>,
    pub ram_percent: Option<f64>,
    /// Per-interface packets/second, rounded to one decimal.
    pub interface_traffic: Option<HashMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub device_id: String,
    pub task_id: String,
    pub measurements: Measurements,
}

impl Report {
    pub fn new(device_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Report { device_id: device_id.into(), task_id: task_id.into(), measurements: Measurements::default() }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&WireReport::from(self))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let wire: WireReport = decode(data)?;
        Ok(wire.into())
    }

    /// The JSON shape persisted to `<taskID>.json` (see the log layout).
    pub fn to_log_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("device_id".into(), serde_json::json!(self.device_id));
        map.insert("task_id".into(), serde_json::json!(self.task_id));
        if let Some(cpu) = self.measurements.cpu_percent {
            map.insert("CPU".into(), serde_json::json!(cpu));
        }
        if let Some(ram) = self.measurements.ram_percent {
            map.insert("RAM".into(), serde_json::json!(ram));
        }
        if let Some(traffic) = &self.measurements.interface_traffic {
            map.insert("Interface Traffic".into(), serde_json::json!(traffic));
        }
        serde_json::Value::Object(map)
    }
}

#[derive(Serialize, Deserialize)]
struct WireReport {
    di: String,
    ti: String,
    c: Option<f64>,
    r: Option<f64>,
    t: Option<HashMap<String, f64>>,
}

impl From<&Report> for WireReport {
    fn from(r: &Report) -> Self {
        WireReport {
            di: r.device_id.clone(),
            ti: r.task_id.clone(),
            c: r.measurements.cpu_percent,
            r: r.measurements.ram_percent,
            t: r.measurements.interface_traffic.clone(),
        }
    }
}

impl From<WireReport> for Report {
    fn from(w: WireReport) -> Self {
        Report {
            device_id: w.di,
            task_id: w.ti,
            measurements: Measurements { cpu_percent: w.c, ram_percent: w.r, interface_traffic: w.t },
        }
    }
}

/// Derives the active thresholds that apply to `self`'s measurements, pure
/// and deterministic: a missing threshold never fires.
pub fn exceeds(value: f64, threshold: Option<i64>) -> bool {
    match threshold {
        Some(t) => value >= t as f64,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut r = Report::new("r1", "t1");
        r.measurements.cpu_percent = Some(42.0);
        r.measurements.interface_traffic =
            Some(HashMap::from([("eth0".to_string(), 120.5), ("eth1".to_string(), 3.0)]));
        let encoded = r.encode().unwrap();
        assert_eq!(Report::decode(&encoded).unwrap(), r);
    }

    #[test]
    fn log_value_omits_absent_kinds() {
        let mut r = Report::new("r1", "t1");
        r.measurements.ram_percent = Some(12.3);
        let v = r.to_log_value();
        assert_eq!(v.get("device_id").unwrap(), "r1");
        assert_eq!(v.get("task_id").unwrap(), "t1");
        assert!(v.get("RAM").is_some());
        assert!(v.get("CPU").is_none());
        assert!(v.get("Interface Traffic").is_none());
    }

    #[test]
    fn exceeds_with_no_threshold_never_fires() {
        assert!(!exceeds(1_000_000.0, None));
        assert!(exceeds(90.0, Some(90)));
        assert!(!exceeds(89.0, Some(90)));
    }
}
