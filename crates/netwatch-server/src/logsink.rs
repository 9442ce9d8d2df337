use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use netwatch_proto::{Alert, Report};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogSinkError {
    #[error("log sink I/O error at {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("log sink JSON error at {path:?}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

type Result<T> = std::result::Result<T, LogSinkError>;

/// Append-to-file persistence for reports and spikes: `logs/<deviceID>/<taskID>.json`
/// and `logs/<deviceID>/<taskID>spikes.json`, each a JSON object keyed by a
/// timestamp string. Read-modify-write on every append.
pub struct LogSink {
    base_dir: PathBuf,
}

impl LogSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        LogSink { base_dir: base_dir.into() }
    }

    /// Wipes the log root and pre-creates every device/task file as an
    /// empty JSON object. Called once, at server startup, before the entry
    /// listener binds.
    pub fn reset(&self, device_to_tasks: &HashMap<String, Vec<String>>) -> Result<()> {
        if self.base_dir.exists() {
            fs::remove_dir_all(&self.base_dir)
                .map_err(|source| self.io_err(&self.base_dir, source))?;
        }
        fs::create_dir_all(&self.base_dir).map_err(|source| self.io_err(&self.base_dir, source))?;

        for (device, task_ids) in device_to_tasks {
            let device_dir = self.base_dir.join(device);
            fs::create_dir_all(&device_dir).map_err(|source| self.io_err(&device_dir, source))?;

            for task_id in task_ids {
                self.write_empty(&self.report_path(device, task_id))?;
                self.write_empty(&self.spike_path(device, task_id))?;
            }
        }
        Ok(())
    }

    pub fn append_report(&self, report: &Report) -> Result<()> {
        self.append_entry(&self.report_path(&report.device_id, &report.task_id), report.to_log_value())
    }

    pub fn append_alert(&self, alert: &Alert) -> Result<()> {
        self.append_entry(&self.spike_path(&alert.device_id, &alert.task_id), alert.to_log_value())
    }

    fn report_path(&self, device_id: &str, task_id: &str) -> PathBuf {
        self.base_dir.join(device_id).join(format!("{task_id}.json"))
    }

    fn spike_path(&self, device_id: &str, task_id: &str) -> PathBuf {
        self.base_dir.join(device_id).join(format!("{task_id}spikes.json"))
    }

    fn write_empty(&self, path: &Path) -> Result<()> {
        fs::write(path, "{}").map_err(|source| self.io_err(path, source))
    }

    fn append_entry(&self, path: &Path, value: serde_json::Value) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_err(parent, source))?;
        }

        let mut existing: serde_json::Map<String, serde_json::Value> = if path.exists() {
            let data = fs::read_to_string(path).map_err(|source| self.io_err(path, source))?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            serde_json::Map::new()
        };

        existing.insert(timestamp_key(), value);

        let data = serde_json::to_string_pretty(&existing)
            .map_err(|source| self.json_err(path, source))?;
        fs::write(path, data).map_err(|source| self.io_err(path, source))
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> LogSinkError {
        LogSinkError::Io { path: path.display().to_string(), source }
    }

    fn json_err(&self, path: &Path, source: serde_json::Error) -> LogSinkError {
        LogSinkError::Json { path: path.display().to_string(), source }
    }
}

fn timestamp_key() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sandbox(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("netwatch-server-logsink-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn reset_pre_creates_empty_files() {
        let dir = sandbox("reset");
        let sink = LogSink::new(&dir);
        let mut device_to_tasks = HashMap::new();
        device_to_tasks.insert("r1".to_string(), vec!["t1".to_string()]);

        sink.reset(&device_to_tasks).unwrap();

        let report_path = dir.join("r1").join("t1.json");
        let spike_path = dir.join("r1").join("t1spikes.json");
        assert_eq!(fs::read_to_string(&report_path).unwrap(), "{}");
        assert_eq!(fs::read_to_string(&spike_path).unwrap(), "{}");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn append_report_accumulates_timestamped_entries() {
        let dir = sandbox("append-report");
        let sink = LogSink::new(&dir);
        let mut device_to_tasks = HashMap::new();
        device_to_tasks.insert("r1".to_string(), vec!["t1".to_string()]);
        sink.reset(&device_to_tasks).unwrap();

        let mut report = Report::new("r1", "t1");
        report.measurements.cpu_percent = Some(95.0);
        sink.append_report(&report).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        sink.append_report(&report).unwrap();

        let data = fs::read_to_string(dir.join("r1").join("t1.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn append_alert_writes_full_dict_shape() {
        let dir = sandbox("append-alert");
        let sink = LogSink::new(&dir);
        let mut device_to_tasks = HashMap::new();
        device_to_tasks.insert("r1".to_string(), vec!["t1".to_string()]);
        sink.reset(&device_to_tasks).unwrap();

        let alert = Alert::new("r1", "t1", vec![netwatch_proto::SpikeKind::Cpu], vec![]).unwrap();
        sink.append_alert(&alert).unwrap();

        let data = fs::read_to_string(dir.join("r1").join("t1spikes.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&data).unwrap();
        let (_, entry) = parsed.as_object().unwrap().iter().next().unwrap();
        assert_eq!(entry["device_id"], "r1");
        assert_eq!(entry["spikes"][0], "CPU");

        fs::remove_dir_all(&dir).unwrap();
    }
}
