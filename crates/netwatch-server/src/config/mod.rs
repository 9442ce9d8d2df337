use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use netwatch_proto::Task;

pub mod error;

pub use error::ConfigError;

/// One `tasks[]` element of the server's JSON task-definition file.
#[derive(Debug, Deserialize)]
struct TaskEntry {
    #[serde(rename = "taskID")]
    task_id: String,
    devices: Vec<String>,
    report_frequency: u32,
    #[serde(default)]
    measure_cpu: bool,
    #[serde(default)]
    measure_ram: bool,
    #[serde(default)]
    device_interfaces: Vec<String>,
    #[serde(default)]
    iperf_measure_throughput: bool,
    #[serde(default)]
    iperf_measure_jitter: bool,
    #[serde(default)]
    iperf_measure_packet_loss: bool,
    #[serde(default)]
    ping_measure_latency: bool,
    #[serde(default)]
    iperf_as_server: bool,
    #[serde(default)]
    iperf_options: Option<String>,
    #[serde(default)]
    ping_options: Option<String>,
    #[serde(default)]
    alertflow_cpu_percent: Option<i64>,
    #[serde(default)]
    alertflow_ram_percent: Option<i64>,
    #[serde(default)]
    alertflow_interface_pps: Option<i64>,
    #[serde(default)]
    alertflow_packetloss_percent: Option<i64>,
    #[serde(default)]
    alertflow_jitter_ms: Option<i64>,
    #[serde(default)]
    alertflow_latency_ms: Option<i64>,
}

impl From<&TaskEntry> for Task {
    fn from(e: &TaskEntry) -> Self {
        Task {
            task_id: e.task_id.clone(),
            report_frequency_secs: e.report_frequency,
            measure_cpu: e.measure_cpu,
            alertflow_cpu_percent: e.alertflow_cpu_percent,
            measure_ram: e.measure_ram,
            alertflow_ram_percent: e.alertflow_ram_percent,
            interfaces: e.device_interfaces.clone(),
            alertflow_interface_pps: e.alertflow_interface_pps,
            iperf_measure_throughput: e.iperf_measure_throughput,
            iperf_as_server: e.iperf_as_server,
            iperf_options: e.iperf_options.clone(),
            iperf_measure_jitter: e.iperf_measure_jitter,
            alertflow_jitter_ms: e.alertflow_jitter_ms,
            iperf_measure_packet_loss: e.iperf_measure_packet_loss,
            alertflow_packetloss_percent: e.alertflow_packetloss_percent,
            ping_measure_latency: e.ping_measure_latency,
            alertflow_latency_ms: e.alertflow_latency_ms,
            ping_options: e.ping_options.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    tasks: Vec<TaskEntry>,
}

/// The server's task table plus the device<->task indices `fetch_tasks`
/// (here `tasks_for_device`) needs. Read-only after `load`.
pub struct ServerConfig {
    tasks: Vec<Task>,
    device_to_tasks: HashMap<String, Vec<String>>,
    task_to_devices: HashMap<String, Vec<String>>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> error::Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let file: ConfigFile = serde_json::from_str(&data)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?;

        if file.tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }

        let mut tasks = Vec::with_capacity(file.tasks.len());
        let mut device_to_tasks: HashMap<String, Vec<String>> = HashMap::new();
        let mut task_to_devices: HashMap<String, Vec<String>> = HashMap::new();

        for entry in &file.tasks {
            for device in &entry.devices {
                device_to_tasks.entry(device.clone()).or_default().push(entry.task_id.clone());
                task_to_devices.entry(entry.task_id.clone()).or_default().push(device.clone());
            }
            tasks.push(Task::from(entry));
        }

        Ok(ServerConfig { tasks, device_to_tasks, task_to_devices })
    }

    /// The tasks assigned to `device_id`, in config-file order. Empty if
    /// the device is not named in any task's `devices` list.
    pub fn tasks_for_device(&self, device_id: &str) -> Vec<Task> {
        let Some(assigned) = self.device_to_tasks.get(device_id) else {
            return Vec::new();
        };
        self.tasks.iter().filter(|t| assigned.contains(&t.task_id)).cloned().collect()
    }

    pub fn device_to_tasks(&self) -> &HashMap<String, Vec<String>> {
        &self.device_to_tasks
    }

    pub fn task_to_devices(&self) -> &HashMap<String, Vec<String>> {
        &self.task_to_devices
    }
}
