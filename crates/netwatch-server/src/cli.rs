use std::path::PathBuf;

use clap::Parser;

/// Network-monitoring collector: distributes measurement tasks to a fleet
/// of agents and persists their reports and spike alerts to per-device,
/// per-task append logs.
#[derive(Parser, Debug)]
#[command(name = "netwatch-server", version, about)]
pub struct Args {
    /// Path to the JSON task-definition file.
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Root directory for per-device, per-task report and spike logs.
    /// Wiped and recreated on every startup.
    #[arg(long, default_value = "logs")]
    pub logs_dir: PathBuf,
}
