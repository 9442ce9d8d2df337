use clap::Parser;

/// Network-monitoring agent: connects to a collector server, runs its
/// assigned measurement tasks, and streams reports and spike alerts back.
#[derive(Parser, Debug)]
#[command(name = "netwatch-agent", version, about)]
pub struct Args {
    /// Hostname or IP address of the collector server.
    pub server_host: String,

    /// This host's deviceID, used by the server to look up task assignments.
    pub device_id: String,

    /// Local UDP/TCP port to bind (NetTask and AlertFlow share this port
    /// number before the handshake hands the agent off to a session port).
    #[arg(long, default_value_t = 2000)]
    pub port: u16,
}
