use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use log::{info, warn};
use netwatch_transport::{PortAllocator, ReliableEndpoint};
use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::logsink::LogSink;
use crate::worker::Worker;

/// The well-known NetTask entry UDP port.
pub const NETTASK_SERVER_PORT: u16 = 9000;
const EPHEMERAL_PORT_START: u16 = 49152;
const EPHEMERAL_PORT_STOP: u16 = 65535;

const UNSPECIFIED: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Single socket bound to the well-known port. Hands each SYN off to a
/// dedicated worker on a freshly allocated ephemeral port and keeps
/// listening; a FIN on the entry socket itself stops the loop.
pub struct EntryListener {
    config: Arc<ServerConfig>,
    log_sink: Arc<LogSink>,
    ports: Arc<Mutex<PortAllocator>>,
}

impl EntryListener {
    pub fn new(config: Arc<ServerConfig>, log_sink: Arc<LogSink>) -> Self {
        EntryListener {
            config,
            log_sink,
            ports: Arc::new(Mutex::new(PortAllocator::new(EPHEMERAL_PORT_START, EPHEMERAL_PORT_STOP))),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let mut endpoint = ReliableEndpoint::bind(UNSPECIFIED, NETTASK_SERVER_PORT).await?;
        info!("server entry listener bound to port {NETTASK_SERVER_PORT}");

        loop {
            let Some((datagram, peer)) = endpoint.receive(false).await? else {
                continue;
            };

            if datagram.is_syn() {
                info!("received SYN from {peer}");
                self.spawn_worker(datagram).await;
            } else if datagram.is_fin() {
                info!("received FIN from {peer}; shutting down entry listener");
                endpoint.send_ack(&datagram).await?;
                return Ok(());
            } else if datagram.payload_size() > 0 {
                warn!("received data from {peer} on the entry port; this port isn't for data");
            }
        }
    }

    async fn spawn_worker(&self, syn: netwatch_proto::Datagram) {
        let port = {
            let mut ports = self.ports.lock().await;
            ports.allocate()
        };

        let config = self.config.clone();
        let log_sink = self.log_sink.clone();
        let ports = self.ports.clone();

        tokio::spawn(async move {
            info!("spawning worker on port {port} for agent {}", syn.origin.addr);
            let worker = Worker::new(port, syn, config, log_sink);
            if let Err(e) = worker.run().await {
                warn!("worker on port {port} ended with an error: {e}");
            }
            ports.lock().await.release(port);
        });
    }
}
