use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use log::{error, info, warn};
use netwatch_proto::{Alert, ControlMessage, Datagram, Endpoint, Flags, Report, Tag, Task};
use netwatch_transport::{read_framed, ReliableEndpoint};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::logsink::LogSink;

const UNSPECIFIED: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const SERVER_AUTHOR: &str = "server";

/// One per accepted agent, bound to a fresh ephemeral port. Mirrors the
/// agent's own state progression: finish the handshake, identify the
/// agent, push its tasks, attach AlertFlow, then loop forever on reports.
pub struct Worker {
    port: u16,
    syn: Datagram,
    config: Arc<ServerConfig>,
    log_sink: Arc<LogSink>,
}

impl Worker {
    pub fn new(port: u16, syn: Datagram, config: Arc<ServerConfig>, log_sink: Arc<LogSink>) -> Self {
        Worker { port, syn, config, log_sink }
    }

    pub async fn run(self) -> Result<()> {
        let mut endpoint = ReliableEndpoint::bind(UNSPECIFIED, self.port).await?;
        let agent = self.syn.origin;
        info!("worker on port {} born for agent {}:{}", self.port, agent.addr, agent.port);

        // 1. complete the handshake: send_ack on a SYN replies SYN+ACK with
        // retry and blocks until the agent's final ACK arrives.
        endpoint.send_ack(&self.syn).await?;
        info!("handshake complete on port {}", self.port);

        // 2. identify the agent.
        let device_id = self.await_identify(&mut endpoint).await?;
        info!("agent on port {} identified as {device_id}", self.port);

        // 3. push this device's tasks.
        let tasks = self.config.tasks_for_device(&device_id);
        self.send_tasks(&mut endpoint, agent, &tasks).await?;
        info!("sent {} task(s) to {device_id}", tasks.len());

        // 4. attach the matching AlertFlow stream.
        let alertflow = self.accept_alertflow(agent).await?;
        info!("AlertFlow connection attached for {device_id}");

        // 5. spawn the alert reader.
        self.spawn_alert_reader(alertflow, device_id.clone());

        // 6. main loop: receive reports until the agent closes or times out.
        self.listen_for_reports(&mut endpoint, &device_id).await
    }

    async fn await_identify(&self, endpoint: &mut ReliableEndpoint) -> Result<String> {
        loop {
            let Some((datagram, _peer)) = endpoint.receive(false).await? else {
                continue;
            };
            if datagram.payload_size() == 0 {
                continue;
            }

            let message = match ControlMessage::decode(&datagram.payload) {
                Ok(m) => m,
                Err(e) => {
                    warn!("decode failure while awaiting identification: {e}");
                    continue;
                }
            };

            if message.tag == Tag::Identify {
                endpoint.send_ack(&datagram).await?;
                return Ok(message.author);
            }
            warn!("expected an identification message, got {:?} instead; ignored", message.tag);
        }
    }

    async fn send_tasks(&self, endpoint: &mut ReliableEndpoint, agent: Endpoint, tasks: &[Task]) -> Result<()> {
        for (idx, task) in tasks.iter().enumerate() {
            let is_last = idx == tasks.len() - 1;
            let envelope = ControlMessage::task(SERVER_AUTHOR, task.encode()?, is_last);
            endpoint.send_and_wait_ack(agent, Flags::ACK, envelope.encode()?, None).await?;
            info!("sent task {} ({})", task.task_id, if is_last { "final" } else { "more follow" });
        }
        Ok(())
    }

    /// Opens a stream-listening socket on the worker's own ephemeral port
    /// and accepts only the connection matching the agent's expected
    /// address and port, closing and retrying on anything else.
    async fn accept_alertflow(&self, agent: Endpoint) -> Result<TcpStream> {
        let listener = TcpListener::bind(SocketAddr::new(UNSPECIFIED, self.port)).await?;
        loop {
            info!("awaiting AlertFlow connection from {}:{}", agent.addr, agent.port);
            let (stream, peer) = listener.accept().await?;
            if peer.ip() == agent.addr && peer.port() == agent.port {
                return Ok(stream);
            }
            warn!("AlertFlow connection attempt from unexpected peer {peer}; closing");
        }
    }

    fn spawn_alert_reader(&self, stream: TcpStream, device_id: String) {
        let log_sink = self.log_sink.clone();
        let (mut read_half, _write_half) = stream.into_split();

        tokio::spawn(async move {
            loop {
                match read_framed(&mut read_half).await {
                    Ok(Some(bytes)) => match Alert::decode(&bytes) {
                        Ok(alert) => {
                            if let Err(e) = log_sink.append_alert(&alert) {
                                error!("failed to persist alert for {device_id}: {e}");
                            }
                        }
                        Err(e) => warn!("decode failure on AlertFlow from {device_id}: {e}"),
                    },
                    Ok(None) => {
                        info!("AlertFlow connection for {device_id} closed");
                        break;
                    }
                    Err(e) => {
                        warn!("AlertFlow read error for {device_id}: {e}");
                        break;
                    }
                }
            }
        });
    }

    async fn listen_for_reports(&self, endpoint: &mut ReliableEndpoint, device_id: &str) -> Result<()> {
        loop {
            let Some((datagram, _peer)) = endpoint.receive(false).await? else {
                continue;
            };
            if datagram.is_fin() {
                info!("agent {device_id} sent FIN; closing worker session");
                endpoint.send_ack(&datagram).await?;
                return Ok(());
            }
            if datagram.payload_size() == 0 {
                continue;
            }

            let message = match ControlMessage::decode(&datagram.payload) {
                Ok(m) => m,
                Err(e) => {
                    warn!("decode failure while listening for reports from {device_id}: {e}");
                    continue;
                }
            };

            if message.tag != Tag::Report {
                warn!("expected a report, got {:?} from {device_id}; ignored", message.tag);
                continue;
            }

            endpoint.send_ack(&datagram).await?;
            let report = match Report::decode(&message.payload) {
                Ok(r) => r,
                Err(e) => {
                    warn!("decode failure parsing report body from {device_id}: {e}");
                    continue;
                }
            };

            if let Err(e) = self.log_sink.append_report(&report) {
                error!("failed to persist report for {device_id}: {e}");
            }
        }
    }
}
