use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use log::{info, warn};
use netwatch_metrics::MetricsProvider;
use netwatch_proto::{ControlMessage, Endpoint, Flags, Tag, Task};
use netwatch_transport::{write_framed, ReliableEndpoint};
use tokio::net::TcpSocket;
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};
use crate::runner::TaskRunner;

/// The well-known NetTask entry port every agent SYNs first.
pub const NETTASK_SERVER_PORT: u16 = 9000;

const UNSPECIFIED: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Drives an agent through IDLE -> HANDSHAKING -> IDENTIFYING ->
/// RECEIVING_TASKS -> ALERTFLOW_CONNECTING -> RUNNING -> CLOSED.
pub struct Agent {
    device_id: String,
    server_host: IpAddr,
    local_port: u16,
    metrics: Arc<dyn MetricsProvider>,
}

impl Agent {
    pub async fn resolve(server_host: &str, device_id: String, local_port: u16) -> Result<Self> {
        let host = resolve_host(server_host).await?;
        Ok(Agent { device_id, server_host: host, local_port, metrics: Arc::new(netwatch_metrics::SysinfoMetrics::new()) })
    }

    pub async fn run(self) -> Result<()> {
        let mut endpoint = ReliableEndpoint::bind(UNSPECIFIED, self.local_port).await?;
        info!("agent {} bound to local port {}", self.device_id, self.local_port);

        // IDLE -> HANDSHAKING
        let entry = Endpoint::new(self.server_host, NETTASK_SERVER_PORT);
        let synack = endpoint.send_and_wait_ack(entry, Flags::SYN, Vec::new(), None).await?;
        let session_port = synack.origin.port;
        let session = Endpoint::new(self.server_host, session_port);
        endpoint.send_ack(&synack).await?;
        info!("handshake complete; session port is {session_port}");

        // HANDSHAKING -> IDENTIFYING
        let identify = ControlMessage::identify(self.device_id.clone()).encode()?;
        endpoint.send_and_wait_ack(session, Flags::ACK, identify, None).await?;
        info!("sent identification as deviceID {}", self.device_id);

        // IDENTIFYING -> RECEIVING_TASKS
        let tasks = self.collect_tasks(&mut endpoint).await?;
        info!("collected {} task(s)", tasks.len());

        // RECEIVING_TASKS -> ALERTFLOW_CONNECTING
        let alertflow = self.connect_alertflow(endpoint.local().port, session_port).await?;
        info!("AlertFlow connection established to {}:{session_port}", self.server_host);

        // ALERTFLOW_CONNECTING -> RUNNING
        self.run_tasks(endpoint, session, tasks, alertflow).await
    }

    async fn collect_tasks(&self, endpoint: &mut ReliableEndpoint) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        loop {
            let (datagram, _peer) = match endpoint.receive(false).await? {
                Some(pair) => pair,
                None => continue,
            };
            if datagram.payload_size() == 0 {
                continue;
            }

            let message = match ControlMessage::decode(&datagram.payload) {
                Ok(m) => m,
                Err(e) => {
                    warn!("decode failure while receiving tasks: {e}");
                    continue;
                }
            };

            match message.tag {
                Tag::Task | Tag::FinalTask => {
                    endpoint.send_ack(&datagram).await?;
                    let task = Task::decode(&message.payload)?;
                    let is_final = message.tag == Tag::FinalTask;
                    info!("received task {}", task.task_id);
                    tasks.push(task);
                    if is_final {
                        return Ok(tasks);
                    }
                }
                other => warn!("unexpected control tag while receiving tasks: {other:?}"),
            }
        }
    }

    async fn connect_alertflow(&self, bound_port: u16, session_port: u16) -> Result<tokio::net::TcpStream> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::new(UNSPECIFIED, bound_port))?;
        let stream = socket.connect(SocketAddr::new(self.server_host, session_port)).await?;
        Ok(stream)
    }

    async fn run_tasks(
        &self,
        mut endpoint: ReliableEndpoint,
        session: Endpoint,
        tasks: Vec<Task>,
        alertflow: tokio::net::TcpStream,
    ) -> Result<()> {
        let (mut alertflow_read, mut alertflow_write) = alertflow.into_split();
        // drop the read half's worth of traffic: agents never expect the server to
        // push anything back over AlertFlow.
        tokio::spawn(async move {
            let mut scratch = [0u8; 1];
            use tokio::io::AsyncReadExt;
            let _ = alertflow_read.read(&mut scratch).await;
        });

        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let (alert_tx, mut alert_rx) = mpsc::unbounded_channel();

        let mut runners = Vec::with_capacity(tasks.len());
        for task in tasks {
            let runner = TaskRunner::new(
                self.device_id.clone(),
                task,
                self.metrics.clone(),
                report_tx.clone(),
                alert_tx.clone(),
            );
            runners.push(runner.spawn());
        }
        drop(report_tx);
        drop(alert_tx);

        let alert_writer = tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                let encoded = match alert.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("failed to encode alert: {e}");
                        continue;
                    }
                };
                if let Err(e) = write_framed(&mut alertflow_write, &encoded).await {
                    warn!("AlertFlow write failed: {e}");
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                report = report_rx.recv() => {
                    let Some(report) = report else { break };
                    let envelope = ControlMessage::report(self.device_id.clone(), report.encode()?);
                    endpoint.send_and_wait_ack(session, Flags::ACK, envelope.encode()?, None).await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, closing session");
                    break;
                }
            }
        }

        // RUNNING -> CLOSED
        endpoint.send_and_wait_ack(session, Flags::FIN, Vec::new(), None).await?;
        alert_writer.abort();
        for runner in runners {
            runner.abort();
        }
        info!("session closed");
        Ok(())
    }
}

async fn resolve_host(host: &str) -> Result<IpAddr> {
    let mut addrs = tokio::net::lookup_host((host, NETTASK_SERVER_PORT)).await?;
    addrs.next().map(|a| a.ip()).ok_or_else(|| AgentError::UnresolvedHost(host.to_string()))
}
