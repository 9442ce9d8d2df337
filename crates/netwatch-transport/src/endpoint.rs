use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::{debug, warn};
use netwatch_proto::{Datagram, Endpoint, Flags};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

use crate::error::{Result, TransportError};

pub const SOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const SOCK_MAX_RETRIES: u32 = 3;
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Single-owner reliable-datagram endpoint: one execution unit drives its
/// socket at a time (see the concurrency model's shared-resource rule).
pub struct ReliableEndpoint {
    socket: UdpSocket,
    local: Endpoint,
    seq: u32,
    ack: u32,
}

impl ReliableEndpoint {
    pub async fn bind(local_addr: IpAddr, local_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((local_addr, local_port)).await?;
        let bound_port = socket.local_addr()?.port();
        let seq = rand::rng().random_range(1000..=8000);
        Ok(ReliableEndpoint { socket, local: Endpoint::new(local_addr, bound_port), seq, ack: 0 })
    }

    pub fn local(&self) -> Endpoint {
        self.local
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Fire-and-forget send; returns the dispatched datagram.
    pub async fn send(
        &mut self,
        dest: Endpoint,
        flags: Flags,
        payload: Vec<u8>,
        acknr: Option<u32>,
    ) -> Result<Datagram> {
        let datagram = Datagram {
            origin: self.local,
            dest,
            flags,
            seq: self.seq,
            ack: acknr.unwrap_or(self.ack),
            payload,
        };
        let encoded = datagram.encode()?;
        self.socket.send_to(&encoded, SocketAddr::new(dest.addr, dest.port)).await?;
        debug!("sent {flags:?} seq={} ack={} to {}:{}", datagram.seq, datagram.ack, dest.addr, dest.port);
        Ok(datagram)
    }

    /// Stop-and-wait send: retries up to `SOCK_MAX_RETRIES` times with
    /// exponential backoff (2^0, 2^1, 2^2 seconds) until a matching ACK
    /// arrives, or fails with retransmission exhausted.
    pub async fn send_and_wait_ack(
        &mut self,
        dest: Endpoint,
        flags: Flags,
        payload: Vec<u8>,
        acknr: Option<u32>,
    ) -> Result<Datagram> {
        for attempt in 0..SOCK_MAX_RETRIES {
            let sent = self.send(dest, flags, payload.clone(), acknr).await?;
            let expected_ack = sent.seq + sent.payload_size() as u32 + 1;

            match self.receive(true).await? {
                Some((response, _addr)) if response.flags.ack && response.ack == expected_ack => {
                    self.seq += sent.payload_size() as u32 + 1;
                    return Ok(response);
                }
                _ => {
                    warn!("ACK not received (attempt {}/{SOCK_MAX_RETRIES}), resending...", attempt + 1);
                    sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
        Err(TransportError::RetransmissionExhausted(SOCK_MAX_RETRIES))
    }

    /// Blocks for the next datagram. With `with_timeout`, applies a 5 s
    /// deadline and returns `None` on expiry instead of erroring. A decode
    /// failure is logged and treated the same as a timeout: the caller sees
    /// nothing this round rather than a torn-down endpoint.
    pub async fn receive(&mut self, with_timeout: bool) -> Result<Option<(Datagram, SocketAddr)>> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        let (n, addr) = if with_timeout {
            match timeout(SOCK_TIMEOUT, self.socket.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            }
        } else {
            self.socket.recv_from(&mut buf).await?
        };

        match Datagram::decode(&buf[..n]) {
            Ok(datagram) => {
                self.ack = datagram.seq + datagram.payload_size() as u32 + 1;
                debug!("recv {:?} seq={} ack={} from {addr}", datagram.flags, datagram.seq, datagram.ack);
                Ok(Some((datagram, addr)))
            }
            Err(e) => {
                warn!("decode failure from {addr}: {e}");
                Ok(None)
            }
        }
    }

    /// As `receive`, then sends the appropriate ACK before returning.
    pub async fn receive_and_ack(&mut self, with_timeout: bool) -> Result<Option<(Datagram, SocketAddr)>> {
        match self.receive(with_timeout).await? {
            Some((datagram, addr)) => {
                self.send_ack(&datagram).await?;
                Ok(Some((datagram, addr)))
            }
            None => Ok(None),
        }
    }

    /// Sends the correctly flagged acknowledgment for a received datagram.
    /// SYN/FIN replies are themselves retransmitted until ACK'd.
    pub async fn send_ack(&mut self, received: &Datagram) -> Result<()> {
        let flags = received.flags.ack_reply();
        let acknr = received.seq + received.payload_size() as u32 + 1;

        if received.is_syn() || received.is_fin() {
            self.send_and_wait_ack(received.origin, flags, Vec::new(), Some(acknr)).await?;
        } else {
            self.send(received.origin, flags, Vec::new(), Some(acknr)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn handshake_and_ack_roundtrip() {
        let mut a = ReliableEndpoint::bind(LOCALHOST, 0).await.unwrap();
        let mut b = ReliableEndpoint::bind(LOCALHOST, 0).await.unwrap();
        let b_addr = b.local();

        let initial_seq = a.seq();
        let client = tokio::spawn(async move {
            a.send_and_wait_ack(b_addr, Flags::SYN, Vec::new(), None).await.unwrap()
        });

        let (syn, _peer) = b.receive(true).await.unwrap().unwrap();
        assert!(syn.is_syn());
        b.send_ack(&syn).await.unwrap();

        let synack = client.await.unwrap();
        assert!(synack.is_synack());
        assert_eq!(synack.ack, initial_seq + 1);
    }

    #[tokio::test]
    async fn retransmission_exhausted_when_peer_silent() {
        let mut a = ReliableEndpoint::bind(LOCALHOST, 0).await.unwrap();
        let dead = Endpoint::new(LOCALHOST, 1);
        let result = a.send_and_wait_ack(dead, Flags::SYN, Vec::new(), None).await;
        assert!(matches!(result, Err(TransportError::RetransmissionExhausted(3))));
    }

    #[tokio::test]
    async fn ack_mismatch_leaves_seq_unchanged() {
        let mut a = ReliableEndpoint::bind(LOCALHOST, 0).await.unwrap();
        let mut b = ReliableEndpoint::bind(LOCALHOST, 0).await.unwrap();
        let b_addr = b.local();
        let initial_seq = a.seq();

        let client = tokio::spawn(async move {
            let result = a.send_and_wait_ack(b_addr, Flags::ACK, b"hi".to_vec(), None).await;
            (a, result)
        });

        // Reply with a deliberately wrong ack number every time; the sender must
        // exhaust its retries without ever advancing seq.
        for _ in 0..SOCK_MAX_RETRIES {
            if let Some((received, peer)) = b.receive(true).await.unwrap() {
                b.send(Endpoint::new(peer.ip(), peer.port()), Flags::ACK, Vec::new(), Some(received.seq + 999))
                    .await
                    .unwrap();
            }
        }

        let (a, result) = client.await.unwrap();
        assert!(result.is_err());
        assert_eq!(a.seq(), initial_seq);
    }
}
