//! UDP transport for the session layer.
//!
//! One socket carries every peer. Each datagram is a single envelope with
//! the 32-byte header from `parley_core::wire`. Peer addresses come from the
//! config file and from the source address of inbound datagrams.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use parley_core::wire::HEADER_LEN;
use parley_core::{Envelope, Identity};
use parley_sessions::{Inbound, Transport, TransportError};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

/// Identity → last known socket address.
pub type PeerBook = Arc<DashMap<Identity, SocketAddr>>;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peers: PeerBook,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, peers: PeerBook) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            socket,
            peers,
            inbound_tx,
            inbound_rx,
        }
    }

    /// Build the receive task feeding this transport.
    pub fn receiver(&self, local: Identity, shutdown: broadcast::Receiver<()>) -> UdpReceiver {
        UdpReceiver {
            socket: self.socket.clone(),
            peers: self.peers.clone(),
            local,
            inbound: self.inbound_tx.clone(),
            shutdown,
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, to: Identity, envelope: Envelope) -> Result<(), TransportError> {
        let Some(addr) = self.peers.get(&to).map(|entry| *entry) else {
            tracing::debug!(peer = %to, "no address for peer");
            let _ = self.inbound_tx.send(Inbound::PeerLost(to));
            return Ok(());
        };

        let size = HEADER_LEN + envelope.payload.len();
        if size > MAX_DATAGRAM {
            return Err(TransportError::Oversize {
                size,
                max: MAX_DATAGRAM,
            });
        }
        let datagram = envelope.to_datagram().map_err(|e| {
            TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        match self.socket.try_send_to(&datagram, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(TransportError::Busy),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn poll(&mut self) -> Option<Inbound> {
        self.inbound_rx.try_recv().ok()
    }
}

/// Reads datagrams off the shared socket and queues decoded envelopes.
pub struct UdpReceiver {
    socket: Arc<UdpSocket>,
    peers: PeerBook,
    local: Identity,
    inbound: mpsc::UnboundedSender<Inbound>,
    shutdown: broadcast::Receiver<()>,
}

impl UdpReceiver {
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("udp receiver shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, from) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };

                    let envelope = match Envelope::from_datagram(&buf[..len]) {
                        Ok(env) => env,
                        Err(e) => {
                            tracing::debug!(from = %from, error = %e, "undecodable datagram");
                            continue;
                        }
                    };

                    if envelope.sender == self.local || !envelope.sender.is_valid() {
                        tracing::trace!(from = %from, "ignoring datagram from own or invalid identity");
                        continue;
                    }

                    let previous = self.peers.insert(envelope.sender, from);
                    if previous != Some(from) {
                        tracing::info!(peer = %envelope.sender, addr = %from, "learned peer address");
                    }

                    if self.inbound.send(Inbound::Envelope(envelope)).is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
