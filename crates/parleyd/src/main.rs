//! parleyd: reference host for the Parley session layer over UDP.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use parley_core::config::{DaemonConfig, ParleyConfig};
use parley_core::{Channel, Identity, SendFlags, SessionEvent};
use parley_sessions::{Messages, Status};

mod udp;

use udp::{PeerBook, UdpTransport};

type Host = Messages<UdpTransport, VecDeque<SessionEvent>>;

/// Most messages echoed per tick.
const ECHO_BATCH: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = ParleyConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ParleyConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ParleyConfig::default()
    });

    let local = if config.identity.local_id.is_valid() {
        config.identity.local_id
    } else {
        derive_identity()
    };
    tracing::info!(identity = %local, bind = %config.network.bind, "parleyd starting");

    let socket = Arc::new(
        UdpSocket::bind(&config.network.bind)
            .await
            .with_context(|| format!("failed to bind {}", config.network.bind))?,
    );
    tracing::info!(addr = %socket.local_addr()?, "socket bound");

    let peers = PeerBook::default();
    for peer in &config.network.peers {
        match peer.addr.parse::<SocketAddr>() {
            Ok(addr) => {
                peers.insert(peer.identity, addr);
            }
            Err(e) => {
                tracing::warn!(peer = %peer.identity, addr = %peer.addr, error = %e, "bad peer address")
            }
        }
    }
    tracing::info!(count = peers.len(), "static peers loaded");

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Session layer ────────────────────────────────────────────────────────
    let transport = UdpTransport::new(socket, peers.clone());
    let receiver_task = tokio::spawn(transport.receiver(local, shutdown_tx.subscribe()).run());

    let mut host: Host = Messages::new(
        local,
        config.sessions.clone(),
        transport,
        VecDeque::new(),
    );

    // Greet configured peers. Two echoing daemons keep the greeting in flight.
    for peer in &config.network.peers {
        let result = host.send_message(
            peer.identity,
            b"hello",
            SendFlags::RELIABLE,
            config.daemon.echo_channel,
        );
        if let Err(e) = result {
            tracing::warn!(peer = %peer.identity, error = %e, "greeting failed");
        }
    }

    let mut tick = tokio::time::interval(config.network.tick_interval());
    let snapshot_every = config.daemon.snapshot_interval_secs;
    let mut snapshot = tokio::time::interval(Duration::from_secs(snapshot_every.max(1)));
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutting down");
                break;
            }

            _ = tick.tick() => {
                host.run_callbacks();
                handle_events(&mut host, &config.daemon);
                if config.daemon.echo {
                    echo(&mut host, config.daemon.echo_channel);
                }
            }

            _ = snapshot.tick(), if snapshot_every > 0 => {
                let sessions = host.sessions();
                tracing::info!(count = sessions.len(), "session table snapshot");
                for s in &sessions {
                    tracing::info!(
                        peer = s.remote_identity.short(),
                        state = %s.state,
                        channels = ?s.channels,
                        queued = s.queued_messages,
                        idle_ms = s.idle.as_millis() as u64,
                        "  session"
                    );
                }
            }
        }
    }

    for info in host.sessions() {
        host.close_session(info.remote_identity);
    }
    let _ = receiver_task.await;
    Ok(())
}

fn handle_events(host: &mut Host, daemon: &DaemonConfig) {
    while let Some(event) = host.events_mut().pop_front() {
        tracing::debug!(peer = %event.identity(), ?event, "session event");
        match event {
            SessionEvent::SessionRequest { identity } => {
                if daemon.auto_accept {
                    host.accept_session(identity);
                } else {
                    tracing::info!(peer = %identity, "session request left pending");
                }
            }
            SessionEvent::SessionFailed { identity, reason } => {
                tracing::warn!(peer = %identity, %reason, "session failed");
            }
        }
    }
}

fn echo(host: &mut Host, channel: Channel) {
    for message in host.receive_messages(channel, ECHO_BATCH) {
        let flags = if message.is_reliable() {
            SendFlags::RELIABLE
        } else {
            SendFlags::UNRELIABLE
        };
        let result = host.send_message(message.sender(), message.payload(), flags, channel);
        match Status::from(&result) {
            Status::Ok => {}
            status => tracing::debug!(peer = %message.sender(), ?status, "echo dropped"),
        }
    }
}

/// Identity for a host with none configured: process id over the low bits
/// of the start time.
fn derive_identity() -> Identity {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or(0);
    let raw = (u64::from(std::process::id()) << 32) | (nanos & 0xffff_ffff);
    Identity::new(raw.max(1))
}
