//! Network availability monitor
//!
//! Polls the OS routing table by "connecting" a UDP socket to a probe target
//! (no datagram is sent) and reading back the chosen local address. A route
//! appearing or the local address changing means the network came up or
//! moved; the route disappearing means it went down.

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{EventSink, EventSource};
use crate::config::NetworkConfig;

pub struct NetworkMonitor {
    interval: Duration,
    target: SocketAddr,
}

impl NetworkMonitor {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let target: SocketAddr = config
            .probe_target
            .parse()
            .with_context(|| format!("invalid network.probe_target {:?}", config.probe_target))?;

        Ok(Self {
            interval: Duration::from_secs(config.probe_interval_secs),
            target,
        })
    }
}

impl EventSource for NetworkMonitor {
    fn name(&self) -> &'static str {
        "network"
    }

    fn subscribe(&self, sink: EventSink) -> JoinHandle<()> {
        let interval = self.interval;
        let target = self.target;

        tokio::spawn(async move {
            let mut last = probe_local_addr(target).await;
            info!(
                "Network monitor started (route via {:?}, every {:?})",
                last, interval
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = probe_local_addr(target).await;
                if let Some(available) = route_change(last, current) {
                    info!(
                        "Network event: {:?} -> {:?} (available: {})",
                        last, current, available
                    );
                    sink.network_changed(available);
                }
                last = current;
            }
        })
    }
}

/// Local address the OS would use to reach `target`, if any
async fn probe_local_addr(target: SocketAddr) -> Option<IpAddr> {
    let bind = if target.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };

    let socket = match UdpSocket::bind(bind).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!("Probe socket bind failed: {}", e);
            return None;
        }
    };
    if let Err(e) = socket.connect(target).await {
        debug!("No route to {}: {}", target, e);
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// `Some(true)` when the network came up or moved, `Some(false)` when it went away
fn route_change(previous: Option<IpAddr>, current: Option<IpAddr>) -> Option<bool> {
    match (previous, current) {
        (None, Some(_)) => Some(true),
        (Some(old), Some(new)) if old != new => Some(true),
        (Some(_), None) => Some(false),
        _ => None,
    }
}
