//! Unix signal bridge
//!
//! Lets the session (a screen locker hook, a systemd unit, a shell) drive the
//! watcher without any desktop bus:
//! - `SIGUSR1` → presence idle (suspend lookups)
//! - `SIGUSR2` → presence available (resume, refresh immediately)
//! - `SIGHUP`  → refresh now

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{EventSink, EventSource, Presence};

pub struct SignalSource;

impl EventSource for SignalSource {
    fn name(&self) -> &'static str {
        "signals"
    }

    fn subscribe(&self, sink: EventSink) -> JoinHandle<()> {
        tokio::spawn(async move {
            let handlers = (
                signal(SignalKind::user_defined1()),
                signal(SignalKind::user_defined2()),
                signal(SignalKind::hangup()),
            );
            let (mut away, mut back, mut hangup) = match handlers {
                (Ok(away), Ok(back), Ok(hangup)) => (away, back, hangup),
                _ => {
                    warn!("Failed to install signal handlers, presence events disabled");
                    return;
                }
            };

            loop {
                tokio::select! {
                    Some(()) = away.recv() => {
                        info!("SIGUSR1: session idle");
                        sink.presence_changed(Presence::Idle);
                    }
                    Some(()) = back.recv() => {
                        info!("SIGUSR2: session active");
                        sink.presence_changed(Presence::Available);
                    }
                    Some(()) = hangup.recv() => {
                        info!("SIGHUP: refresh requested");
                        sink.refresh_requested();
                    }
                    else => break,
                }
            }
        })
    }
}
