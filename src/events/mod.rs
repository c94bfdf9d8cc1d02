//! Event sources feeding the refresh scheduler
//!
//! A source is subscribed when the scheduler is enabled and its task is
//! aborted when the scheduler is disabled. Sources only ever see an
//! [`EventSink`], which can report network/presence changes and ask for a
//! refresh but cannot drive the scheduler's lifecycle.

pub mod network;
#[cfg(unix)]
pub mod signals;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::scheduler::SchedulerEvent;

pub use network::NetworkMonitor;
#[cfg(unix)]
pub use signals::SignalSource;

/// Session presence as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Available,
    /// Idle / screen locked: background work is suspended
    Idle,
}

impl Presence {
    pub fn is_away(self) -> bool {
        matches!(self, Presence::Idle)
    }
}

pub trait EventSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start producing events into `sink`; the returned task is aborted on detach
    fn subscribe(&self, sink: EventSink) -> JoinHandle<()>;
}

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<SchedulerEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: UnboundedSender<SchedulerEvent>) -> Self {
        Self { tx }
    }

    pub fn network_changed(&self, available: bool) {
        self.send(SchedulerEvent::NetworkChanged { available });
    }

    pub fn presence_changed(&self, presence: Presence) {
        self.send(SchedulerEvent::PresenceChanged(presence));
    }

    pub fn refresh_requested(&self) {
        self.send(SchedulerEvent::RefreshRequested);
    }

    fn send(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Scheduler is gone, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_only_idle_is_away() {
        assert!(Presence::Idle.is_away());
        assert!(!Presence::Available.is_away());
    }

    #[test]
    fn test_sink_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);

        sink.network_changed(true);
        sink.presence_changed(Presence::Idle);
        sink.refresh_requested();

        assert!(matches!(
            rx.try_recv(),
            Ok(SchedulerEvent::NetworkChanged { available: true })
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(SchedulerEvent::PresenceChanged(Presence::Idle))
        ));
        assert!(matches!(rx.try_recv(), Ok(SchedulerEvent::RefreshRequested)));
    }

    #[test]
    fn test_sink_survives_closed_scheduler() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        // Must not panic
        EventSink::new(tx).network_changed(false);
    }
}
