//! Cancel-aware one-shot timers
//!
//! Each armed timer is a tokio task that sleeps and then posts its token to
//! the scheduler's channel. Cancelling aborts the task and forgets the slot,
//! so a token that was already queued no longer matches and is dropped.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::SchedulerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Steady-state polling period
    Steady,
    /// Delayed refresh after a network-available event
    NetworkSettle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    generation: u64,
}

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct TimerTable {
    tx: UnboundedSender<SchedulerEvent>,
    slots: HashMap<TimerKind, Slot>,
    next_generation: u64,
}

impl TimerTable {
    pub fn new(tx: UnboundedSender<SchedulerEvent>) -> Self {
        Self {
            tx,
            slots: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Arm `kind` to fire after `delay`, replacing any pending timer of that kind
    pub fn arm(&mut self, kind: TimerKind, delay: Duration) -> TimerToken {
        self.cancel(kind);

        let token = TimerToken {
            kind,
            generation: self.next_generation,
        };
        self.next_generation += 1;

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SchedulerEvent::TimerFired(token));
        });

        self.slots.insert(
            kind,
            Slot {
                generation: token.generation,
                handle,
            },
        );
        token
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Returns whether a timer was pending
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slots.remove(&kind) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }

    /// Claim a fired token; `false` means it was cancelled or superseded
    pub fn fire(&mut self, token: TimerToken) -> bool {
        match self.slots.get(&token.kind) {
            Some(slot) if slot.generation == token.generation => {
                self.slots.remove(&token.kind);
                true
            }
            _ => false,
        }
    }
}

impl Drop for TimerTable {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
