//! Refresh scheduler
//!
//! Decides when the external identity is looked up. All work runs on one
//! task that consumes [`SchedulerEvent`]s, so refresh attempts never overlap.
//!
//! ## Phases
//! - `Idle`: not enabled, every event except `Enable` is ignored
//! - `Active`: steady timer armed, network/manual triggers accepted
//! - `Suspended`: session idle/locked, timers cancelled, triggers ignored
//! - `Draining`: transient while `disable()` tears everything down
//!
//! ## Triggers
//! - enable / resume → immediate attempt + steady timer armed
//! - steady timer → attempt, then re-arm a full period whatever the outcome
//! - network available → one attempt after a settle delay; while that delay
//!   is pending further network events are ignored
//! - manual → immediate attempt
//!
//! Every attempt goes through [`DebounceGate`] first.

pub mod debounce;
pub mod timers;


use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::cache::{AssetCache, CacheKey};
use crate::config::ScheduleConfig;
use crate::errors::LookupError;
use crate::events::{EventSink, EventSource, Presence};
use crate::identity::types::Identity;
use crate::identity::{ChangeOutcome, IdentityStore};
use crate::lookup::LookupClient;
use crate::notify::{DisplayState, Notifier};
pub use debounce::DebounceGate;
use timers::{TimerKind, TimerTable, TimerToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Suspended,
    Draining,
}

/// Everything the scheduler reacts to
#[derive(Debug)]
pub enum SchedulerEvent {
    Enable,
    /// Only sent by test handles; production stops through `Shutdown`
    #[cfg(test)]
    Disable,
    /// Disable and leave the event loop
    Shutdown,
    NetworkChanged { available: bool },
    PresenceChanged(Presence),
    RefreshRequested,
    TimerFired(TimerToken),
}

/// Why a refresh attempt was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Enable,
    SteadyTimer,
    NetworkSettled,
    Resume,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Enable => write!(f, "enable"),
            Trigger::SteadyTimer => write!(f, "steady-timer"),
            Trigger::NetworkSettled => write!(f, "network"),
            Trigger::Resume => write!(f, "resume"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Rejected by the debounce gate; nothing was called
    Debounced,
    Completed(ChangeOutcome),
}

/// Injected collaborators
pub struct Collaborators {
    pub lookup: Arc<dyn LookupClient>,
    /// Asset pre-warming is skipped when absent
    pub cache: Option<Arc<dyn AssetCache>>,
    pub notifier: Arc<dyn Notifier>,
    pub display: Arc<dyn DisplayState>,
}

/// Cloneable handle for driving a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: UnboundedSender<SchedulerEvent>,
}

impl SchedulerHandle {
    pub fn enable(&self) {
        self.send(SchedulerEvent::Enable);
    }

    #[cfg(test)]
    pub fn disable(&self) {
        self.send(SchedulerEvent::Disable);
    }

    pub fn shutdown(&self) {
        self.send(SchedulerEvent::Shutdown);
    }

    #[cfg(test)]
    pub fn network_changed(&self, available: bool) {
        self.send(SchedulerEvent::NetworkChanged { available });
    }

    #[cfg(test)]
    pub fn presence_changed(&self, presence: Presence) {
        self.send(SchedulerEvent::PresenceChanged(presence));
    }

    #[cfg(test)]
    pub fn refresh_now(&self) {
        self.send(SchedulerEvent::RefreshRequested);
    }

    fn send(&self, event: SchedulerEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Scheduler already stopped, dropping {:?}", e.0);
        }
    }
}

pub struct RefreshScheduler {
    config: ScheduleConfig,
    lookup: Arc<dyn LookupClient>,
    cache: Option<Arc<dyn AssetCache>>,
    notifier: Arc<dyn Notifier>,
    display: Arc<dyn DisplayState>,
    prewarm_maps: bool,

    sources: Vec<Box<dyn EventSource>>,
    subscriptions: Vec<JoinHandle<()>>,

    phase: Phase,
    store: IdentityStore,
    last_check: Option<Instant>,
    timers: TimerTable,

    tx: UnboundedSender<SchedulerEvent>,
    rx: UnboundedReceiver<SchedulerEvent>,
}

impl RefreshScheduler {
    /// Fails only on invalid configuration
    pub fn new(config: ScheduleConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            lookup: collaborators.lookup,
            cache: collaborators.cache,
            notifier: collaborators.notifier,
            display: collaborators.display,
            prewarm_maps: false,
            sources: Vec::new(),
            subscriptions: Vec::new(),
            phase: Phase::Idle,
            store: IdentityStore::new(),
            last_check: None,
            timers: TimerTable::new(tx.clone()),
            tx,
            rx,
        })
    }

    pub fn with_event_source(mut self, source: impl EventSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Also download a map for the identity's coordinates
    pub fn with_map_prewarm(mut self, enabled: bool) -> Self {
        self.prewarm_maps = enabled;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.tx.clone(),
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    pub fn current_identity(&self) -> Option<&Identity> {
        self.store.current()
    }

    /// Event loop; returns after a shutdown request
    pub async fn run(mut self) {
        info!("Refresh scheduler running");
        while let Some(event) = self.rx.recv().await {
            if !self.dispatch(event).await {
                break;
            }
        }
        self.disable();
        info!("Refresh scheduler stopped");
    }

    /// Handle one event; `false` once the loop should stop
    pub async fn dispatch(&mut self, event: SchedulerEvent) -> bool {
        match event {
            SchedulerEvent::Enable => self.enable().await,
            #[cfg(test)]
            SchedulerEvent::Disable => self.disable(),
            SchedulerEvent::Shutdown => {
                self.disable();
                return false;
            }
            SchedulerEvent::NetworkChanged { available } => self.handle_network_changed(available),
            SchedulerEvent::PresenceChanged(presence) => {
                self.handle_presence_changed(presence).await
            }
            SchedulerEvent::RefreshRequested => self.refresh_now().await,
            SchedulerEvent::TimerFired(token) => {
                if !self.timers.fire(token) {
                    debug!("Dropping stale {:?} timer", token.kind);
                    return true;
                }
                match token.kind {
                    TimerKind::Steady => self.handle_steady_tick().await,
                    TimerKind::NetworkSettle => self.handle_network_settled().await,
                }
            }
        }
        true
    }

    /// `Idle -> Active`: attach sources, check immediately, arm the steady timer
    pub async fn enable(&mut self) {
        if self.phase != Phase::Idle {
            debug!("Enable ignored, scheduler is {:?}", self.phase);
            return;
        }

        info!(
            "Enabling scheduler (poll every {:?}, min spacing {:?})",
            self.config.poll_interval(),
            self.config.min_time_between_checks()
        );
        self.phase = Phase::Active;
        self.attach_sources();

        self.refresh(Trigger::Enable).await;
        self.arm_steady_timer();
    }

    /// Any phase `-> Idle`, cancelling every timer and detaching sources
    pub fn disable(&mut self) {
        if self.phase == Phase::Idle {
            debug!("Scheduler already disabled");
            return;
        }

        self.phase = Phase::Draining;
        debug!("Draining scheduler");

        self.timers.cancel_all();
        for subscription in self.subscriptions.drain(..) {
            subscription.abort();
        }
        self.store.clear();
        self.last_check = None;

        self.phase = Phase::Idle;
        info!("Scheduler disabled");
    }

    pub async fn handle_steady_tick(&mut self) {
        if self.phase != Phase::Active {
            debug!("Steady tick ignored while {:?}", self.phase);
            return;
        }

        self.refresh(Trigger::SteadyTimer).await;
        self.arm_steady_timer();
    }

    pub fn handle_network_changed(&mut self, available: bool) {
        if self.phase != Phase::Active {
            debug!("Network event ignored while {:?}", self.phase);
            return;
        }
        if !available {
            debug!("Network went away, waiting for it to come back");
            return;
        }
        if self.timers.is_pending(TimerKind::NetworkSettle) {
            debug!("Network refresh already pending");
            return;
        }

        let delay = self.config.network_event_refresh_delay();
        info!("Network event, re-checking external IP in {:?}", delay);
        self.timers.arm(TimerKind::NetworkSettle, delay);
    }

    pub async fn handle_presence_changed(&mut self, presence: Presence) {
        match (self.phase, presence.is_away()) {
            (Phase::Active, true) => self.suspend(),
            (Phase::Suspended, false) => self.resume().await,
            (phase, _) => debug!("Presence {:?} ignored while {:?}", presence, phase),
        }
    }

    /// Manual refresh request; leaves the steady timer alone
    pub async fn refresh_now(&mut self) {
        if self.phase != Phase::Active {
            debug!("Refresh request ignored while {:?}", self.phase);
            return;
        }
        self.refresh(Trigger::Manual).await;
    }

    async fn handle_network_settled(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        self.refresh(Trigger::NetworkSettled).await;
    }

    fn suspend(&mut self) {
        self.timers.cancel_all();
        self.phase = Phase::Suspended;
        info!("Session idle, external IP checks suspended");
    }

    async fn resume(&mut self) {
        self.timers.cancel_all();
        self.phase = Phase::Active;
        info!("Session active again, re-checking external IP");

        self.refresh(Trigger::Resume).await;
        self.arm_steady_timer();
    }

    fn arm_steady_timer(&mut self) {
        if self.phase == Phase::Active {
            self.timers.arm(TimerKind::Steady, self.config.poll_interval());
        }
    }

    fn attach_sources(&mut self) {
        for source in &self.sources {
            debug!("Subscribing to {} events", source.name());
            let sink = EventSink::new(self.tx.clone());
            self.subscriptions.push(source.subscribe(sink));
        }
    }

    /// One refresh attempt: gate → lookup → change detection → callbacks
    pub async fn refresh(&mut self, trigger: Trigger) -> RefreshOutcome {
        let now = Instant::now();
        let min_interval = self.config.min_time_between_checks();
        if !DebounceGate::accept(now, self.last_check, min_interval) {
            debug!(%trigger, "Skipping lookup, last check was less than {:?} ago", min_interval);
            return RefreshOutcome::Debounced;
        }
        self.last_check = Some(now);

        debug!(%trigger, "Checking external IP");
        let lookup_timeout = self.config.lookup_timeout();
        let result = match timeout(lookup_timeout, self.lookup.fetch_identity()).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(lookup_timeout)),
        };

        let outcome = self.store.apply_result(result);
        match &outcome {
            ChangeOutcome::Failed(e) => {
                warn!(%trigger, "Lookup failed: {}", e);
                self.notifier.on_lookup_failed(e);
                return RefreshOutcome::Completed(outcome);
            }
            ChangeOutcome::Changed { old, new } => {
                info!(%trigger, "External IP changed: {} -> {}", old, new);
                self.notifier.on_identity_changed(old, new);
            }
            ChangeOutcome::FirstSeen(identity) => {
                info!(%trigger, "External IP is {}", identity);
            }
            ChangeOutcome::NoChange => {
                debug!(%trigger, "External IP unchanged");
            }
        }

        if let Some(current) = self.store.current() {
            self.display.update(&current.ip_address, &current.country_code);
        }

        match &outcome {
            ChangeOutcome::Changed { new, .. } | ChangeOutcome::FirstSeen(new) => {
                self.enrich(new).await;
            }
            _ => {}
        }

        RefreshOutcome::Completed(outcome)
    }

    /// Assets and ASN details for a new identity; failures only cost the extras
    async fn enrich(&self, identity: &Identity) {
        if let Some(cache) = &self.cache {
            let mut keys = Vec::new();
            keys.extend(CacheKey::flag(&identity.country_code));
            if self.prewarm_maps {
                if let Some((lat, lon)) = identity.coordinates() {
                    keys.push(CacheKey::map(lat, lon));
                }
            }

            for key in keys {
                match cache.get_or_fetch(&key).await {
                    Ok(path) => self.display.show_asset(key.kind(), &path),
                    Err(e) => warn!("Continuing without {}: {}", key, e),
                }
            }
        }

        let lookup_timeout = self.config.lookup_timeout();
        match timeout(lookup_timeout, self.lookup.fetch_asn_info()).await {
            Ok(Ok(asn)) => self.display.show_asn(&asn),
            Ok(Err(e)) => debug!("ASN lookup failed (non-critical): {}", e),
            Err(_) => debug!("ASN lookup timed out after {:?}", lookup_timeout),
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.abort();
        }
    }
}
