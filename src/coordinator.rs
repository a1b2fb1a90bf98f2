//! Poll loop and snapshot fan-out.
//!
//! One thread owns the subscriber registry and the poll cadence. Everything else talks
//! to it through a [`Handle`], so registering never races with a broadcast.
//!
//! Cadence is a two-state machine:
//! - `Idle`: nobody is subscribed; the ticker runs at the heartbeat and nothing is polled.
//! - `Active`: at least one subscriber; every tick polls and broadcasts.
//!
//! Broadcast is a blocking hand-off to each subscriber in registration order. A slow
//! subscriber stalls the whole fan-out, but no snapshot is silently dropped. When
//! shutdown fires during a broadcast the remaining deliveries are abandoned.

use chrono::Utc;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::tado::ZoneId;
use crate::provider::RemoteProvider;
use crate::registry::{SnapshotSender, SubscriberId, SubscriptionRegistry};
use crate::shutdown::Shutdown;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Cadence while at least one subscriber is registered.
    pub poll_interval: Duration,
    /// Cadence while idle; bounds how long a first subscriber waits for data.
    pub heartbeat: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Active,
}

/// Outcome of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub next: PollState,
    pub poll: bool,
    /// The ticker must be re-armed at `next`'s cadence.
    pub rearm: bool,
}

impl PollState {
    pub fn cadence(self, config: &CoordinatorConfig) -> Duration {
        match self {
            PollState::Idle => config.heartbeat,
            PollState::Active => config.poll_interval,
        }
    }

    pub fn on_tick(self, subscribers: usize) -> Tick {
        let next = if subscribers == 0 {
            PollState::Idle
        } else {
            PollState::Active
        };
        Tick {
            next,
            poll: next == PollState::Active,
            rearm: next != self,
        }
    }
}

/// Provider call that failed, for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListMobileDevices,
    GetWeather,
    ListZones,
    GetZoneInfo(ZoneId),
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operation::ListMobileDevices => write!(f, "list_mobile_devices"),
            Operation::GetWeather => write!(f, "get_weather"),
            Operation::ListZones => write!(f, "list_zones"),
            Operation::GetZoneInfo(id) => write!(f, "get_zone_info({id})"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("{operation} failed: {source}")]
    Provider {
        operation: Operation,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("zone {0} listed more than once")]
    DuplicateZone(ZoneId),
    #[error("poll cancelled by shutdown")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("coordinator has stopped")]
pub struct CoordinatorStopped;

#[derive(Debug)]
enum Command {
    Register(SubscriberId, SnapshotSender),
    Unregister(SubscriberId),
    Refresh,
}

enum Event {
    Shutdown,
    Command(Command),
    Tick,
}

/// Cloneable entry point for consumers.
#[derive(Debug, Clone)]
pub struct Handle {
    commands: Sender<Command>,
    next_id: Arc<AtomicU64>,
}

/// Receiving side created by [`Handle::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub snapshots: Receiver<Arc<Snapshot>>,
}

impl Handle {
    /// Adds `sender` to the broadcast set. It receives snapshots from the next completed
    /// cycle on, until it is unregistered or its receiver is dropped.
    pub fn register(&self, sender: SnapshotSender) -> Result<SubscriberId, CoordinatorStopped> {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(Command::Register(id, sender))?;
        Ok(id)
    }

    /// Registers a rendezvous channel: every delivery waits until the caller receives.
    pub fn subscribe(&self) -> Result<Subscription, CoordinatorStopped> {
        let (tx, snapshots) = channel::bounded(0);
        let id = self.register(tx)?;
        Ok(Subscription { id, snapshots })
    }

    pub fn unregister(&self, id: SubscriberId) -> Result<(), CoordinatorStopped> {
        self.send(Command::Unregister(id))
    }

    /// Polls and broadcasts right away. An already running poll-interval schedule is not
    /// shifted; a coordinator still idling on the heartbeat switches to it.
    pub fn refresh(&self) -> Result<(), CoordinatorStopped> {
        self.send(Command::Refresh)
    }

    fn send(&self, command: Command) -> Result<(), CoordinatorStopped> {
        self.commands.send(command).map_err(|_| CoordinatorStopped)
    }
}

pub struct Coordinator<P> {
    provider: P,
    config: CoordinatorConfig,
    registry: SubscriptionRegistry,
    state: PollState,
    ticker: Receiver<Instant>,
    commands: Receiver<Command>,
    handle: Handle,
}

impl<P: RemoteProvider> Coordinator<P> {
    pub fn new(provider: P, config: CoordinatorConfig) -> Self {
        let (tx, commands) = channel::unbounded();
        Coordinator {
            provider,
            config,
            registry: SubscriptionRegistry::new(),
            state: PollState::Idle,
            ticker: channel::tick(config.heartbeat),
            commands,
            handle: Handle {
                commands: tx,
                next_id: Arc::new(AtomicU64::new(1)),
            },
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Runs until `shutdown` fires.
    pub fn run(mut self, shutdown: &Shutdown) {
        info!(
            "Coordinator started (heartbeat={}ms, poll_interval={}s)",
            self.config.heartbeat.as_millis(),
            self.config.poll_interval.as_secs_f64()
        );
        self.ticker = channel::tick(self.state.cadence(&self.config));

        loop {
            // Resolve the event first so no channel stays borrowed while handling it.
            let event = select! {
                recv(shutdown.receiver()) -> _ => Event::Shutdown,
                recv(self.commands) -> command => match command {
                    Ok(command) => Event::Command(command),
                    Err(_) => Event::Shutdown,
                },
                recv(self.ticker) -> _ => Event::Tick,
            };

            let flow = match event {
                Event::Shutdown => ControlFlow::Break(()),
                Event::Command(command) => self.on_command(command, shutdown),
                Event::Tick => self.on_tick(shutdown),
            };
            if flow.is_break() {
                break;
            }
        }

        info!("Coordinator stopped ({} subscriber(s) dropped)", self.registry.len());
    }

    fn on_tick(&mut self, shutdown: &Shutdown) -> ControlFlow<()> {
        let tick = self.state.on_tick(self.registry.len());
        if tick.rearm {
            self.enter(tick.next);
        }
        if tick.poll {
            self.cycle(shutdown)
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Switches cadence; the ticker restarts so the first tick comes one full period later.
    fn enter(&mut self, next: PollState) {
        if next != self.state {
            info!("Coordinator {:?} -> {:?}", self.state, next);
            self.state = next;
            self.ticker = channel::tick(next.cadence(&self.config));
        }
    }

    /// Drops back to the heartbeat once nobody is subscribed.
    fn idle_if_empty(&mut self) {
        if self.registry.is_empty() {
            self.enter(PollState::Idle);
        }
    }

    fn on_command(&mut self, command: Command, shutdown: &Shutdown) -> ControlFlow<()> {
        match command {
            Command::Register(id, sender) => {
                self.registry.add(id, sender);
                info!("Subscriber {} registered ({} total)", id, self.registry.len());
            }
            Command::Unregister(id) => {
                if self.registry.remove(id) {
                    info!("Subscriber {} unregistered ({} left)", id, self.registry.len());
                    self.idle_if_empty();
                } else {
                    debug!("Unregister for unknown subscriber {}", id);
                }
            }
            Command::Refresh => {
                if self.registry.is_empty() {
                    debug!("Refresh requested with no subscribers; skipping");
                } else {
                    debug!("Refresh requested");
                    // Counts as the first Active poll.
                    self.enter(PollState::Active);
                    return self.cycle(shutdown);
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// One poll + broadcast. Breaks only on shutdown.
    fn cycle(&mut self, shutdown: &Shutdown) -> ControlFlow<()> {
        let snapshot = match self.poll(shutdown) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(PollError::Cancelled) => return ControlFlow::Break(()),
            Err(e) => {
                warn!("Poll failed; nothing broadcast this cycle: {}", e);
                return ControlFlow::Continue(());
            }
        };

        let delivered = self.broadcast(&snapshot, shutdown)?;
        debug!(
            "Broadcast snapshot (zones={}, devices={}) to {} subscriber(s)",
            snapshot.zones.len(),
            snapshot.users.len(),
            delivered
        );
        ControlFlow::Continue(())
    }

    /// Reads mobile devices, weather, zones and per-zone info, in that order. Any failure
    /// discards everything read so far.
    pub fn poll(&self, shutdown: &Shutdown) -> Result<Snapshot, PollError> {
        let devices = self.call(shutdown, Operation::ListMobileDevices, |p| p.list_mobile_devices())?;
        let weather = self.call(shutdown, Operation::GetWeather, |p| p.get_weather())?;
        let listed = self.call(shutdown, Operation::ListZones, |p| p.list_zones())?;

        let mut zones = BTreeMap::new();
        let mut zone_info = BTreeMap::new();
        for zone in listed {
            let id = zone.id;
            if zones.insert(id, zone).is_some() {
                return Err(PollError::DuplicateZone(id));
            }
            let info = self.call(shutdown, Operation::GetZoneInfo(id), |p| p.get_zone_info(id))?;
            zone_info.insert(id, info);
        }

        Ok(Snapshot {
            taken_at: Utc::now(),
            zones,
            zone_info,
            users: devices.into_iter().map(|d| (d.id, d)).collect(),
            weather,
        })
    }

    fn call<T>(
        &self,
        shutdown: &Shutdown,
        operation: Operation,
        f: impl FnOnce(&P) -> Result<T, P::Error>,
    ) -> Result<T, PollError> {
        if shutdown.is_triggered() {
            return Err(PollError::Cancelled);
        }
        f(&self.provider).map_err(|e| PollError::Provider {
            operation,
            source: Box::new(e),
        })
    }

    /// Returns how many subscribers accepted the snapshot, or breaks if shutdown fired
    /// while a hand-off was pending.
    fn broadcast(&mut self, snapshot: &Arc<Snapshot>, shutdown: &Shutdown) -> ControlFlow<(), usize> {
        let mut delivered = 0;
        let mut gone = Vec::new();

        for (id, tx) in self.registry.iter() {
            select! {
                send(tx, Arc::clone(snapshot)) -> res => match res {
                    Ok(()) => delivered += 1,
                    Err(_) => gone.push(id),
                },
                recv(shutdown.receiver()) -> _ => {
                    info!("Shutdown during broadcast; abandoning remaining deliveries");
                    return ControlFlow::Break(());
                }
            }
        }

        if !gone.is_empty() {
            let pruned = self.registry.prune(&gone);
            debug!("Pruned {} disconnected subscriber(s)", pruned);
            self.idle_if_empty();
        }
        ControlFlow::Continue(delivered)
    }
}

/// Starts the coordinator on its own thread.
pub fn spawn<P>(
    provider: P,
    config: CoordinatorConfig,
    shutdown: Shutdown,
) -> std::io::Result<(Handle, JoinHandle<()>)>
where
    P: RemoteProvider + Send + 'static,
{
    let coordinator = Coordinator::new(provider, config);
    let handle = coordinator.handle();
    let join = thread::Builder::new()
        .name("coordinator".into())
        .spawn(move || coordinator.run(&shutdown))?;
    Ok((handle, join))
}
