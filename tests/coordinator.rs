use crossbeam::channel::RecvTimeoutError;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tado_poller::coordinator::{self, Coordinator, CoordinatorConfig, CoordinatorStopped};
use tado_poller::models::tado::{MobileDeviceId, Power, ZoneId};
use tado_poller::provider::RemoteProvider;
use tado_poller::shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
use tado_poller::snapshot::{MobileDeviceInfo, SensorReading, WeatherInfo, Zone, ZoneInfo};
use tado_poller::zone_state::{Overlay, OverlayMode, TerminationType, ZoneState};

const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
#[error("scripted failure")]
struct ScriptedFailure;

/// Two-zone home: "Living room" on schedule and "Study" under a permanent overlay.
#[derive(Clone, Default)]
struct Scripted {
    calls: Arc<AtomicUsize>,
    fail_zone_info: Arc<AtomicBool>,
}

impl RemoteProvider for Scripted {
    type Error = ScriptedFailure;

    fn list_mobile_devices(&self) -> Result<Vec<MobileDeviceInfo>, ScriptedFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![MobileDeviceInfo {
            id: MobileDeviceId(1),
            name: "phone".into(),
            geo_tracking_enabled: true,
            at_home: true,
            stale: false,
        }])
    }

    fn get_weather(&self) -> Result<WeatherInfo, ScriptedFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(WeatherInfo {
            outside_temperature_celsius: 4.5,
            solar_intensity_percentage: 12.0,
            weather_state: "CLOUDY".into(),
        })
    }

    fn list_zones(&self) -> Result<Vec<Zone>, ScriptedFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            Zone {
                id: ZoneId(1),
                name: "Living room".into(),
            },
            Zone {
                id: ZoneId(2),
                name: "Study".into(),
            },
        ])
    }

    fn get_zone_info(&self, zone_id: ZoneId) -> Result<ZoneInfo, ScriptedFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if zone_id == ZoneId(2) && self.fail_zone_info.load(Ordering::SeqCst) {
            return Err(ScriptedFailure);
        }
        let overlay = (zone_id == ZoneId(2)).then_some(Overlay {
            mode: OverlayMode::Permanent,
            termination: TerminationType::Manual,
        });
        Ok(ZoneInfo {
            power: Power::On,
            target_temperature_celsius: Some(21.0),
            overlay,
            sensor: SensorReading {
                temperature_celsius: 20.5,
                humidity_percentage: 48.0,
            },
            heating_power_percentage: 15.0,
        })
    }
}

fn config(heartbeat_ms: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_secs(60),
        heartbeat: Duration::from_millis(heartbeat_ms),
    }
}

fn run(coordinator: Coordinator<Scripted>, shutdown: Shutdown) -> JoinHandle<()> {
    thread::spawn(move || coordinator.run(&shutdown))
}

fn stop(trigger: ShutdownTrigger, join: JoinHandle<()>) {
    trigger.trigger();
    let deadline = Instant::now() + WAIT;
    while !join.is_finished() {
        assert!(Instant::now() < deadline, "coordinator did not stop after shutdown");
        thread::sleep(Duration::from_millis(5));
    }
    join.join().unwrap();
}

#[test]
fn no_subscribers_means_no_remote_calls() {
    let provider = Scripted::default();
    let (trigger, shutdown) = shutdown_channel();
    let (_handle, join) = coordinator::spawn(provider.clone(), config(10), shutdown).unwrap();

    thread::sleep(Duration::from_millis(120));

    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    stop(trigger, join);
}

#[test]
fn first_subscriber_is_served_within_a_heartbeat() {
    let (trigger, shutdown) = shutdown_channel();
    let (handle, join) = coordinator::spawn(Scripted::default(), config(20), shutdown).unwrap();

    let started = Instant::now();
    let subscription = handle.subscribe().unwrap();
    let snapshot = subscription.snapshots.recv_timeout(WAIT).unwrap();

    assert!(started.elapsed() < WAIT);
    assert_eq!(snapshot.zones.len(), 2);
    stop(trigger, join);
}

#[test]
fn snapshot_carries_zone_states() {
    let (trigger, shutdown) = shutdown_channel();
    let (handle, join) = coordinator::spawn(Scripted::default(), config(10), shutdown).unwrap();

    let subscription = handle.subscribe().unwrap();
    let snapshot = subscription.snapshots.recv_timeout(WAIT).unwrap();

    assert_eq!(
        snapshot.zone_states(),
        BTreeMap::from([(ZoneId(1), ZoneState::Auto), (ZoneId(2), ZoneState::Manual)])
    );
    assert_eq!(snapshot.lookup_zone(ZoneId(0), "Study").map(|z| z.id), Some(ZoneId(2)));
    assert_eq!(snapshot.weather.weather_state, "CLOUDY");
    assert!(snapshot.lookup_user(MobileDeviceId(1), "").is_some_and(|u| u.at_home));
    stop(trigger, join);
}

#[test]
fn failed_cycle_broadcasts_nothing() {
    let provider = Scripted::default();
    provider.fail_zone_info.store(true, Ordering::SeqCst);
    let (trigger, shutdown) = shutdown_channel();
    let (handle, join) = coordinator::spawn(provider.clone(), config(10), shutdown).unwrap();

    let subscription = handle.subscribe().unwrap();
    assert_eq!(
        subscription.snapshots.recv_timeout(Duration::from_millis(200)),
        Err(RecvTimeoutError::Timeout)
    );
    assert!(provider.calls.load(Ordering::SeqCst) > 0);

    // The coordinator keeps running; the next cycle succeeds.
    provider.fail_zone_info.store(false, Ordering::SeqCst);
    handle.refresh().unwrap();
    let snapshot = subscription.snapshots.recv_timeout(WAIT).unwrap();
    assert_eq!(snapshot.zone_info.len(), 2);
    stop(trigger, join);
}

#[test]
fn every_subscriber_gets_the_same_snapshot() {
    let coordinator = Coordinator::new(Scripted::default(), config(20));
    let handle = coordinator.handle();
    let a = handle.subscribe().unwrap();
    let b = handle.subscribe().unwrap();
    let (trigger, shutdown) = shutdown_channel();
    let join = run(coordinator, shutdown);

    let from_a = a.snapshots.recv_timeout(WAIT).unwrap();
    let from_b = b.snapshots.recv_timeout(WAIT).unwrap();

    assert!(Arc::ptr_eq(&from_a, &from_b));
    stop(trigger, join);
}

#[test]
fn refresh_delivers_an_extra_snapshot() {
    let provider = Scripted::default();
    let (trigger, shutdown) = shutdown_channel();
    let (handle, join) = coordinator::spawn(provider.clone(), config(10), shutdown).unwrap();

    let subscription = handle.subscribe().unwrap();
    let first = subscription.snapshots.recv_timeout(WAIT).unwrap();
    let calls_after_first = provider.calls.load(Ordering::SeqCst);

    handle.refresh().unwrap();
    let second = subscription.snapshots.recv_timeout(WAIT).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.taken_at >= first.taken_at);
    // devices, weather, zones and one info per zone
    assert_eq!(provider.calls.load(Ordering::SeqCst), calls_after_first + 5);
    stop(trigger, join);
}

#[test]
fn unregistered_subscriber_stops_receiving() {
    let coordinator = Coordinator::new(Scripted::default(), config(20));
    let handle = coordinator.handle();
    let a = handle.subscribe().unwrap();
    let b = handle.subscribe().unwrap();
    let (trigger, shutdown) = shutdown_channel();
    let join = run(coordinator, shutdown);

    a.snapshots.recv_timeout(WAIT).unwrap();
    b.snapshots.recv_timeout(WAIT).unwrap();

    handle.unregister(a.id).unwrap();
    handle.refresh().unwrap();
    b.snapshots.recv_timeout(WAIT).unwrap();

    assert_eq!(
        a.snapshots.recv_timeout(Duration::from_millis(50)),
        Err(RecvTimeoutError::Disconnected)
    );
    stop(trigger, join);
}

#[test]
fn resubscribing_after_everyone_left_is_served_within_heartbeats() {
    let provider = Scripted::default();
    let (trigger, shutdown) = shutdown_channel();
    let cfg = CoordinatorConfig {
        poll_interval: Duration::from_secs(5),
        heartbeat: Duration::from_millis(20),
    };
    let (handle, join) = coordinator::spawn(provider, cfg, shutdown).unwrap();

    let first = handle.subscribe().unwrap();
    first.snapshots.recv_timeout(WAIT).unwrap();
    handle.unregister(first.id).unwrap();
    thread::sleep(Duration::from_millis(100));

    let second = handle.subscribe().unwrap();
    let started = Instant::now();
    second.snapshots.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    stop(trigger, join);
}

#[test]
fn dropped_subscriber_does_not_block_others() {
    let coordinator = Coordinator::new(Scripted::default(), config(20));
    let handle = coordinator.handle();
    let gone = handle.subscribe().unwrap();
    let kept = handle.subscribe().unwrap();
    drop(gone);
    let (trigger, shutdown) = shutdown_channel();
    let join = run(coordinator, shutdown);

    kept.snapshots.recv_timeout(WAIT).unwrap();
    handle.refresh().unwrap();
    kept.snapshots.recv_timeout(WAIT).unwrap();
    stop(trigger, join);
}

#[test]
fn shutdown_interrupts_a_stalled_broadcast() {
    let provider = Scripted::default();
    let (trigger, shutdown) = shutdown_channel();
    let (handle, join) = coordinator::spawn(provider.clone(), config(10), shutdown).unwrap();

    // Never received from, so the broadcast blocks on this subscriber.
    let _stalled = handle.subscribe().unwrap();
    let deadline = Instant::now() + WAIT;
    while provider.calls.load(Ordering::SeqCst) < 5 {
        assert!(Instant::now() < deadline, "no poll happened");
        thread::sleep(Duration::from_millis(5));
    }

    stop(trigger, join);
    assert_eq!(handle.refresh(), Err(CoordinatorStopped));
}
