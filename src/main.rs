use crossbeam::select;
use log::{error, info};
use tado_poller::client::{select_home, TadoClient, TadoHome};
use tado_poller::config::Config;
use tado_poller::coordinator::{self, Handle};
use tado_poller::fake::FakeProvider;
use tado_poller::provider::RemoteProvider;
use tado_poller::shutdown::{shutdown_channel, Shutdown};
use tado_poller::snapshot::Snapshot;

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env().map_err(|e| e.to_string())?;
    info!(
        "Config loaded (poll_interval={}s, heartbeat={}ms, request_timeout={}s, home_id={}, fake_data={})",
        cfg.poll_interval.as_secs(),
        cfg.heartbeat.as_millis(),
        cfg.request_timeout.as_secs(),
        cfg.tado_home_id
            .map(|h| h.0.to_string())
            .unwrap_or_else(|| "-".to_string()),
        cfg.fake_data
    );

    // 2) Ctrl-C stops the coordinator and the consumer below
    let (trigger, shutdown) = shutdown_channel();
    let mut trigger = Some(trigger);
    ctrlc::set_handler(move || {
        if let Some(t) = trigger.take() {
            info!("Interrupt received; shutting down");
            t.trigger();
        }
    })
    .map_err(|e| format!("installing Ctrl-C handler failed: {}", e))?;

    // 3) Pick the data source
    if cfg.fake_data {
        info!("FAKE_DATA enabled; serving a synthetic home");
        return serve(FakeProvider::default(), &cfg, shutdown);
    }

    let refresh_token = cfg
        .tado_refresh_token
        .clone()
        .ok_or_else(|| "missing refresh token".to_string())?;
    let client = TadoClient::new(refresh_token, cfg.tado_refresh_token_file.clone(), cfg.request_timeout)
        .map_err(|e| format!("Tado auth failed (refresh token invalid/expired?): {}", e))?;
    info!("Authenticated to Tado API");

    let me = client.get_me().map_err(|e| format!("get_me failed: {}", e))?;
    let home_id = select_home(&me, cfg.tado_home_id).map_err(|e| e.to_string())?;
    info!("Polling home {}", home_id.0);

    serve(TadoHome::new(client, home_id), &cfg, shutdown)
}

/// Runs the coordinator with a logging subscriber until shutdown.
fn serve<P>(provider: P, cfg: &Config, shutdown: Shutdown) -> Result<(), String>
where
    P: RemoteProvider + Send + 'static,
{
    let (handle, join) = coordinator::spawn(provider, cfg.coordinator(), shutdown.clone())
        .map_err(|e| format!("spawning coordinator failed: {}", e))?;

    log_snapshots(&handle, &shutdown)?;

    join.join().map_err(|_| "coordinator thread panicked".to_string())
}

fn log_snapshots(handle: &Handle, shutdown: &Shutdown) -> Result<(), String> {
    let subscription = handle.subscribe().map_err(|e| e.to_string())?;
    info!("Subscribed as {}", subscription.id);

    loop {
        select! {
            recv(subscription.snapshots) -> snapshot => match snapshot {
                Ok(snapshot) => log_snapshot(&snapshot),
                Err(_) => return Ok(()),
            },
            recv(shutdown.receiver()) -> _ => return Ok(()),
        }
    }
}

fn log_snapshot(snapshot: &Snapshot) {
    let home = snapshot.users.values().filter(|u| u.at_home).count();
    info!(
        "Snapshot at {}: {} zone(s), {}/{} device(s) home, outside {:.1}°C ({})",
        snapshot.taken_at.format("%H:%M:%S"),
        snapshot.zones.len(),
        home,
        snapshot.users.len(),
        snapshot.weather.outside_temperature_celsius,
        snapshot.weather.weather_state
    );
    for (id, zone) in &snapshot.zones {
        let Some(info) = snapshot.zone_info.get(id) else {
            continue;
        };
        info!(
            "  zone {} {:<14} {:<16} inside={:.1}°C humidity={:.0}% heating={:.0}%",
            id,
            zone.name,
            info.state(),
            info.sensor.temperature_celsius,
            info.sensor.humidity_percentage,
            info.heating_power_percentage
        );
    }
}

fn main() {
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    info!(
        "tado-poller {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
