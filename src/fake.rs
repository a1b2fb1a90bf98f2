//! Synthetic home for running without tado° credentials.
//!
//! Values follow daily and seasonal curves with seeded noise, so consecutive polls
//! look like a plausible house rather than white noise.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::f64::consts::PI;
use thiserror::Error;

use crate::models::tado::{MobileDeviceId, Power, ZoneId};
use crate::provider::RemoteProvider;
use crate::snapshot::{MobileDeviceInfo, SensorReading, WeatherInfo, Zone, ZoneInfo};
use crate::zone_state::{Overlay, OverlayMode, TerminationType};

const ZONE_NAMES: [&str; 8] = [
    "Living Room",
    "Kitchen",
    "Bedroom 1",
    "Bedroom 2",
    "Home Office",
    "Bathroom",
    "Hallway",
    "Nursery",
];
const DEVICE_NAMES: [&str; 2] = ["Alice's phone", "Bob's phone"];

#[derive(Debug, Error)]
#[error("zone {0} does not exist in the fake home")]
pub struct UnknownZone(pub ZoneId);

pub struct FakeProvider {
    rng: RefCell<SmallRng>,
    clock: fn() -> DateTime<Utc>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new(0x0420_1337_DEAD_BEEF)
    }
}

impl FakeProvider {
    pub fn new(seed: u64) -> Self {
        FakeProvider {
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
            clock: Utc::now,
        }
    }

    /// Pins the time the curves are evaluated at.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn outside_temp(&self, now: DateTime<Utc>, rng: &mut SmallRng) -> f64 {
        let seasonal = (annual_fraction(now) * 2.0 * PI).sin() * 12.0;
        let diurnal = ((day_fraction(now) - 0.3) * 2.0 * PI).sin() * 5.0;
        (8.5 + seasonal + diurnal + rng.random_range(-1.8..=1.8)).clamp(-12.0, 34.0)
    }
}

impl RemoteProvider for FakeProvider {
    type Error = UnknownZone;

    fn list_mobile_devices(&self) -> Result<Vec<MobileDeviceInfo>, UnknownZone> {
        let now = (self.clock)();
        let mut rng = self.rng.borrow_mut();
        let away_hours = !is_weekend(now.weekday()) && (8..17).contains(&now.hour());
        Ok(DEVICE_NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| MobileDeviceInfo {
                id: MobileDeviceId(index as i64 + 1),
                name: (*name).to_string(),
                geo_tracking_enabled: true,
                at_home: !away_hours || rng.random_bool(0.1),
                stale: rng.random_bool(0.05),
            })
            .collect())
    }

    fn get_weather(&self) -> Result<WeatherInfo, UnknownZone> {
        let now = (self.clock)();
        let mut rng = self.rng.borrow_mut();
        let outside = self.outside_temp(now, &mut rng);
        let daylight = ((day_fraction(now) - 0.5) * PI * 2.0).cos().max(0.0);
        let solar = (daylight * 100.0 * rng.random_range(0.35..=1.0)).clamp(0.0, 100.0);
        Ok(WeatherInfo {
            outside_temperature_celsius: outside,
            solar_intensity_percentage: solar,
            weather_state: classify_weather(outside, solar, &mut rng).to_string(),
        })
    }

    fn list_zones(&self) -> Result<Vec<Zone>, UnknownZone> {
        Ok(ZONE_NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| Zone {
                id: ZoneId(index as i64 + 1),
                name: (*name).to_string(),
            })
            .collect())
    }

    fn get_zone_info(&self, zone_id: ZoneId) -> Result<ZoneInfo, UnknownZone> {
        let index = usize::try_from(zone_id.0 - 1)
            .ok()
            .filter(|i| *i < ZONE_NAMES.len())
            .ok_or(UnknownZone(zone_id))?;
        let now = (self.clock)();
        let mut rng = self.rng.borrow_mut();
        let zone_index = index as f64;

        // A few zones carry fixed overrides so every state shows up in a snapshot.
        let (power, overlay) = match ZONE_NAMES[index] {
            "Hallway" => (Power::Off, None),
            "Bathroom" => (Power::On, Some((OverlayMode::Permanent, TerminationType::Manual))),
            "Home Office" if !is_weekend(now.weekday()) => {
                (Power::On, Some((OverlayMode::Timer, TerminationType::Timer)))
            }
            "Nursery" => (Power::On, Some((OverlayMode::NextBlock, TerminationType::NextTimeBlock))),
            _ => (Power::On, None),
        };

        let outside = self.outside_temp(now, &mut rng);
        let setpoint = (20.2 + zone_index * 0.35 + routine_profile(day_fraction(now)) * 1.2
            + rng.random_range(-0.45..=0.45))
        .clamp(17.5, 24.5);
        let inside = (setpoint - (setpoint - outside).max(0.0) * rng.random_range(0.12..=0.22)
            + rng.random_range(-0.6..=0.6))
        .clamp(15.0, 26.5);
        let humidity = (50.0 + (18.0 - outside).clamp(-12.0, 12.0) * 0.8 + rng.random_range(-6.0..=6.0))
            .clamp(30.0, 75.0);
        let heating = match power {
            Power::Off => 0.0,
            Power::On => ((setpoint - inside).max(0.0) * 55.0 + rng.random_range(0.0..=12.0)).clamp(0.0, 100.0),
        };

        Ok(ZoneInfo {
            power,
            target_temperature_celsius: (power == Power::On).then_some(setpoint),
            overlay: overlay.map(|(mode, termination)| Overlay { mode, termination }),
            sensor: SensorReading {
                temperature_celsius: inside,
                humidity_percentage: humidity,
            },
            heating_power_percentage: heating,
        })
    }
}

fn day_fraction(ts: DateTime<Utc>) -> f64 {
    ts.time().num_seconds_from_midnight() as f64 / 86_400.0
}

fn annual_fraction(ts: DateTime<Utc>) -> f64 {
    ts.ordinal0() as f64 / 365.0
}

fn classify_weather(outside_temp: f64, solar_intensity: f64, rng: &mut SmallRng) -> &'static str {
    let precipitation_roll: f64 = rng.random_range(0.0..1.0);
    if solar_intensity > 70.0 && precipitation_roll > 0.25 {
        "SUN"
    } else if outside_temp < -1.5 {
        if precipitation_roll > 0.5 { "SCATTERED_SNOW" } else { "SNOW" }
    } else if solar_intensity < 22.0 {
        if precipitation_roll > 0.65 {
            "RAIN"
        } else if precipitation_roll > 0.35 {
            "SCATTERED_RAIN"
        } else {
            "CLOUDY"
        }
    } else if solar_intensity < 45.0 {
        "CLOUDY_MOSTLY"
    } else {
        "CLOUDY_PARTLY"
    }
}

fn routine_profile(day_fraction: f64) -> f64 {
    let morning_peak = gaussian(day_fraction, 0.27, 0.045) * 1.8;
    let evening_peak = gaussian(day_fraction, 0.77, 0.05) * 2.0;
    (morning_peak + evening_peak).max(0.0)
}

fn gaussian(x: f64, center: f64, width: f64) -> f64 {
    let exponent = -((x - center) * (x - center)) / (2.0 * width * width);
    exponent.exp()
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}
