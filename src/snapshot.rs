//! Immutable view of one successful poll.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::tado::{MobileDeviceId, Power, ZoneId};
use crate::zone_state::{classify, Overlay, OverlayMode, ZoneState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SensorReading {
    pub temperature_celsius: f64,
    pub humidity_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneInfo {
    pub power: Power,
    /// Absent while the zone is powered off.
    pub target_temperature_celsius: Option<f64>,
    pub overlay: Option<Overlay>,
    pub sensor: SensorReading,
    pub heating_power_percentage: f64,
}

impl ZoneInfo {
    pub fn overlay_mode(&self) -> OverlayMode {
        self.overlay.map_or(OverlayMode::None, |o| o.mode)
    }

    pub fn state(&self) -> ZoneState {
        classify(self.power, self.overlay_mode(), self.overlay.map(|o| o.termination))
    }
}

/// A tracked mobile device and its geofencing status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MobileDeviceInfo {
    pub id: MobileDeviceId,
    pub name: String,
    pub geo_tracking_enabled: bool,
    pub at_home: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WeatherInfo {
    pub outside_temperature_celsius: f64,
    pub solar_intensity_percentage: f64,
    /// Provider label, e.g. `SUN` or `CLOUDY_PARTLY`. Empty when not reported.
    pub weather_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub zones: BTreeMap<ZoneId, Zone>,
    pub zone_info: BTreeMap<ZoneId, ZoneInfo>,
    pub users: BTreeMap<MobileDeviceId, MobileDeviceInfo>,
    pub weather: WeatherInfo,
}

impl Snapshot {
    pub fn zone_state(&self, id: ZoneId) -> Option<ZoneState> {
        self.zone_info.get(&id).map(ZoneInfo::state)
    }

    pub fn zone_states(&self) -> BTreeMap<ZoneId, ZoneState> {
        self.zone_info.iter().map(|(id, info)| (*id, info.state())).collect()
    }

    /// Finds a zone by id, falling back to an exact name match. An empty name never
    /// matches.
    pub fn lookup_zone(&self, id: ZoneId, name: &str) -> Option<&Zone> {
        self.zones
            .get(&id)
            .or_else(|| self.zones.values().find(|z| !name.is_empty() && z.name == name))
    }

    /// Finds a tracked device by id, falling back to an exact name match.
    pub fn lookup_user(&self, id: MobileDeviceId, name: &str) -> Option<&MobileDeviceInfo> {
        self.users
            .get(&id)
            .or_else(|| self.users.values().find(|u| !name.is_empty() && u.name == name))
    }
}
