//! Blocking HTTP client for the tado° API, limited to the reads the poller needs.
//!
//! - Blocking client using `ureq` (no async); every request is bounded by the agent's
//!   global timeout.
//! - OAuth2 refresh-token grant against tado's auth server. tado rotates the refresh
//!   token on every exchange, so the new one is written back to the token file when one
//!   is configured.

use http::StatusCode;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::tado::{self, HomeId, ZoneId};
use crate::provider::RemoteProvider;
use crate::snapshot::{MobileDeviceInfo, SensorReading, WeatherInfo, Zone, ZoneInfo};
use crate::zone_state::Overlay;

const BASE_URL: &str = "https://my.tado.com/api/v2";
const OAUTH_TOKEN_URL: &str = "https://login.tado.com/oauth2/token";
const OAUTH_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TadoClientError {
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("auth error: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("home {0} not found for this account")]
    HomeNotFound(i64),
}

#[derive(Debug, Clone)]
struct OAuthToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct OAuthState {
    token: Option<OAuthToken>,
    refresh_token: String,
}

pub struct TadoClient {
    agent: ureq::Agent,
    oauth: RefCell<OAuthState>,
    token_file: Option<PathBuf>,
}

impl TadoClient {
    /// Exchanges `refresh_token` for an access token right away, so bad credentials
    /// surface at startup.
    pub fn new(
        refresh_token: impl Into<String>,
        token_file: Option<PathBuf>,
        request_timeout: Duration,
    ) -> Result<Self, TadoClientError> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build();

        let client = TadoClient {
            agent: ureq::Agent::new_with_config(config),
            oauth: RefCell::new(OAuthState {
                token: None,
                refresh_token: refresh_token.into(),
            }),
            token_file,
        };
        client.refresh_access_token()?;
        Ok(client)
    }

    fn url(path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", BASE_URL, path)
        } else {
            format!("{}/{}", BASE_URL, path)
        }
    }

    fn refresh_access_token(&self) -> Result<String, TadoClientError> {
        #[derive(serde::Deserialize)]
        struct R {
            access_token: String,
            expires_in: u64,
            #[serde(default)]
            refresh_token: Option<String>,
        }

        let current = self.oauth.borrow().refresh_token.clone();
        let mut resp = self
            .agent
            .post(OAUTH_TOKEN_URL)
            .header("Accept", "application/json")
            .send_form([
                ("client_id", OAUTH_CLIENT_ID),
                ("grant_type", "refresh_token"),
                ("refresh_token", current.as_str()),
            ])?;
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(TadoClientError::Auth(format!("http {}: {}", status.as_u16(), body)));
        }

        let R {
            access_token,
            expires_in,
            refresh_token,
        } = decode(&body)?;

        let mut state = self.oauth.borrow_mut();
        if let Some(rotated) = refresh_token.filter(|r| *r != state.refresh_token) {
            self.persist_refresh_token(&rotated);
            state.refresh_token = rotated;
        }
        state.token = Some(OAuthToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });
        debug!("Obtained access token (expires in {}s)", expires_in);
        Ok(access_token)
    }

    fn persist_refresh_token(&self, token: &str) {
        let Some(path) = self.token_file.as_ref() else {
            return;
        };
        // The in-memory token keeps working; only a restart would need the file.
        if let Err(e) = std::fs::write(path, token) {
            warn!("Could not persist rotated refresh token to {}: {}", path.display(), e);
        }
    }

    fn bearer(&self) -> Result<String, TadoClientError> {
        let cached = self
            .oauth
            .borrow()
            .token
            .as_ref()
            .filter(|t| Instant::now() + TOKEN_EXPIRY_MARGIN < t.expires_at)
            .map(|t| t.access_token.clone());
        match cached {
            Some(token) => Ok(token),
            None => self.refresh_access_token(),
        }
    }

    fn call(&self, url: &str, token: &str) -> Result<http::Response<ureq::Body>, TadoClientError> {
        Ok(self
            .agent
            .get(url)
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", token))
            .call()?)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TadoClientError> {
        let url = Self::url(path);
        let mut resp = self.call(&url, &self.bearer()?)?;

        // Retry once on 401 after forcing a refresh
        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!("401 from {}; refreshing access token", path);
            let token = self.refresh_access_token()?;
            resp = self.call(&url, &token)?;
        }

        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(TadoClientError::Http {
                status: status.as_u16(),
                message: body,
            });
        }
        decode(&body)
    }

    pub fn get_me(&self) -> Result<tado::User, TadoClientError> {
        self.get_json("/me")
    }

    pub fn get_mobile_devices(&self, home_id: HomeId) -> Result<Vec<tado::MobileDevice>, TadoClientError> {
        self.get_json(&format!("/homes/{}/mobileDevices", home_id.0))
    }

    pub fn get_weather(&self, home_id: HomeId) -> Result<tado::Weather, TadoClientError> {
        self.get_json(&format!("/homes/{}/weather", home_id.0))
    }

    pub fn get_zones(&self, home_id: HomeId) -> Result<Vec<tado::Zone>, TadoClientError> {
        self.get_json(&format!("/homes/{}/zones", home_id.0))
    }

    pub fn get_zone_state(&self, home_id: HomeId, zone_id: ZoneId) -> Result<tado::ZoneState, TadoClientError> {
        self.get_json(&format!("/homes/{}/zones/{}/state", home_id.0, zone_id.0))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, TadoClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| TadoClientError::Json {
        path: e.path().to_string(),
        source: e.into_inner(),
    })
}

/// Picks `wanted` if the account has it, otherwise the account's lowest home id.
pub fn select_home(me: &tado::User, wanted: Option<HomeId>) -> Result<HomeId, TadoClientError> {
    let mut homes = me
        .homes
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .filter_map(|h| h.id)
        .collect::<Vec<_>>();
    homes.sort_unstable();

    match wanted {
        Some(id) if homes.contains(&id) => Ok(id),
        Some(id) => Err(TadoClientError::HomeNotFound(id.0)),
        None => homes
            .first()
            .copied()
            .ok_or_else(|| TadoClientError::Malformed("account has no homes".into())),
    }
}

/// One home of a [`TadoClient`], as a poll source.
pub struct TadoHome {
    client: TadoClient,
    home_id: HomeId,
}

impl TadoHome {
    pub fn new(client: TadoClient, home_id: HomeId) -> Self {
        TadoHome { client, home_id }
    }
}

impl RemoteProvider for TadoHome {
    type Error = TadoClientError;

    fn list_mobile_devices(&self) -> Result<Vec<MobileDeviceInfo>, TadoClientError> {
        self.client
            .get_mobile_devices(self.home_id)?
            .iter()
            .map(mobile_device_from_wire)
            .collect()
    }

    fn get_weather(&self) -> Result<WeatherInfo, TadoClientError> {
        Ok(weather_from_wire(&self.client.get_weather(self.home_id)?))
    }

    fn list_zones(&self) -> Result<Vec<Zone>, TadoClientError> {
        self.client.get_zones(self.home_id)?.iter().map(zone_from_wire).collect()
    }

    fn get_zone_info(&self, zone_id: ZoneId) -> Result<ZoneInfo, TadoClientError> {
        Ok(zone_info_from_wire(&self.client.get_zone_state(self.home_id, zone_id)?))
    }
}

fn zone_from_wire(zone: &tado::Zone) -> Result<Zone, TadoClientError> {
    let id = zone
        .id
        .ok_or_else(|| TadoClientError::Malformed(format!("zone {:?} has no id", zone.name)))?;
    Ok(Zone {
        id,
        name: zone.name.clone().unwrap_or_default(),
    })
}

fn zone_info_from_wire(state: &tado::ZoneState) -> ZoneInfo {
    let setting = state.setting.as_ref();
    let sensors = state.sensor_data_points.as_ref();
    ZoneInfo {
        // A setting without power is reported for zones that are switched off.
        power: setting.and_then(|s| s.power).unwrap_or(tado::Power::Off),
        target_temperature_celsius: setting.and_then(|s| s.temperature.as_ref()).and_then(|t| t.celsius),
        overlay: state.overlay.as_ref().map(Overlay::from_wire),
        sensor: SensorReading {
            temperature_celsius: sensors
                .and_then(|s| s.inside_temperature.as_ref())
                .and_then(|t| t.celsius)
                .unwrap_or_default(),
            humidity_percentage: sensors
                .and_then(|s| s.humidity.as_ref())
                .and_then(|h| h.percentage)
                .unwrap_or_default(),
        },
        heating_power_percentage: state
            .activity_data_points
            .as_ref()
            .and_then(|a| a.heating_power.as_ref())
            .and_then(|p| p.percentage)
            .unwrap_or_default(),
    }
}

fn weather_from_wire(weather: &tado::Weather) -> WeatherInfo {
    WeatherInfo {
        outside_temperature_celsius: weather
            .outside_temperature
            .as_ref()
            .and_then(|t| t.celsius)
            .unwrap_or_default(),
        solar_intensity_percentage: weather
            .solar_intensity
            .as_ref()
            .and_then(|s| s.percentage)
            .unwrap_or_default(),
        weather_state: weather
            .weather_state
            .as_ref()
            .and_then(|ws| ws.value.clone())
            .unwrap_or_default(),
    }
}

fn mobile_device_from_wire(device: &tado::MobileDevice) -> Result<MobileDeviceInfo, TadoClientError> {
    let id = device
        .id
        .ok_or_else(|| TadoClientError::Malformed(format!("mobile device {:?} has no id", device.name)))?;
    let location = device.location.as_ref();
    Ok(MobileDeviceInfo {
        id,
        name: device.name.clone().unwrap_or_default(),
        geo_tracking_enabled: device
            .settings
            .as_ref()
            .and_then(|s| s.geo_tracking_enabled)
            .unwrap_or(false),
        at_home: location.and_then(|l| l.at_home).unwrap_or(false),
        stale: location.and_then(|l| l.stale).unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tado::{HomeBase, MobileDeviceId, Power};
    use crate::zone_state::{OverlayMode, ZoneState};
    use pretty_assertions::assert_eq;

    const MANUAL_OVERLAY_STATE: &str = r#"{
        "tadoMode": "HOME",
        "setting": {"type": "HEATING", "power": "ON", "temperature": {"celsius": 22.5, "fahrenheit": 72.5}},
        "overlayType": "MANUAL",
        "overlay": {
            "type": "MANUAL",
            "setting": {"type": "HEATING", "power": "ON", "temperature": {"celsius": 22.5}},
            "termination": {"type": "MANUAL", "typeSkillBasedApp": "MANUAL", "projectedExpiry": null}
        },
        "activityDataPoints": {"heatingPower": {"type": "PERCENTAGE", "percentage": 43.0, "timestamp": "2025-01-05T10:00:00.000Z"}},
        "sensorDataPoints": {
            "insideTemperature": {"celsius": 19.8, "fahrenheit": 67.6, "timestamp": "2025-01-05T10:00:00.000Z", "type": "TEMPERATURE", "precision": {"celsius": 0.1, "fahrenheit": 0.1}},
            "humidity": {"type": "PERCENTAGE", "percentage": 51.2, "timestamp": "2025-01-05T10:00:00.000Z"}
        }
    }"#;

    #[test]
    fn zone_state_with_manual_overlay() {
        let wire: tado::ZoneState = decode(MANUAL_OVERLAY_STATE).unwrap();
        let info = zone_info_from_wire(&wire);

        assert_eq!(info.power, Power::On);
        assert_eq!(info.target_temperature_celsius, Some(22.5));
        assert_eq!(info.overlay_mode(), OverlayMode::Permanent);
        assert_eq!(info.sensor.temperature_celsius, 19.8);
        assert_eq!(info.sensor.humidity_percentage, 51.2);
        assert_eq!(info.heating_power_percentage, 43.0);
        assert_eq!(info.state(), ZoneState::Manual);
    }

    #[test]
    fn zone_state_powered_off_without_overlay() {
        let raw = r#"{"setting": {"type": "HEATING", "power": "OFF", "temperature": null}, "overlay": null}"#;
        let info = zone_info_from_wire(&decode(raw).unwrap());

        assert_eq!(info.target_temperature_celsius, None);
        assert_eq!(info.overlay, None);
        assert_eq!(info.state(), ZoneState::Off);
    }

    #[test]
    fn decode_reports_failing_path() {
        let raw = r#"{"setting": {"power": "SIDEWAYS"}}"#;
        let err = decode::<tado::ZoneState>(raw).unwrap_err();
        match err {
            TadoClientError::Json { path, .. } => assert_eq!(path, "setting.power"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn weather_label_uses_api_name() {
        let raw = r#"{
            "solarIntensity": {"type": "PERCENTAGE", "percentage": 68.3, "timestamp": "2025-01-05T10:00:00.000Z"},
            "outsideTemperature": {"celsius": 4.2, "fahrenheit": 39.6, "timestamp": "2025-01-05T10:00:00.000Z", "type": "TEMPERATURE"},
            "weatherState": {"type": "WEATHER_STATE", "value": "CLOUDY_PARTLY", "timestamp": "2025-01-05T10:00:00.000Z"}
        }"#;
        let weather = weather_from_wire(&decode(raw).unwrap());
        assert_eq!(
            weather,
            WeatherInfo {
                outside_temperature_celsius: 4.2,
                solar_intensity_percentage: 68.3,
                weather_state: "CLOUDY_PARTLY".into(),
            }
        );
    }

    #[test]
    fn weather_label_outside_known_set_is_passed_through() {
        let raw = r#"{"weatherState": {"type": "WEATHER_STATE", "value": "THUNDERSTORMS"}}"#;
        let weather = weather_from_wire(&decode(raw).unwrap());
        assert_eq!(weather.weather_state, "THUNDERSTORMS");
    }

    #[test]
    fn mobile_devices_map_location_flags() {
        let raw = r#"[
            {"name": "Pixel", "id": 12, "settings": {"geoTrackingEnabled": true}, "location": {"stale": false, "atHome": true}},
            {"name": "Tablet", "id": 13, "settings": {"geoTrackingEnabled": false}}
        ]"#;
        let wire: Vec<tado::MobileDevice> = decode(raw).unwrap();
        let devices = wire.iter().map(mobile_device_from_wire).collect::<Result<Vec<_>, _>>().unwrap();

        assert_eq!(
            devices,
            vec![
                MobileDeviceInfo {
                    id: MobileDeviceId(12),
                    name: "Pixel".into(),
                    geo_tracking_enabled: true,
                    at_home: true,
                    stale: false,
                },
                MobileDeviceInfo {
                    id: MobileDeviceId(13),
                    name: "Tablet".into(),
                    geo_tracking_enabled: false,
                    at_home: false,
                    stale: false,
                },
            ]
        );
    }

    #[test]
    fn zone_without_id_is_malformed() {
        let zone = tado::Zone {
            name: Some("Attic".into()),
            ..Default::default()
        };
        assert!(matches!(zone_from_wire(&zone), Err(TadoClientError::Malformed(_))));
    }

    #[test]
    fn select_home_prefers_requested_then_lowest() {
        let me = tado::User {
            homes: Some(vec![
                HomeBase {
                    id: Some(HomeId(9)),
                    name: None,
                },
                HomeBase {
                    id: Some(HomeId(4)),
                    name: None,
                },
            ]),
            ..Default::default()
        };
        assert_eq!(select_home(&me, None).unwrap(), HomeId(4));
        assert_eq!(select_home(&me, Some(HomeId(9))).unwrap(), HomeId(9));
        assert!(matches!(select_home(&me, Some(HomeId(1))), Err(TadoClientError::HomeNotFound(1))));
        assert!(select_home(&tado::User::default(), None).is_err());
    }
}
