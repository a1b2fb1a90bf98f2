//! The four reads a poll cycle needs from the remote system.

use crate::models::tado::ZoneId;
use crate::snapshot::{MobileDeviceInfo, WeatherInfo, Zone, ZoneInfo};

/// Read access to the remote system.
///
/// Calls block. Implementations bound each call with their own request deadline; the
/// coordinator only decides whether to make the next call.
pub trait RemoteProvider {
    type Error: std::error::Error + Send + Sync + 'static;

    fn list_mobile_devices(&self) -> Result<Vec<MobileDeviceInfo>, Self::Error>;

    fn get_weather(&self) -> Result<WeatherInfo, Self::Error>;

    fn list_zones(&self) -> Result<Vec<Zone>, Self::Error>;

    fn get_zone_info(&self, zone_id: ZoneId) -> Result<ZoneInfo, Self::Error>;
}
