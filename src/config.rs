//! Minimal runtime configuration helpers.
//! Everything comes from environment variables; see `Config::from_env`.

use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, path::Path};
use thiserror::Error;

use crate::coordinator::CoordinatorConfig;
use crate::models::tado::HomeId;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HEARTBEAT_MILLIS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TOKEN_FILE: &str = "token.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing refresh token: set TADO_REFRESH_TOKEN or provide {DEFAULT_TOKEN_FILE} in working directory")]
    MissingRefreshToken,
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be a tado home id, got {value:?}")]
    InvalidHomeId { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Initial Tado OAuth refresh token. `None` only when `fake_data` is set.
    pub tado_refresh_token: Option<String>,
    /// Where rotated refresh tokens are written.
    pub tado_refresh_token_file: Option<PathBuf>,
    /// Home to poll; defaults to the account's first home.
    pub tado_home_id: Option<HomeId>,
    pub poll_interval: Duration,
    pub heartbeat: Duration,
    pub request_timeout: Duration,
    /// Serve synthetic data instead of calling the API.
    pub fake_data: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let fake_data = var("FAKE_DATA")
            .map(|s| matches!(s.trim(), "1" | "true" | "TRUE"))
            .unwrap_or(false);

        let explicit_token_file = var("TADO_REFRESH_TOKEN_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        // Prefer env var; fallback to the token file (which then also receives rotations)
        let (tado_refresh_token, tado_refresh_token_file) = match var("TADO_REFRESH_TOKEN") {
            Some(v) if !v.trim().is_empty() => (Some(v.trim().to_string()), explicit_token_file),
            _ => {
                let path = explicit_token_file.unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE));
                match read_token(&path) {
                    Some(token) => (Some(token), Some(path)),
                    None if fake_data => (None, None),
                    None => return Err(ConfigError::MissingRefreshToken),
                }
            }
        };

        let tado_home_id = match var("TADO_HOME_ID") {
            Some(s) if !s.trim().is_empty() => Some(HomeId(s.trim().parse::<i64>().map_err(|_| {
                ConfigError::InvalidHomeId {
                    name: "TADO_HOME_ID",
                    value: s.clone(),
                }
            })?)),
            _ => None,
        };

        Ok(Config {
            tado_refresh_token,
            tado_refresh_token_file,
            tado_home_id,
            poll_interval: Duration::from_secs(positive(&var, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?),
            heartbeat: Duration::from_millis(positive(&var, "HEARTBEAT_MILLIS", DEFAULT_HEARTBEAT_MILLIS)?),
            request_timeout: Duration::from_secs(positive(
                &var,
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            fake_data,
        })
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: self.poll_interval,
            heartbeat: self.heartbeat,
        }
    }
}

fn read_token(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn positive(var: &impl Fn(&str) -> Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match var(name) {
        Some(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<NonZeroU64>()
            .map(NonZeroU64::get)
            .map_err(|_| ConfigError::InvalidNumber { name, value: s }),
        _ => Ok(default),
    }
}
