use std::env;
use std::time::Duration;

use uuid::Uuid;

use crate::error::ConfigError;

const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_RECONNECT_MS: u64 = 1000;
const DEFAULT_GRID_SIZE: i32 = 32;

/// Runtime settings for a board session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub ws_url: String,
    pub api_url: String,
    pub board_id: Option<Uuid>,
    /// Fixed pause between reconnect attempts. There is no backoff.
    pub reconnect_delay: Duration,
    pub snap_to_grid: bool,
    pub grid_size: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            board_id: None,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_MS),
            snap_to_grid: false,
            grid_size: DEFAULT_GRID_SIZE,
        }
    }
}

impl SyncConfig {
    /// Read `BOARDS_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys fall back to defaults,
    /// malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let board_id = match lookup("BOARDS_BOARD_ID") {
            Some(raw) => Some(parse("BOARDS_BOARD_ID", &raw)?),
            None => None,
        };
        let reconnect_ms = match lookup("BOARDS_RECONNECT_MS") {
            Some(raw) => parse("BOARDS_RECONNECT_MS", &raw)?,
            None => DEFAULT_RECONNECT_MS,
        };
        let snap_to_grid = match lookup("BOARDS_SNAP_TO_GRID") {
            Some(raw) => parse_flag("BOARDS_SNAP_TO_GRID", &raw)?,
            None => defaults.snap_to_grid,
        };
        let grid_size: i32 = match lookup("BOARDS_GRID_SIZE") {
            Some(raw) => parse("BOARDS_GRID_SIZE", &raw)?,
            None => defaults.grid_size,
        };
        if grid_size <= 0 {
            return Err(ConfigError::Invalid {
                var: "BOARDS_GRID_SIZE",
                reason: "must be positive".into(),
            });
        }

        Ok(Self {
            ws_url: lookup("BOARDS_WS_URL").unwrap_or(defaults.ws_url),
            api_url: lookup("BOARDS_API_URL").unwrap_or(defaults.api_url),
            board_id,
            reconnect_delay: Duration::from_millis(reconnect_ms),
            snap_to_grid,
            grid_size,
        })
    }

    /// Grid cell to snap drops to, when snapping is on.
    pub fn grid(&self) -> Option<i32> {
        self.snap_to_grid.then_some(self.grid_size)
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got {:?}", other),
        }),
    }
}
