//! Externally supplied configuration.
//!
//! Sources, from lowest to highest precedence:
//! * built-in defaults,
//! * an optional `whereabouts.toml` (or the file named by `WHEREABOUTS_CONFIG`),
//! * `WHEREABOUTS_*` environment variables (e.g. `WHEREABOUTS_ROOM_COUNT`),
//! * the bare `PORT` and `DATABASE_URL` variables used by hosted deployments.

use std::env;
use std::time::Duration;

use chrono::TimeDelta;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{Result, WhereaboutsError};
use crate::inference::Round;
use crate::persist::PersistenceMode;

const DEFAULT_CONFIG_FILE: &str = "whereabouts";

/// A device to room assignment seeded into the directory at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceAssignment {
    pub device: String,
    pub room: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    pub boot_webhook_url: Option<String>,
    pub location_webhook_url: Option<String>,
    /// Number of rooms that must report before a location is inferred.
    pub room_count: usize,
    pub lock_timeout_ms: u64,
    pub notify_timeout_ms: u64,
    /// Half-width of the window, centered on now, in which a room counts as reporting.
    pub window_secs: i64,
    #[serde(default)]
    pub devices: Vec<DeviceAssignment>,
}

impl Settings {
    /// Loads settings from the config file and the environment.
    pub fn load() -> Result<Settings> {
        let file =
            env::var("WHEREABOUTS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let builder = defaults()?
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix("WHEREABOUTS").try_parsing(true))
            .set_override_option("port", env::var("PORT").ok())?
            .set_override_option("database_url", env::var("DATABASE_URL").ok())?;
        Self::build(builder)
    }

    /// Loads settings from TOML text layered over the defaults, ignoring the environment.
    pub fn from_toml(text: &str) -> Result<Settings> {
        Self::build(defaults()?.add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(WhereaboutsError::Config("port must be non-zero".into()));
        }
        if self.room_count == 0 {
            return Err(WhereaboutsError::Config("room_count must be at least 1".into()));
        }
        if self.window_secs <= 0 {
            return Err(WhereaboutsError::Config("window_secs must be positive".into()));
        }
        if self.lock_timeout_ms == 0 || self.notify_timeout_ms == 0 {
            return Err(WhereaboutsError::Config("timeouts must be positive".into()));
        }
        if self.database_url.trim().is_empty() {
            return Err(WhereaboutsError::Config("database_url must be set".into()));
        }
        Ok(())
    }

    pub fn persistence(&self) -> PersistenceMode {
        PersistenceMode::from_url(&self.database_url)
    }

    pub fn round(&self) -> Round {
        Round {
            expected_rooms: self.room_count,
            window: TimeDelta::seconds(self.window_secs),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("port", 8080_i64)?
        .set_default("database_url", "whereabouts.db")?
        .set_default("room_count", 3_i64)?
        .set_default("lock_timeout_ms", 5000_i64)?
        .set_default("notify_timeout_ms", 10000_i64)?
        .set_default("window_secs", 60_i64)?)
}
