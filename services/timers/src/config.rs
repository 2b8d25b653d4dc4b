//! Service configuration
//!
//! Settings are layered: built-in defaults, then an optional
//! `config/timers.toml`, then `TIMERS__SECTION__KEY` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use common::timer::TIMER_TTL_SECONDS;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Which key-value backend holds the timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Expiry applied to every timer write
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsSettings {
    /// Interval between update frames
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceSettings {
    /// Cron schedule (with seconds) of the memory store purge job
    pub purge_schedule: String,
}

/// Timer service settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub ws: WsSettings,
    pub maintenance: MaintenanceSettings,
}

impl Settings {
    /// Load settings from `config/timers.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("config/timers")
    }

    /// Load settings, reading the optional file at `path` (extension optional)
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3002)?
            .set_default("store.backend", "redis")?
            .set_default("store.redis_url", "redis://localhost:6379")?
            .set_default("store.ttl_seconds", TIMER_TTL_SECONDS)?
            .set_default("ws.tick_interval_ms", 1000)?
            .set_default("maintenance.purge_schedule", "0 */5 * * * *")?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("TIMERS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let settings: Settings = settings
            .try_deserialize()
            .context("Invalid timer service configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.ws.tick_interval_ms == 0 {
            anyhow::bail!("ws.tick_interval_ms must be greater than zero");
        }
        if self.store.ttl_seconds == 0 {
            anyhow::bail!("store.ttl_seconds must be greater than zero");
        }
        Ok(())
    }

    /// Address the HTTP listener binds to
    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.ws.tick_interval_ms)
    }
}

/// Defaults for embedding the service in-process: same values as `load`
/// except that timers are kept in memory.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 3002,
            },
            store: StoreSettings {
                backend: StoreBackend::Memory,
                redis_url: "redis://localhost:6379".to_string(),
                ttl_seconds: TIMER_TTL_SECONDS,
            },
            ws: WsSettings {
                tick_interval_ms: 1000,
            },
            maintenance: MaintenanceSettings {
                purge_schedule: "0 */5 * * * *".to_string(),
            },
        }
    }
}
