use std::time::Duration;

use tracing::warn;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_TTL_SECS: u64 = 4 * 60 * 60;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 30 * 60;

/// Runtime configuration, read from the environment. There is no CLI
/// surface; unset or unparsable variables fall back to the defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listening port (`SOUS_PORT`)
    pub port: u16,

    /// Idle timeout after which a session is reaped (`SOUS_SESSION_TTL_SECS`)
    pub session_ttl: Duration,

    /// How often the reaper sweeps (`SOUS_REAPER_INTERVAL_SECS`)
    pub reaper_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("SOUS_PORT").unwrap_or(DEFAULT_PORT),
            session_ttl: Duration::from_secs(
                env_parsed("SOUS_SESSION_TTL_SECS").unwrap_or(DEFAULT_SESSION_TTL_SECS),
            ),
            reaper_interval: Duration::from_secs(
                env_parsed("SOUS_REAPER_INTERVAL_SECS").unwrap_or(DEFAULT_REAPER_INTERVAL_SECS),
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {key}={raw}");
            None
        }
    }
}
