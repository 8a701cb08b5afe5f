//! Configuration loader for the `solarflow-aggregate` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Nothing else in the crate reads `env::var` for
//! service settings.
//!
use std::env;
use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use chrono_tz::Tz;

use crate::aggregate::MissingData;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional environment variable through `FromStr`, with a default
/// given as the string form.
macro_rules! parse_env_or {
    ($var_name:expr, $ty:ty, $default:expr) => {{
        let raw = env::var($var_name).unwrap_or_else(|_| $default.to_string());
        raw.parse::<$ty>()
            .map_err(|e| anyhow!("Invalid {} '{}': {}", $var_name, raw, e))?
    }};
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Timezone for aggregates whose request names none.
    pub default_timezone: Tz,

    /// Missing-data policy for requests that do not choose one.
    pub missing_data: MissingData,

    /// Maximum number of aggregate observation records per request.
    pub max_observations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            default_timezone: Tz::UTC,
            missing_data: MissingData::Skip,
            max_observations: 500,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `SOLARFLOW_BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `SOLARFLOW_DEFAULT_TZ` – IANA timezone name (default: `UTC`)
/// - `SOLARFLOW_MISSING_DATA` – `skip` or `propagate` (default: `skip`)
/// - `SOLARFLOW_MAX_OBSERVATIONS` – records accepted per request (default: 500)
///
/// Returns an error if any variable is set but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let bind_addr = parse_env_or!("SOLARFLOW_BIND_ADDR", SocketAddr, "0.0.0.0:8080");
    let default_timezone = parse_env_or!("SOLARFLOW_DEFAULT_TZ", Tz, "UTC");
    let missing_data = parse_env_or!("SOLARFLOW_MISSING_DATA", MissingData, "skip");
    let max_observations = parse_env_u32!("SOLARFLOW_MAX_OBSERVATIONS", 500);

    Ok(Config {
        bind_addr,
        default_timezone,
        missing_data,
        max_observations,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  SOLARFLOW_BIND_ADDR        : {}", self.bind_addr);
        tracing::info!("  SOLARFLOW_DEFAULT_TZ       : {}", self.default_timezone);
        tracing::info!("  SOLARFLOW_MISSING_DATA     : {}", self.missing_data);
        tracing::info!("  SOLARFLOW_MAX_OBSERVATIONS : {}", self.max_observations);
    }
}
