//! Process configuration, read from the environment and validated up front.
//!
//! | Variable                | Meaning                                   | Default                                |
//! |-------------------------|-------------------------------------------|----------------------------------------|
//! | `HOST`                  | listen interface                          | `0.0.0.0`                              |
//! | `PORT`                  | listen port                               | `8080`                                 |
//! | `LOCAL`                 | `true` selects local mode                 | `false`                                |
//! | `REDIS_URL`             | local mode: Redis host, port 6379 implied | required when `LOCAL=true`             |
//! | `REDIS_ADDR`            | otherwise: Redis `host:port`              | required when not local                |
//! | `REDIS_PASSWORD`        | Redis password                            | none                                   |
//! | `REDIS_DB`              | Redis database index                      | `0`                                    |
//! | `UPSTREAM_URL`          | geocoder base URL                         | `https://nominatim.openstreetmap.org`  |
//! | `UPSTREAM_TIMEOUT_SECS` | upstream request timeout                  | `10`                                   |
//! | `STORE_TIMEOUT_MS`      | per-call Redis timeout                    | `2000`                                 |
//!
//! A missing store address for the selected mode is an error; there is no
//! fallback address.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::StoreConfig;
use crate::geocode::DEFAULT_BASE_URL;

/// Port Redis listens on in local mode.
const LOCAL_REDIS_PORT: u16 = 6379;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Validated settings for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub local: bool,
    pub store: StoreConfig,
    pub upstream_url: String,
    pub upstream_timeout: Duration,
    pub store_timeout: Duration,
}

impl Config {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name to
    /// its value. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] when the store address for the selected mode
    /// is absent, [`ConfigError::Invalid`] when a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let local = match get("LOCAL") {
            Some(v) => parse_bool("LOCAL", &v)?,
            None => false,
        };

        let address = if local {
            let host = get("REDIS_URL").ok_or(ConfigError::Missing("REDIS_URL"))?;
            format!("{}:{LOCAL_REDIS_PORT}", host.trim())
        } else {
            get("REDIS_ADDR")
                .ok_or(ConfigError::Missing("REDIS_ADDR"))?
                .trim()
                .to_owned()
        };

        let store = StoreConfig {
            address,
            password: get("REDIS_PASSWORD"),
            db: parse_or("REDIS_DB", get("REDIS_DB"), 0i64)?,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or("PORT", get("PORT"), 8080u16)?,
            local,
            store,
            upstream_url: get("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            upstream_timeout: Duration::from_secs(parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                get("UPSTREAM_TIMEOUT_SECS"),
                10u64,
            )?),
            store_timeout: Duration::from_millis(parse_or(
                "STORE_TIMEOUT_MS",
                get("STORE_TIMEOUT_MS"),
                2000u64,
            )?),
        })
    }

    /// `host:port` to bind the listener to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_owned(),
            reason: "expected true or false".to_owned(),
        }),
    }
}
