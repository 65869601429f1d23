//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Longest allowed packaging run.
const MAX_PACKAGING_TIMEOUT_SECS: i64 = 3600;
/// Longest allowed login session, ten years.
const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which archiving backend produces the encrypted downloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackagerKind {
    /// Shell out to a 7-Zip binary.
    SevenZip,
    /// Build the archive in-process with the `zip` crate.
    Native,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub dataset_root: PathBuf,
    pub archive_temp_dir: PathBuf,
    pub packager: PackagerKind,
    pub seven_zip_bin: String,
    pub packaging_timeout: Duration,
    pub session_ttl_days: i64,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Database Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Storage Settings ---
        let dataset_root = lookup("DATASET_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let archive_temp_dir = lookup("ARCHIVE_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("marketplace-archives"));

        // --- Load Packaging Settings ---
        let packager = match lookup("PACKAGER")
            .unwrap_or_else(|| "7z".to_string())
            .to_lowercase()
            .as_str()
        {
            "7z" | "7zip" | "seven-zip" => PackagerKind::SevenZip,
            "native" | "zip" => PackagerKind::Native,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PACKAGER".to_string(),
                    format!("'{}' is not one of 7z, native", other),
                ))
            }
        };
        let seven_zip_bin = lookup("SEVEN_ZIP_BIN").unwrap_or_else(|| "7z".to_string());
        let timeout_secs = parse_positive(&lookup, "PACKAGING_TIMEOUT_SECS", 120, MAX_PACKAGING_TIMEOUT_SECS)?;
        let packaging_timeout = Duration::from_secs(timeout_secs as u64);

        // --- Load Auth and HTTP Settings ---
        let session_ttl_days = parse_positive(&lookup, "SESSION_TTL_DAYS", 30, MAX_SESSION_TTL_DAYS)?;
        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            dataset_root,
            archive_temp_dir,
            packager,
            seven_zip_bin,
            packaging_timeout,
            session_ttl_days,
            cors_origin,
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &str, default: i64, max: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 && value <= max => Ok(value),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not an integer between 1 and {}", raw, max),
        )),
    }
}
