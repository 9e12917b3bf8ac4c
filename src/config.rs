use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// SQLite database file. Parent directories are created on startup.
    pub database_path: PathBuf,
    pub log_level: LevelFilter,
    /// Deadline for a single API request.
    pub request_timeout: Duration,
    /// Fixed PRNG seed. When unset the engine seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let port = var("SERVER_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("SERVER_PORT must be a valid port number")?;

        let database_path = var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/reviewer-assignment.db"));

        let log_level = var("LOG_LEVEL")
            .unwrap_or_else(|| "info".to_string())
            .parse::<LevelFilter>()
            .context("LOG_LEVEL must be one of off, error, warn, info, debug, trace")?;

        let timeout_secs = var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse::<u64>()
            .context("REQUEST_TIMEOUT_SECS must be a valid number")?;
        if timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        let rng_seed = var("RNG_SEED")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("RNG_SEED must be a valid unsigned number")?;

        Ok(Config {
            port,
            database_path,
            log_level,
            request_timeout: Duration::from_secs(timeout_secs),
            rng_seed,
        })
    }
}
