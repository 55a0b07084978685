use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Thresholds of the route recommendation policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Largest distance in meters between the requester and a route's center.
    pub max_distance_m: f64,
    /// Longest estimated run at the requester's pace, in seconds.
    pub max_duration_s: f64,
}

impl Default for MatchPolicy {
    fn default() -> MatchPolicy {
        MatchPolicy { max_distance_m: 5_000.0, max_duration_s: 10_800.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub storage: StorageBackend,
    pub trace_processor_url: Option<String>,
    pub trace_processor_timeout: Duration,
    pub match_policy: MatchPolicy,
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Config> {
        dotenv().ok();
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("STORAGE").as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => return Err(Error::Config(format!("STORAGE must be postgres or memory, got {}", other))),
        };
        let database_url = lookup("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(Error::Config("DATABASE_URL is not set".to_string()));
        }

        let defaults = MatchPolicy::default();
        let timeout_ms: u64 = parse_or(&lookup, "TRACE_PROCESSOR_TIMEOUT_MS", 5_000)?;

        Ok(Config {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8088".to_string()),
            storage,
            trace_processor_url: lookup("TRACE_PROCESSOR_URL"),
            trace_processor_timeout: Duration::from_millis(timeout_ms),
            match_policy: MatchPolicy {
                max_distance_m: parse_or(&lookup, "ROUTE_MAX_DISTANCE_M", defaults.max_distance_m)?,
                max_duration_s: parse_or(&lookup, "ROUTE_MAX_DURATION_S", defaults.max_duration_s)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, raw))),
        None => Ok(default),
    }
}
