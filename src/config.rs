use crate::location::boundary::{DEFAULT_BOUNDARY, Vertex};
use crate::location::Boundary;
use crate::recorder::RecorderPolicy;
use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub max_db_connections: u32,

    // Recording policy
    pub boundary_check: bool,
    pub session_pairing: bool,
    pub boundary: Boundary,

    pub max_upload_bytes: usize,
    pub rate_upload_per_min: u32,
    pub guard_lock_timeout_secs: u64,

    // Logging
    pub log_dir: String,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));

        let boundary = match lookup("BOUNDARY_POLYGON") {
            Some(raw) => parse_polygon(&raw).context("BOUNDARY_POLYGON is invalid")?,
            None => Boundary::new(&DEFAULT_BOUNDARY)?,
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            max_db_connections: parse_or(&lookup, "MAX_DB_CONNECTIONS", 10)?,

            boundary_check: parse_flag(&lookup, "BOUNDARY_CHECK", true)?,
            session_pairing: parse_flag(&lookup, "SESSION_PAIRING", true)?,
            boundary,

            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?, // 10 MiB
            rate_upload_per_min: parse_or(&lookup, "RATE_UPLOAD_PER_MIN", 60)?,
            guard_lock_timeout_secs: parse_or(&lookup, "GUARD_LOCK_TIMEOUT_SECS", 10)?,

            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::DEBUG)?,
        })
    }

    /// Minimal config plus overrides, for tests.
    #[cfg(test)]
    pub fn for_tests(overrides: &[(&str, &str)]) -> Result<Self> {
        let vars: std::collections::HashMap<String, String> = [
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("DATABASE_URL", "mysql://root@localhost/attendance_db"),
        ]
        .iter()
        .chain(overrides)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn recorder_policy(&self) -> RecorderPolicy {
        RecorderPolicy {
            boundary: self.boundary_check.then(|| self.boundary.clone()),
            pairing: self.session_pairing,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}={raw:?} is invalid: {e}")),
        None => Ok(default),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("{key}={raw:?} is not a boolean")),
        },
    }
}

/// `[[lon, lat], ...]` as JSON.
fn parse_polygon(raw: &str) -> Result<Boundary> {
    let vertices: Vec<Vertex> = serde_json::from_str(raw)?;
    Ok(Boundary::new(&vertices)?)
}
