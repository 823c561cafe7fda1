//! Host settings read from environment variables.

use anyhow::{bail, Context, Result};
use greenhouse_core::SimTime;
use std::env;
use std::time::Duration;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, Time};
use tracing::warn;

pub const MIN_SPEED: u32 = 1;
pub const MAX_SPEED: u32 = 3600;

const DEFAULT_CONFIG_PATH: &str = "greenhouse.toml";
const DEFAULT_LOG_PATH: &str = "logs/greenhouse_log.txt";
const DEFAULT_DB_URL: &str = "sqlite:greenhouse.db?mode=rwc";
const DEFAULT_SPEED: u32 = 10;
const DEFAULT_WEB_PORT: u16 = 8080;
const DEFAULT_TICK_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: String,
    pub speed: u32,
    pub start: SimTime,
    /// `None` disables the text log.
    pub log_path: Option<String>,
    /// `None` disables the SQLite store.
    pub db_url: Option<String>,
    pub web_port: u16,
    pub tick: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup. Unset keys take their defaults;
    /// set-but-empty `LOG_PATH` / `DB_URL` switch that sink off.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config_path = get("CONFIG_PATH").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let speed = match get("SIM_SPEED") {
            Some(raw) => {
                let n: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("SIM_SPEED is not a number: {raw:?}"))?;
                validate_speed(n)?
            }
            None => DEFAULT_SPEED,
        };

        let start = match get("SIM_START") {
            Some(raw) => parse_start(&raw)?,
            None => default_start()?,
        };

        let log_path = optional(get("LOG_PATH"), DEFAULT_LOG_PATH);
        let db_url = optional(get("DB_URL"), DEFAULT_DB_URL);

        let web_port = match get("WEB_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("WEB_PORT is not a port number: {raw:?}"))?,
            None => DEFAULT_WEB_PORT,
        };

        let tick_ms = match get("TICK_MS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("TICK_MS is not a number: {raw:?}"))?,
            None => DEFAULT_TICK_MS,
        };
        if tick_ms == 0 {
            bail!("TICK_MS must be positive");
        }

        Ok(Self {
            config_path,
            speed,
            start,
            log_path,
            db_url,
            web_port,
            tick: Duration::from_millis(tick_ms),
        })
    }
}

fn optional(value: Option<String>, default: &str) -> Option<String> {
    match value {
        None => Some(default.to_string()),
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(v),
    }
}

/// Reject speed multipliers outside `MIN_SPEED..=MAX_SPEED`.
pub fn validate_speed(speed: u32) -> Result<u32> {
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        bail!("speed multiplier must be within {MIN_SPEED}..={MAX_SPEED}, got {speed}");
    }
    Ok(speed)
}

/// Parse `YYYY-MM-DD HH:MM`.
pub fn parse_start(raw: &str) -> Result<SimTime> {
    PrimitiveDateTime::parse(
        raw.trim(),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    )
    .with_context(|| format!("SIM_START must look like 2025-03-01 05:30, got {raw:?}"))
}

/// Current local time truncated to the minute, or UTC when the local offset
/// cannot be determined (e.g. once other threads are running).
pub fn default_start() -> Result<SimTime> {
    let now = match OffsetDateTime::now_local() {
        Ok(local) => local,
        Err(e) => {
            warn!("local offset unavailable, starting from UTC: {e}");
            OffsetDateTime::now_utc()
        }
    };
    wall_clock_minute(now)
}

/// The wall-clock reading of `now` in its own offset, seconds dropped.
fn wall_clock_minute(now: OffsetDateTime) -> Result<SimTime> {
    let time = Time::from_hms(now.hour(), now.minute(), 0).context("bad wall-clock time")?;
    Ok(PrimitiveDateTime::new(now.date(), time))
}

// ===========================================================================
// Tests
// ===========================================================================
