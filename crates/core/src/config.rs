//! Controller thresholds, rates and schedule constants, loadable from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! stock greenhouse profile.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub humidity: HumidityConfig,
    pub flow: FlowConfig,
    pub schedule: ScheduleConfig,
    pub recording: RecordingConfig,
}

/// Soil humidity model, all values in percent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HumidityConfig {
    pub initial_percent: f64,
    pub min_percent: f64,
    pub max_percent: f64,
    pub gain_per_minute: f64,
    pub decay_per_minute: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub water_liters_per_hour: f64,
    pub fertilizer_ml_per_hour: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// First and last hour (inclusive) in which the hourly trigger may fire.
    pub hourly_first_hour: u8,
    pub hourly_last_hour: u8,
    pub hourly_cooldown_min: u32,
    pub daily_hour: u8,
    /// Sessions starting at exactly this hour on an odd day co-dispense
    /// fertilizer.
    pub fertilizer_hour: u8,
    pub low_humidity_minutes: u32,
    pub hourly_minutes: u32,
    pub daily_minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub interval_min: u32,
}

impl Default for HumidityConfig {
    fn default() -> Self {
        Self {
            initial_percent: 30.0,
            min_percent: 30.0,
            max_percent: 45.0,
            gain_per_minute: 1.5,
            decay_per_minute: 0.2,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            water_liters_per_hour: 10.0,
            fertilizer_ml_per_hour: 2.0,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hourly_first_hour: 6,
            hourly_last_hour: 20,
            hourly_cooldown_min: 60,
            daily_hour: 6,
            fertilizer_hour: 7,
            low_humidity_minutes: 5,
            hourly_minutes: 10,
            daily_minutes: 7,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self { interval_min: 10 }
    }
}

impl FlowConfig {
    pub fn water_liters_per_minute(&self) -> f64 {
        self.water_liters_per_hour / 60.0
    }

    pub fn fertilizer_ml_per_minute(&self) -> f64 {
        self.fertilizer_ml_per_hour / 60.0
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl ControllerConfig {
    /// Validate every section. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_humidity(&mut errors);
        self.validate_flow(&mut errors);
        self.validate_schedule(&mut errors);

        if self.recording.interval_min == 0 {
            errors.push("recording.interval_min must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_humidity(&self, errors: &mut Vec<String>) {
        let h = &self.humidity;

        for (name, value) in [
            ("min_percent", h.min_percent),
            ("max_percent", h.max_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                errors.push(format!(
                    "humidity.{name} {value} out of range [0.0, 100.0]"
                ));
            }
        }

        if h.min_percent >= h.max_percent {
            errors.push(format!(
                "humidity.max_percent ({}) must be greater than min_percent ({})",
                h.max_percent, h.min_percent
            ));
        }

        if !(0.0..=h.max_percent).contains(&h.initial_percent) {
            errors.push(format!(
                "humidity.initial_percent {} out of range [0.0, {}]",
                h.initial_percent, h.max_percent
            ));
        }

        for (name, value) in [
            ("gain_per_minute", h.gain_per_minute),
            ("decay_per_minute", h.decay_per_minute),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!(
                    "humidity.{name} must be a non-negative number, got {value}"
                ));
            }
        }
    }

    fn validate_flow(&self, errors: &mut Vec<String>) {
        for (name, value) in [
            ("water_liters_per_hour", self.flow.water_liters_per_hour),
            ("fertilizer_ml_per_hour", self.flow.fertilizer_ml_per_hour),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!(
                    "flow.{name} must be a non-negative number, got {value}"
                ));
            }
        }
    }

    fn validate_schedule(&self, errors: &mut Vec<String>) {
        let s = &self.schedule;

        // ── Hours of day ────────────────────────────────────
        for (name, hour) in [
            ("hourly_first_hour", s.hourly_first_hour),
            ("hourly_last_hour", s.hourly_last_hour),
            ("daily_hour", s.daily_hour),
            ("fertilizer_hour", s.fertilizer_hour),
        ] {
            if hour > 23 {
                errors.push(format!("schedule.{name} {hour} out of range [0, 23]"));
            }
        }

        if s.hourly_first_hour > s.hourly_last_hour {
            errors.push(format!(
                "schedule.hourly_first_hour ({}) must not exceed hourly_last_hour ({})",
                s.hourly_first_hour, s.hourly_last_hour
            ));
        }

        // ── Durations (all must be positive) ────────────────
        for (name, minutes) in [
            ("hourly_cooldown_min", s.hourly_cooldown_min),
            ("low_humidity_minutes", s.low_humidity_minutes),
            ("hourly_minutes", s.hourly_minutes),
            ("daily_minutes", s.daily_minutes),
        ] {
            if minutes == 0 {
                errors.push(format!("schedule.{name} must be positive"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse and validate a TOML controller config.
pub fn parse(contents: &str) -> Result<ControllerConfig> {
    let config: ControllerConfig = toml::from_str(contents).context("failed to parse config")?;
    config.validate()?;
    Ok(config)
}

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<ControllerConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    parse(&contents).with_context(|| format!("invalid config: {path}"))
}

// ===========================================================================
// Tests
// ===========================================================================
