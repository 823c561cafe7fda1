//! Watering triggers, their firing guards, and the next-watering forecast.

use std::fmt;

use serde::Serialize;
use time::{Date, Duration};

use crate::config::{ControllerConfig, ScheduleConfig};
use crate::SimTime;

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

/// Why a session was started. Each variant carries the planned session
/// length it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WateringReason {
    LowHumidity { minutes: u32 },
    HourlyScheduled { minutes: u32 },
    DailyScheduled { minutes: u32 },
}

impl WateringReason {
    pub fn low_humidity(cfg: &ScheduleConfig) -> Self {
        Self::LowHumidity {
            minutes: cfg.low_humidity_minutes,
        }
    }

    pub fn hourly(cfg: &ScheduleConfig) -> Self {
        Self::HourlyScheduled {
            minutes: cfg.hourly_minutes,
        }
    }

    pub fn daily(cfg: &ScheduleConfig) -> Self {
        Self::DailyScheduled {
            minutes: cfg.daily_minutes,
        }
    }

    pub fn minutes(&self) -> u32 {
        match *self {
            Self::LowHumidity { minutes }
            | Self::HourlyScheduled { minutes }
            | Self::DailyScheduled { minutes } => minutes,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::LowHumidity { .. } => "low soil humidity",
            Self::HourlyScheduled { .. } => "hourly watering",
            Self::DailyScheduled { .. } => "daily watering",
        }
    }
}

impl fmt::Display for WateringReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Guards + trigger evaluation
// ---------------------------------------------------------------------------

/// Last firing of each scheduled trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleGuards {
    pub last_hourly: Option<SimTime>,
    pub last_daily: Option<Date>,
}

impl ScheduleGuards {
    /// Run every trigger check in order (low humidity, hourly, daily) and
    /// return the reason of the last one that fired.
    ///
    /// All three checks always run: the hourly and daily guards are stamped
    /// whenever their check passes, even when a later check overrides the
    /// reason.
    pub fn evaluate(
        &mut self,
        now: SimTime,
        humidity: f64,
        cfg: &ControllerConfig,
    ) -> Option<WateringReason> {
        let s = &cfg.schedule;
        let mut reason = None;

        if humidity < cfg.humidity.min_percent {
            reason = Some(WateringReason::low_humidity(s));
        }
        if self.hourly_due(now, s) {
            reason = Some(WateringReason::hourly(s));
        }
        if self.daily_due(now, s) {
            reason = Some(WateringReason::daily(s));
        }

        reason
    }

    fn hourly_due(&mut self, now: SimTime, s: &ScheduleConfig) -> bool {
        if !in_hourly_window(now.hour(), s) || now.minute() != 0 {
            return false;
        }
        let cooled_down = match self.last_hourly {
            None => true,
            Some(last) => now - last >= Duration::minutes(i64::from(s.hourly_cooldown_min)),
        };
        if cooled_down {
            self.last_hourly = Some(now);
        }
        cooled_down
    }

    fn daily_due(&mut self, now: SimTime, s: &ScheduleConfig) -> bool {
        if now.hour() != s.daily_hour || now.minute() != 0 {
            return false;
        }
        let new_day = self.last_daily != Some(now.date());
        if new_day {
            self.last_daily = Some(now.date());
        }
        new_day
    }
}

fn in_hourly_window(hour: u8, s: &ScheduleConfig) -> bool {
    (s.hourly_first_hour..=s.hourly_last_hour).contains(&hour)
}

/// Fertilizer co-dispensing applies only to sessions starting at exactly
/// `fertilizer_hour`:00 on an odd day of the month.
pub fn fertilizer_due(now: SimTime, s: &ScheduleConfig) -> bool {
    now.day() % 2 == 1 && now.hour() == s.fertilizer_hour && now.minute() == 0
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextWatering {
    /// Humidity is already below the minimum.
    Immediate,
    Hourly { minutes: i64 },
    Morning { minutes: i64 },
}

impl fmt::Display for NextWatering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediately (low humidity)"),
            Self::Hourly { minutes } => write!(f, "in {minutes} min (hourly)"),
            Self::Morning { minutes } => write!(f, "in {minutes} min (morning)"),
        }
    }
}

/// Project the next watering from the clock and humidity alone.
///
/// Guards are not consulted, so a slot that already fired can still be
/// reported as upcoming.
pub fn forecast(now: SimTime, humidity: f64, cfg: &ControllerConfig) -> NextWatering {
    if humidity < cfg.humidity.min_percent {
        return NextWatering::Immediate;
    }

    let s = &cfg.schedule;
    let midnight = now.date().midnight();
    let next_hour = midnight + Duration::hours(i64::from(now.hour()) + 1);

    if in_hourly_window(next_hour.hour(), s) {
        return NextWatering::Hourly {
            minutes: (next_hour - now).whole_minutes(),
        };
    }

    let next_morning = midnight + Duration::days(1) + Duration::hours(i64::from(s.daily_hour));
    NextWatering::Morning {
        minutes: (next_morning - now).whole_minutes(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
