//! Greenhouse irrigation controller: a single-zone state machine advanced one
//! simulated minute at a time.
//!
//! ```text
//! Idle ──[low humidity | hourly slot | daily slot]──▶ Watering
//!  ▲                                                     │
//!  └──────[humidity > max  |  planned minutes elapsed]───┘
//! ```
//!
//! Each call to [`IrrigationController::advance`] runs, in order: recording,
//! session control, idle decay, and watering integration.

use time::Duration;
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::devices::DeviceOutputs;
use crate::observation::{Observation, ObservationSink};
use crate::schedule::{self, NextWatering, ScheduleGuards, WateringReason};
use crate::SimTime;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One contiguous watering episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WateringSession {
    pub started_at: SimTime,
    pub reason: WateringReason,
    /// Decided once at session start.
    pub fertilize: bool,
}

impl WateringSession {
    pub fn planned_minutes(&self) -> u32 {
        self.reason.minutes()
    }

    pub fn ends_at(&self) -> SimTime {
        self.started_at + Duration::minutes(i64::from(self.planned_minutes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    HumidityAboveMax,
    DurationElapsed,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct IrrigationController<S> {
    config: ControllerConfig,
    sink: S,

    soil_humidity: f64,
    water_used_liters: f64,
    fertilizer_used_ml: f64,
    devices: DeviceOutputs,
    session: Option<WateringSession>,

    guards: ScheduleGuards,
    last_record: Option<SimTime>,
    log: Vec<Observation>,
}

impl<S: ObservationSink> IrrigationController<S> {
    /// Build a controller at the configured initial humidity with all
    /// devices off. `config` is expected to have passed
    /// [`ControllerConfig::validate`].
    pub fn new(config: ControllerConfig, sink: S) -> Self {
        Self {
            soil_humidity: config.humidity.initial_percent,
            config,
            sink,
            water_used_liters: 0.0,
            fertilizer_used_ml: 0.0,
            devices: DeviceOutputs::off(),
            session: None,
            guards: ScheduleGuards::default(),
            last_record: None,
            log: Vec::new(),
        }
    }

    /// Advance the simulation by one minute.
    ///
    /// Must be called exactly once per simulated minute with `now` one minute
    /// after the previous call.
    pub fn advance(&mut self, now: SimTime) {
        self.record_if_due(now);
        self.control(now);

        if self.session.is_none() {
            self.decay();
        } else {
            self.integrate_watering();
        }
    }

    /// Zero the water and fertilizer counters. Nothing else changes.
    pub fn reset_usage_counters(&mut self) {
        self.water_used_liters = 0.0;
        self.fertilizer_used_ml = 0.0;
        info!("usage counters reset");
    }

    /// Where the next watering is expected to come from. Read-only.
    pub fn next_watering(&self, now: SimTime) -> NextWatering {
        schedule::forecast(now, self.soil_humidity, &self.config)
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn soil_humidity(&self) -> f64 {
        self.soil_humidity
    }

    pub fn water_used_liters(&self) -> f64 {
        self.water_used_liters
    }

    pub fn fertilizer_used_ml(&self) -> f64 {
        self.fertilizer_used_ml
    }

    pub fn devices(&self) -> DeviceOutputs {
        self.devices
    }

    pub fn session(&self) -> Option<&WateringSession> {
        self.session.as_ref()
    }

    /// Pump running and valve open. Holds exactly while a session is active.
    pub fn is_watering(&self) -> bool {
        self.devices.is_watering()
    }

    /// "idle", or "watering: <reason> (<minutes> min)".
    pub fn action_description(&self) -> String {
        match &self.session {
            None => "idle".to_string(),
            Some(s) => format!("watering: {} ({} min)", s.reason, s.planned_minutes()),
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.log
    }

    pub fn latest_observation(&self) -> Option<&Observation> {
        self.log.last()
    }

    pub fn guards(&self) -> &ScheduleGuards {
        &self.guards
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    // ── Recording ───────────────────────────────────────────────

    fn record_if_due(&mut self, now: SimTime) {
        let interval = Duration::minutes(i64::from(self.config.recording.interval_min));
        let due = match self.last_record {
            None => true,
            Some(last) => now - last >= interval,
        };
        if !due {
            return;
        }

        let obs = Observation {
            at: now,
            humidity: self.soil_humidity,
        };
        self.last_record = Some(now);
        self.log.push(obs);

        // Sink failures are dropped here; the tick carries on regardless.
        if let Err(e) = self.sink.append(&obs.to_string()) {
            debug!(error = %e, "observation not forwarded to sink");
        }
    }

    // ── Session control ─────────────────────────────────────────

    fn control(&mut self, now: SimTime) {
        match self.session {
            Some(session) => {
                if let Some(cause) = self.stop_cause(&session, now) {
                    self.stop(cause);
                }
            }
            None => {
                if let Some(reason) = self.guards.evaluate(now, self.soil_humidity, &self.config)
                {
                    self.start(now, reason);
                }
            }
        }
    }

    fn stop_cause(&self, session: &WateringSession, now: SimTime) -> Option<StopCause> {
        if self.soil_humidity > self.config.humidity.max_percent {
            Some(StopCause::HumidityAboveMax)
        } else if now >= session.ends_at() {
            Some(StopCause::DurationElapsed)
        } else {
            None
        }
    }

    fn start(&mut self, now: SimTime, reason: WateringReason) {
        let fertilize = schedule::fertilizer_due(now, &self.config.schedule);
        self.devices.open(fertilize);
        self.session = Some(WateringSession {
            started_at: now,
            reason,
            fertilize,
        });

        info!(
            %reason,
            minutes = reason.minutes(),
            fertilize,
            humidity = format!("{:.1}", self.soil_humidity),
            "watering started"
        );
    }

    fn stop(&mut self, cause: StopCause) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.devices.all_off();

        info!(
            reason = %session.reason,
            ?cause,
            humidity = format!("{:.1}", self.soil_humidity),
            "watering stopped"
        );
    }

    // ── Humidity / usage integration ────────────────────────────

    fn decay(&mut self) {
        self.soil_humidity = (self.soil_humidity - self.config.humidity.decay_per_minute).max(0.0);
    }

    fn integrate_watering(&mut self) {
        let h = &self.config.humidity;
        self.soil_humidity = (self.soil_humidity + h.gain_per_minute).min(h.max_percent);
        self.water_used_liters += self.config.flow.water_liters_per_minute();
        if self.devices.fertilizer_on {
            self.fertilizer_used_ml += self.config.flow.fertilizer_ml_per_minute();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
