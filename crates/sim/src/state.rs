use greenhouse_core::{DeviceOutputs, IrrigationController, SimTime, WateringSession};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::clock::SimClock;
use crate::sink::HostSink;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

/// Every access to the controller goes through this lock, which keeps ticks,
/// resets and reads serialized.
pub type SharedSimulation = Arc<RwLock<Simulation>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct Simulation {
    pub started_at: Instant,
    pub controller: IrrigationController<HostSink>,
    pub clock: SimClock,
    pub events: VecDeque<SimEvent>,
    /// Real-time instant the clock's catch-up is measured from.
    baseline: Instant,
}

#[derive(Clone, Serialize)]
pub struct SimEvent {
    pub sim_time: String,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Watering,
    Record,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub sim_time: String,
    pub sim_date: String,
    pub speed: u32,
    pub soil_humidity: f64,
    pub water_used_liters: f64,
    pub fertilizer_used_ml: f64,
    pub devices: DeviceOutputs,
    pub action: String,
    pub next_watering: String,
    pub last_record: Option<String>,
    pub observations_logged: usize,
    pub events: Vec<SimEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl Simulation {
    pub fn new(controller: IrrigationController<HostSink>, clock: SimClock, now: Instant) -> Self {
        Self {
            started_at: now,
            controller,
            clock,
            events: VecDeque::with_capacity(MAX_EVENTS),
            baseline: now,
        }
    }

    /// Advance the controller by every simulated minute owed at `now`.
    /// Returns how many minutes were advanced.
    pub fn catch_up(&mut self, now: Instant) -> u64 {
        let due = self
            .clock
            .due_minutes(now.saturating_duration_since(self.baseline));

        for _ in 0..due {
            let at = self.clock.now();
            let session_before = self.controller.session().copied();
            let records_before = self.controller.observations().len();

            self.clock.step(&mut self.controller);

            self.note_changes(at, session_before, records_before);
        }
        due
    }

    /// Change the speed multiplier, restarting catch-up from `now`.
    pub fn set_speed(&mut self, speed: u32, now: Instant) {
        let old = self.clock.speed();
        self.clock.set_speed(speed);
        self.baseline = now;
        self.record_system(format!("speed changed {old}x -> {speed}x"));
    }

    pub fn reset_usage(&mut self) {
        self.controller.reset_usage_counters();
        self.record_system("usage counters reset".to_string());
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        let at = self.clock.now();
        self.push_event(at, EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        let now = self.clock.now();
        let ctl = &self.controller;
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            sim_time: format!("{:02}:{:02}", now.hour(), now.minute()),
            sim_date: format!("{} ({})", now.date(), now.weekday()),
            speed: self.clock.speed(),
            soil_humidity: ctl.soil_humidity(),
            water_used_liters: ctl.water_used_liters(),
            fertilizer_used_ml: ctl.fertilizer_used_ml(),
            devices: ctl.devices(),
            action: ctl.action_description(),
            next_watering: ctl.next_watering(now).to_string(),
            last_record: ctl.latest_observation().map(|o| o.to_string()),
            observations_logged: ctl.observations().len(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn note_changes(
        &mut self,
        at: SimTime,
        session_before: Option<WateringSession>,
        records_before: usize,
    ) {
        if self.controller.observations().len() > records_before {
            if let Some(obs) = self.controller.latest_observation() {
                let detail = obs.to_string();
                self.push_event(at, EventKind::Record, detail);
            }
        }

        let session_after = self.controller.session().copied();
        match (session_before, session_after) {
            (Some(old), None) => {
                self.push_event(
                    at,
                    EventKind::Watering,
                    format!("watering stopped ({})", old.reason),
                );
            }
            (None, Some(new)) => {
                let fertilizer = if new.fertilize { ", with fertilizer" } else { "" };
                self.push_event(
                    at,
                    EventKind::Watering,
                    format!(
                        "watering started: {} ({} min){fertilizer}",
                        new.reason,
                        new.planned_minutes()
                    ),
                );
            }
            _ => {}
        }
    }

    fn push_event(&mut self, at: SimTime, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SimEvent {
            sim_time: format_sim_time(at),
            kind,
            detail,
        });
    }
}

/// `YYYY-MM-DD HH:MM`.
pub fn format_sim_time(t: SimTime) -> String {
    format!("{} {:02}:{:02}", t.date(), t.hour(), t.minute())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use greenhouse_core::{ControllerConfig, NullSink};
    use std::time::Duration;
    use time::macros::datetime;

    fn sim_at(start: SimTime, speed: u32, now: Instant) -> Simulation {
        let controller =
            IrrigationController::new(ControllerConfig::default(), Box::new(NullSink) as HostSink);
        Simulation::new(controller, SimClock::new(start, speed), now)
    }

    fn kinds(sim: &Simulation) -> Vec<EventKind> {
        sim.events.iter().map(|e| e.kind.clone()).collect()
    }

    #[test]
    fn catch_up_advances_owed_minutes() {
        let t0 = Instant::now();
        let mut sim = sim_at(datetime!(2025-03-02 10:00), 60, t0);

        assert_eq!(sim.catch_up(t0 + Duration::from_secs(5)), 5);
        assert_eq!(sim.clock.now(), datetime!(2025-03-02 10:05));
        // Nothing more owed at the same instant.
        assert_eq!(sim.catch_up(t0 + Duration::from_secs(5)), 0);
        assert_eq!(sim.catch_up(t0 + Duration::from_secs(7)), 2);
        assert_eq!(sim.clock.now(), datetime!(2025-03-02 10:07));
    }

    #[test]
    fn catch_up_records_watering_and_record_events() {
        let t0 = Instant::now();
        let mut sim = sim_at(datetime!(2025-03-02 05:59), 60, t0);

        // 05:59 .. 06:07: daily session starts at 06:00 and stops at 06:07.
        sim.catch_up(t0 + Duration::from_secs(9));

        let details: Vec<_> = sim.events.iter().map(|e| e.detail.as_str()).collect();
        assert_eq!(
            details,
            vec![
                "05:59:00 - soil humidity: 30.0%",
                "watering started: daily watering (7 min)",
                "watering stopped (daily watering)",
            ]
        );
        assert_eq!(
            kinds(&sim),
            vec![EventKind::Record, EventKind::Watering, EventKind::Watering]
        );
        assert_eq!(sim.events[1].sim_time, "2025-03-02 06:00");
        assert_eq!(sim.events[2].sim_time, "2025-03-02 06:07");
    }

    #[test]
    fn fertilizer_noted_in_start_event() {
        let t0 = Instant::now();
        let mut sim = sim_at(datetime!(2025-03-01 07:00), 60, t0);
        sim.catch_up(t0 + Duration::from_secs(1));
        assert!(sim
            .events
            .iter()
            .any(|e| e.detail == "watering started: hourly watering (10 min), with fertilizer"));
    }

    #[test]
    fn set_speed_restarts_catch_up_baseline() {
        let t0 = Instant::now();
        let mut sim = sim_at(datetime!(2025-03-02 10:00), 60, t0);
        sim.catch_up(t0 + Duration::from_secs(3));

        let t1 = t0 + Duration::from_secs(10);
        sim.set_speed(600, t1);
        assert_eq!(sim.catch_up(t1), 0);
        assert_eq!(sim.catch_up(t1 + Duration::from_secs(1)), 10);
        assert_eq!(sim.clock.now(), datetime!(2025-03-02 10:13));
        // The 10:00 hourly session ends at 10:10, after that minute's record.
        assert_eq!(
            sim.events.back().map(|e| e.detail.as_str()),
            Some("watering stopped (hourly watering)")
        );
        assert!(sim
            .events
            .iter()
            .any(|e| e.detail == "speed changed 60x -> 600x"));
    }

    #[test]
    fn reset_usage_zeroes_counters_and_records_event() {
        let t0 = Instant::now();
        let mut sim = sim_at(datetime!(2025-03-02 09:00), 60, t0);
        sim.catch_up(t0 + Duration::from_secs(3));
        assert!(sim.controller.water_used_liters() > 0.0);

        sim.reset_usage();
        assert_eq!(sim.controller.water_used_liters(), 0.0);
        assert!(sim.controller.is_watering());
        assert_eq!(sim.events.back().map(|e| e.kind.clone()), Some(EventKind::System));
    }

    #[test]
    fn status_snapshot() {
        let t0 = Instant::now();
        let mut sim = sim_at(datetime!(2025-03-01 09:00), 60, t0);
        sim.catch_up(t0 + Duration::from_secs(2));

        let st = sim.to_status();
        assert_eq!(st.sim_time, "09:02");
        assert_eq!(st.sim_date, "2025-03-01 (Saturday)");
        assert_eq!(st.speed, 60);
        assert!(st.devices.pump_on && st.devices.valve_open);
        assert_eq!(st.action, "watering: hourly watering (10 min)");
        assert_eq!(st.next_watering, "in 58 min (hourly)");
        assert_eq!(
            st.last_record.as_deref(),
            Some("09:00:00 - soil humidity: 30.0%")
        );
        assert_eq!(st.observations_logged, 1);
        // Newest first.
        assert_eq!(st.events[0].kind, EventKind::Watering);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let t0 = Instant::now();
        let mut sim = sim_at(datetime!(2025-03-02 10:00), 60, t0);
        for i in 0..(MAX_EVENTS + 25) {
            sim.record_system(format!("event {i}"));
        }
        assert_eq!(sim.events.len(), MAX_EVENTS);
        assert_eq!(sim.events.front().map(|e| e.detail.as_str()), Some("event 25"));
    }
}
