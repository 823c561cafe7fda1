//! Accelerated simulated clock and the task that drives the controller.
//!
//! Real elapsed time since the last speed change is converted into a target
//! number of simulated minutes; every poll advances the controller once per
//! minute still owed, oldest first, so no minute is ever skipped or repeated.

use std::time::{Duration as StdDuration, Instant};

use greenhouse_core::{IrrigationController, ObservationSink, SimTime};
use time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::state::SharedSimulation;

pub struct SimClock {
    now: SimTime,
    /// Simulated minutes per real minute.
    speed: u32,
    /// Minutes advanced since the last speed change.
    minutes_done: u64,
}

impl SimClock {
    pub fn new(start: SimTime, speed: u32) -> Self {
        Self {
            now: start,
            speed,
            minutes_done: 0,
        }
    }

    /// The next simulated minute to be handed to the controller.
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    /// Minutes owed to the controller after `real_elapsed` of wall time
    /// since the last speed change.
    pub fn due_minutes(&self, real_elapsed: StdDuration) -> u64 {
        let target = real_elapsed.as_millis() * u128::from(self.speed) / 60_000;
        let target = u64::try_from(target).unwrap_or(u64::MAX);
        target.saturating_sub(self.minutes_done)
    }

    /// Advance the controller by exactly one simulated minute.
    pub fn step<S: ObservationSink>(&mut self, controller: &mut IrrigationController<S>) {
        controller.advance(self.now);
        self.now += Duration::minutes(1);
        self.minutes_done += 1;
    }

    /// Change speed. The caller restarts its real-time baseline at the same
    /// moment.
    pub fn set_speed(&mut self, speed: u32) {
        self.speed = speed;
        self.minutes_done = 0;
    }
}

/// Poll every `tick` and let the simulation catch up. Runs forever.
pub async fn drive(shared: SharedSimulation, tick: StdDuration) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    {
        let sim = shared.read().await;
        info!(
            start = %crate::state::format_sim_time(sim.clock.now()),
            speed = sim.clock.speed(),
            tick_ms = tick.as_millis() as u64,
            "clock driver started"
        );
    }

    loop {
        ticker.tick().await;
        let mut sim = shared.write().await;
        sim.catch_up(Instant::now());
    }
}

// ===========================================================================
// Tests
// ===========================================================================
