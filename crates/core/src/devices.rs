//! Simulated actuator outputs: the pump, the main valve and the fertilizer
//! doser. Pump and valve always switch together; the doser can only be on
//! while they are.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceOutputs {
    pub pump_on: bool,
    pub valve_open: bool,
    pub fertilizer_on: bool,
}

impl DeviceOutputs {
    /// Fail-safe state: everything off.
    pub fn off() -> Self {
        Self::default()
    }

    /// Start watering. `fertilize` engages the doser for the whole session.
    pub(crate) fn open(&mut self, fertilize: bool) {
        self.pump_on = true;
        self.valve_open = true;
        self.fertilizer_on = fertilize;
        debug!(fertilizer = fertilize, "devices: pump ON, valve OPEN");
    }

    pub(crate) fn all_off(&mut self) {
        *self = Self::off();
        debug!("devices: pump OFF, valve CLOSED, doser OFF");
    }

    pub fn is_watering(&self) -> bool {
        self.pump_on && self.valve_open
    }
}

// ===========================================================================
// Tests
// ===========================================================================
