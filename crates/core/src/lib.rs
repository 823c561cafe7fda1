//! Single-zone greenhouse irrigation controller driven by a simulated clock.
//!
//! The host owns one [`IrrigationController`], calls
//! [`advance`](IrrigationController::advance) once per simulated minute, and
//! reads humidity, usage and device outputs back between ticks.

pub mod config;
pub mod controller;
pub mod devices;
pub mod observation;
pub mod schedule;

pub use config::ControllerConfig;
pub use controller::{IrrigationController, WateringSession};
pub use devices::DeviceOutputs;
pub use observation::{NullSink, Observation, ObservationSink, SinkError};
pub use schedule::{NextWatering, WateringReason};

/// Simulated wall-clock time. Minute resolution is what the controller
/// reasons about; seconds are carried through for display only.
pub type SimTime = time::PrimitiveDateTime;
