//! Humidity observations and the sink they are forwarded to.

use std::fmt;

use crate::SimTime;

/// One periodic humidity snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub at: SimTime,
    pub humidity: f64,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02} - soil humidity: {:.1}%",
            self.at.hour(),
            self.at.minute(),
            self.at.second(),
            self.humidity
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A buffered sink had no room left for the line.
    #[error("sink buffer full")]
    Full,

    #[error("sink closed")]
    Closed,
}

/// Append-only destination for rendered observation lines.
///
/// Implementations must return promptly; the controller calls `append` from
/// inside a tick.
pub trait ObservationSink {
    fn append(&mut self, line: &str) -> Result<(), SinkError>;
}

impl<S: ObservationSink + ?Sized> ObservationSink for Box<S> {
    fn append(&mut self, line: &str) -> Result<(), SinkError> {
        (**self).append(line)
    }
}

/// Accepts every line and keeps none of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ObservationSink for NullSink {
    fn append(&mut self, _line: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn renders_time_and_one_decimal() {
        let obs = Observation {
            at: datetime!(2025-03-01 14:30:00),
            humidity: 29.96,
        };
        assert_eq!(obs.to_string(), "14:30:00 - soil humidity: 30.0%");
    }

    #[test]
    fn boxed_sink_forwards() {
        let mut sink: Box<dyn ObservationSink> = Box::new(NullSink);
        assert!(sink.append("line").is_ok());
    }

    #[test]
    fn io_error_message() {
        let err = SinkError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        assert_eq!(err.to_string(), "sink i/o failed: read-only");
    }
}
