pub mod coarse;
pub mod counter;
pub mod interpolation;

use std::ops::Sub;

use crate::config::{ClockConfig, ClockKind};
use crate::error::Error;

/// An opaque reading taken from one clock source. The only meaningful
/// operation is subtracting two readings of the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockReading(u64);

impl ClockReading {
    pub(crate) fn new(raw: u64) -> Self {
        ClockReading(raw)
    }
}

impl Sub for ClockReading {
    type Output = u64;

    fn sub(self, earlier: ClockReading) -> u64 {
        self.0.wrapping_sub(earlier.0)
    }
}

/// A clock binding that can time a single operation.
///
/// `begin` is called right before the operation and `finish` right after it.
/// The returned value is a latency in the clock's own unit; how it relates to
/// wall time (and in which direction) depends on the binding.
pub trait LatencyTimer {
    type Mark;

    fn begin(&self) -> Self::Mark;
    fn finish(&self, mark: Self::Mark) -> u64;
}

/// Which clock sources the current environment can provide.
#[derive(Debug, Clone)]
pub struct Capabilities {
    shared_counter: Result<(), String>,
}

impl Capabilities {
    /// Inspect the environment once, before any session starts.
    pub fn detect(config: &ClockConfig) -> Self {
        Self {
            shared_counter: counter::check_support(config.shared_counter),
        }
    }

    /// Capabilities of an environment without a usable shared counter.
    #[cfg(test)]
    pub fn interpolation_only(reason: &str) -> Self {
        Self {
            shared_counter: Err(reason.to_string()),
        }
    }

    /// Reason the shared counter clock cannot be used, if any.
    pub fn shared_counter_unavailable(&self) -> Option<&str> {
        self.shared_counter.as_ref().err().map(String::as_str)
    }

    pub fn require(&self, kind: ClockKind) -> Result<(), Error> {
        match (kind, &self.shared_counter) {
            (ClockKind::Interpolation, _) => Ok(()),
            (ClockKind::SharedCounter, Ok(())) => Ok(()),
            (ClockKind::SharedCounter, Err(reason)) => Err(Error::Unsupported(format!(
                "shared counter clock: {}",
                reason
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_difference() {
        let a = ClockReading::new(100);
        let b = ClockReading::new(142);
        assert_eq!(b - a, 42);
        assert_eq!(a - a, 0);
        assert!(b > a);
    }

    #[test]
    fn test_interpolation_always_available() {
        let caps = Capabilities::interpolation_only("no threads");
        assert!(caps.require(ClockKind::Interpolation).is_ok());
        assert_eq!(caps.shared_counter_unavailable(), Some("no threads"));
    }

    #[test]
    fn test_unavailable_shared_counter_is_rejected() {
        let caps = Capabilities::interpolation_only("disabled");
        match caps.require(ClockKind::SharedCounter) {
            Err(Error::Unsupported(msg)) => assert!(msg.contains("disabled")),
            other => panic!("expected Error::Unsupported, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_by_config() {
        let config = ClockConfig {
            shared_counter: false,
            ..Default::default()
        };
        let caps = Capabilities::detect(&config);
        assert!(caps.shared_counter_unavailable().is_some());
        assert!(caps.require(ClockKind::SharedCounter).is_err());
    }
}
