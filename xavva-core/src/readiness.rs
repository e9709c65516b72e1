//! Server readiness tracking.
//!
//! A [`ReadinessTracker`] belongs to exactly one server start. It watches the
//! log stream for the startup marker and reports it once, and separately
//! tells the caller when a "starting" indicator should be settled.

use crate::classify::{STARTUP_MARKER, is_severe};

/// What one observed line means for readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observation {
    /// The startup marker was seen for the first time.
    pub ready: bool,
    /// The starting indicator should be finished now: `Some(true)` on a
    /// successful startup, `Some(false)` when a failure line came first.
    pub settle: Option<bool>,
}

#[derive(Debug, Default)]
pub struct ReadinessTracker {
    fired: bool,
    settled: bool,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, line: &str) -> Observation {
        let mut observation = Observation::default();
        let startup = line.contains(STARTUP_MARKER);

        if startup && !self.fired {
            self.fired = true;
            observation.ready = true;
        }
        if !self.settled && (startup || is_severe(line)) {
            self.settled = true;
            observation.settle = Some(startup);
        }
        observation
    }

    pub fn is_ready(&self) -> bool {
        self.fired
    }
}
