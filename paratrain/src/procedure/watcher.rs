//! Altitude watcher.
//!
//! An `Alt`-triggered procedure arms the watcher with a threshold and waits
//! for exactly one crossing report. The host feeds altitude samples into an
//! [`AltitudeGate`] (a cheap clone of a shared handle); the state machine
//! polls it once per tick.
//!
//! Thresholds are crossed on the way down. There is no timeout: a gate
//! that never sees the aircraft at or below its threshold keeps its
//! procedure waiting.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Threshold watcher used by `Alt` triggers.
pub trait AltitudeWatcher {
    /// Start watching for `threshold`. Re-arming replaces any previous arm.
    fn arm(&mut self, threshold: f32);

    /// Stop watching. A pending crossing is discarded.
    fn disarm(&mut self);

    /// Returns true exactly once per arm, after the threshold is crossed.
    fn take_crossing(&mut self) -> bool;
}

#[derive(Debug, Default)]
struct GateState {
    threshold: Option<f32>,
    crossed: bool,
    last_sample: Option<f32>,
}

impl GateState {
    /// Latch the crossing if `altitude` is at or below the armed threshold.
    fn check(&mut self, altitude: f32) {
        let Some(threshold) = self.threshold else {
            return;
        };
        if !self.crossed && altitude <= threshold {
            self.crossed = true;
            debug!(altitude, threshold, "Altitude threshold crossed");
        }
    }
}

/// Shared altitude gate.
///
/// `Alt` thresholds are descent gates: the gate fires once the aircraft is
/// at or below the armed threshold. Samples seen before
/// [`arm`](AltitudeWatcher::arm) still count, so an aircraft that is already
/// at or below the threshold when the gate is armed fires on the next poll.
/// NaN samples are ignored.
#[derive(Debug, Clone, Default)]
pub struct AltitudeGate {
    state: Arc<Mutex<GateState>>,
}

impl AltitudeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an altitude sample, in meters.
    pub fn observe(&self, altitude: f32) {
        if altitude.is_nan() {
            return;
        }
        let mut state = self.state.lock();
        state.last_sample = Some(altitude);
        state.check(altitude);
    }

    /// Threshold currently armed.
    pub fn threshold(&self) -> Option<f32> {
        self.state.lock().threshold
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().threshold.is_some()
    }

    /// Most recent sample, armed or not.
    pub fn last_sample(&self) -> Option<f32> {
        self.state.lock().last_sample
    }
}

impl AltitudeWatcher for AltitudeGate {
    fn arm(&mut self, threshold: f32) {
        let mut state = self.state.lock();
        state.threshold = Some(threshold);
        state.crossed = false;
        if let Some(altitude) = state.last_sample {
            state.check(altitude);
        }
        trace!(threshold, crossed = state.crossed, "Altitude gate armed");
    }

    fn disarm(&mut self) {
        let mut state = self.state.lock();
        state.threshold = None;
        state.crossed = false;
    }

    fn take_crossing(&mut self) -> bool {
        let mut state = self.state.lock();
        if state.threshold.is_some() && state.crossed {
            // One callback per arm.
            state.threshold = None;
            state.crossed = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_on_descent_through_threshold() {
        let mut gate = AltitudeGate::new();
        gate.arm(300.0);

        gate.observe(500.0);
        assert!(!gate.take_crossing());
        gate.observe(310.0);
        assert!(!gate.take_crossing());
        gate.observe(295.0);
        assert!(gate.take_crossing());

        gate.observe(200.0);
        assert!(!gate.take_crossing(), "no further calls until re-armed");
    }

    #[test]
    fn test_climb_does_not_fire() {
        let mut gate = AltitudeGate::new();
        gate.arm(100.0);
        gate.observe(150.0);
        gate.observe(400.0);
        assert!(!gate.take_crossing());
        assert!(gate.is_armed());
    }

    #[test]
    fn test_first_sample_on_threshold_fires() {
        let mut gate = AltitudeGate::new();
        gate.arm(100.0);
        gate.observe(100.0);
        assert!(gate.take_crossing());
    }

    #[test]
    fn test_descent_between_last_sample_and_arming() {
        let mut gate = AltitudeGate::new();
        gate.observe(310.0);
        gate.arm(300.0);
        assert!(!gate.take_crossing(), "still above at arm time");

        for altitude in [295.0, 280.0, 200.0, 50.0, 0.0] {
            gate.observe(altitude);
        }
        assert!(gate.take_crossing());
        assert!(!gate.take_crossing());
    }

    #[test]
    fn test_already_below_when_armed_fires_immediately() {
        let mut gate = AltitudeGate::new();
        gate.observe(100.0);
        gate.arm(150.0);
        assert!(gate.take_crossing());

        // Re-arming below the aircraft waits for a real descent.
        gate.arm(50.0);
        gate.observe(80.0);
        assert!(!gate.take_crossing());
        gate.observe(40.0);
        assert!(gate.take_crossing());
    }

    #[test]
    fn test_disarm_discards_crossing() {
        let mut gate = AltitudeGate::new();
        gate.arm(100.0);
        gate.observe(200.0);
        gate.observe(50.0);
        gate.disarm();
        assert!(!gate.take_crossing());
        assert!(!gate.is_armed());
    }

    #[test]
    fn test_clones_share_state() {
        let mut watcher = AltitudeGate::new();
        let feed = watcher.clone();
        watcher.arm(100.0);
        feed.observe(150.0);
        feed.observe(90.0);
        assert!(watcher.take_crossing());
    }

    #[test]
    fn test_nan_ignored() {
        let mut gate = AltitudeGate::new();
        gate.arm(100.0);
        gate.observe(f32::NAN);
        gate.observe(150.0);
        gate.observe(f32::NAN);
        assert!(!gate.take_crossing());
        assert_eq!(gate.threshold(), Some(100.0));
    }
}
