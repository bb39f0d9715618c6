//! Tick-driven countdown timers.
//!
//! A [`Countdown`] replaces a "wait N seconds" coroutine with an explicit
//! state object. The owner advances it by the frame delta; it fires exactly
//! once, on the first advance at which the accumulated time reaches the
//! configured duration. Dropping the countdown cancels it.
//!
//! Time is accumulated as [`Duration`], so repeated fixed-step ticks add up
//! exactly (ten 100ms ticks are exactly one second).

use std::time::Duration;

/// Convert a configured number of seconds into a [`Duration`].
///
/// Negative, NaN, and infinite values become zero.
pub fn seconds(value: f32) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f32(value)
    } else {
        Duration::ZERO
    }
}

/// One-shot timer advanced by explicit ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    duration: Duration,
    elapsed: Duration,
    fired: bool,
}

impl Countdown {
    /// Create a countdown that fires once `duration` has elapsed.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            elapsed: Duration::ZERO,
            fired: false,
        }
    }

    /// Advance by `dt`.
    ///
    /// Returns `true` exactly once: on the advance that reaches the
    /// duration. A zero-length countdown fires on its first advance.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if self.fired {
            return false;
        }
        self.elapsed = self.elapsed.saturating_add(dt);
        if self.elapsed >= self.duration {
            self.fired = true;
            return true;
        }
        false
    }

    /// Configured duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Time accumulated so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Time left before the countdown fires.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed)
    }

    /// Whether the countdown has fired.
    pub fn is_finished(&self) -> bool {
        self.fired
    }
}
