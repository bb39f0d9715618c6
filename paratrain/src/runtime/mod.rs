//! Tick-driven runtime primitives.
//!
//! Nothing in this module spawns threads or sleeps. Timers and tasks only
//! move when their owner advances them with the frame delta.

mod task;
mod timer;

pub use task::{AwaitSceneLoaded, CooperativeRunner, Delay, StepTask, TaskPoll};
pub use timer::{seconds, Countdown};
