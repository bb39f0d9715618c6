//! Paratrain - training-scenario orchestration and terrain streaming
//!
//! This library provides the simulation-independent core of a paraglider
//! training application:
//!
//! - [`streaming`]: region triggers, the region registry, and the load
//!   scheduler that drains queued scene loads and unloads one at a time
//! - [`procedure`]: the dispatch table mapping step keys to handlers, and
//!   the timeline/procedure state machine that drives a training scenario
//! - [`runtime`]: cooperative tasks and timers advanced by an external tick
//! - [`session`]: the orchestrator wiring all of the above to one frame loop
//!
//! Everything runs on a single thread. The host calls
//! [`session::TrainingSession::tick`] once per frame.

pub mod config;
pub mod error;
pub mod logging;
pub mod procedure;
pub mod runtime;
pub mod session;
pub mod streaming;

/// Library version, as reported in logs and telemetry.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
