//! Training procedures.
//!
//! A scenario is an ordered list of timelines; each timeline is an ordered
//! list of procedures. The [`TrainingStateMachine`] walks them, gating each
//! procedure on its trigger and dispatching its step key through the
//! [`DispatchTable`].

mod channels;
mod context;
mod dispatch;
mod machine;
mod model;
mod watcher;

pub use channels::{
    ChannelTelemetry, InstructionBus, InstructionShown, TelemetrySink, TimelineReport,
    TracingTelemetry, DEFAULT_INSTRUCTION_CAPACITY,
};
pub use context::{StepCommand, StepContext};
pub use dispatch::{AsyncStepHandler, DispatchTable, ExecutionMode, StepHandler};
pub use machine::{MachineConfig, MachinePhase, TrainingStateMachine, DEFAULT_SESSION_ID};
pub use model::{
    InstructionContent, Procedure, ProcedureCursor, ScenarioSource, Timeline, TriggerCondition,
};
pub use watcher::{AltitudeGate, AltitudeWatcher};
