//! Handler-facing step context.
//!
//! Handlers never touch the state machine directly. They record commands on
//! a [`StepContext`]; the machine applies them after the handler returns.
//! Each context is bound to the procedure it was created for, so commands
//! from a handler that outlived its procedure are discarded.

use super::model::ProcedureCursor;
use crate::streaming::{StreamEvent, StreamRequest, StreamTarget};

/// An effect requested by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepCommand {
    /// Mark the current procedure successful.
    MarkSuccess,
    /// Finish the current procedure.
    CompleteProcedure,
    /// Queue a scene load or unload.
    Stream(StreamRequest),
}

/// Command recorder passed to step handlers and tasks.
#[derive(Debug, Clone)]
pub struct StepContext {
    cursor: Option<ProcedureCursor>,
    step: String,
    commands: Vec<StepCommand>,
    observed: Vec<StreamEvent>,
}

impl StepContext {
    /// Create a context for `step`, bound to `cursor`.
    ///
    /// Skip-mode and failure invocations pass `None`: their success and
    /// completion commands are never applied.
    pub fn new(cursor: Option<ProcedureCursor>, step: impl Into<String>) -> Self {
        Self {
            cursor,
            step: step.into(),
            commands: Vec::new(),
            observed: Vec::new(),
        }
    }

    /// Attach the stream events observed this tick.
    pub fn with_observed(mut self, observed: Vec<StreamEvent>) -> Self {
        self.observed = observed;
        self
    }

    /// Report the current procedure as successful.
    pub fn mark_success(&mut self) {
        self.commands.push(StepCommand::MarkSuccess);
    }

    /// Finish the current procedure.
    pub fn complete_procedure(&mut self) {
        self.commands.push(StepCommand::CompleteProcedure);
    }

    /// Queue a scene load.
    pub fn request_load(&mut self, target: StreamTarget) {
        self.commands
            .push(StepCommand::Stream(StreamRequest::Load(target)));
    }

    /// Queue a scene unload.
    pub fn request_unload(&mut self, target: StreamTarget) {
        self.commands
            .push(StepCommand::Stream(StreamRequest::Unload(target)));
    }

    /// Step key the handler was invoked for.
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Procedure this context is bound to.
    pub fn cursor(&self) -> Option<ProcedureCursor> {
        self.cursor
    }

    /// Returns true if this context is not bound to a procedure.
    ///
    /// Skip-mode and failure invocations are detached, as are tasks spawned
    /// from them. Their success and completion commands are never applied.
    pub fn is_detached(&self) -> bool {
        self.cursor.is_none()
    }

    /// Stream events published this tick.
    pub fn observed(&self) -> &[StreamEvent] {
        &self.observed
    }

    /// Returns true if `scene` was reported loaded this tick.
    pub fn scene_loaded(&self, scene: &str) -> bool {
        self.observed.iter().any(|event| event.is_loaded(scene))
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[StepCommand] {
        &self.commands
    }

    pub(crate) fn into_commands(self) -> Vec<StepCommand> {
        self.commands
    }
}
