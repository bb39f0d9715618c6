//! Timeline and procedure records.
//!
//! These are read-only once loaded. The state machine only holds index
//! positions into them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::runtime::seconds;

// =============================================================================
// Trigger Conditions
// =============================================================================

/// What gates a procedure's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerCondition {
    /// Execute immediately.
    #[default]
    None,
    /// Execute after the parameter, in seconds.
    Time,
    /// Execute when the altitude watcher reports a crossing of the
    /// parameter, in meters.
    Alt,
}

impl TriggerCondition {
    /// Parse a configured condition string.
    ///
    /// Matching is case-insensitive. Unrecognised values fall back to
    /// [`TriggerCondition::None`] with a warning.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Self::None,
            "time" => Self::Time,
            "alt" | "altitude" => Self::Alt,
            other => {
                warn!(condition = other, "Unknown trigger condition, treating as None");
                Self::None
            }
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Time => write!(f, "time"),
            Self::Alt => write!(f, "alt"),
        }
    }
}

// =============================================================================
// Procedures and Timelines
// =============================================================================

/// One gated training step.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    /// Dispatch key.
    pub step: String,
    pub condition: TriggerCondition,
    /// Seconds for `Time`, meters for `Alt`, ignored for `None`.
    pub parameter: f32,
    /// Instruction content shown when the procedure executes.
    pub instruction: Option<String>,
}

impl Procedure {
    /// Procedure that executes immediately.
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            condition: TriggerCondition::None,
            parameter: 0.0,
            instruction: None,
        }
    }

    pub fn with_trigger(mut self, condition: TriggerCondition, parameter: f32) -> Self {
        self.condition = condition;
        self.parameter = parameter;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Normalised dispatch key.
    pub fn key(&self) -> String {
        self.step.to_lowercase()
    }

    /// Wait for a `Time` trigger. Invalid values become zero.
    pub fn wait_duration(&self) -> Duration {
        seconds(self.parameter)
    }
}

/// One phase of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub id: String,
    pub name: String,
    /// Position in the scenario, starting at zero.
    pub order: usize,
}

/// Instructional content for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstructionContent {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Optional media reference (clip or image path).
    #[serde(default)]
    pub media: Option<String>,
}

/// Identifies one execution of one procedure.
///
/// The epoch increases every time a procedure is entered, so re-entering
/// the same position yields a different cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcedureCursor {
    pub timeline: usize,
    pub procedure: usize,
    pub epoch: u64,
}

// =============================================================================
// Configuration Source
// =============================================================================

/// Read-only scenario data.
pub trait ScenarioSource {
    /// Every timeline, ordered.
    fn timelines(&self) -> Vec<Timeline>;

    /// Procedures of a timeline, ordered. Unknown ids yield an empty list.
    fn procedures_of(&self, timeline_id: &str) -> Vec<Procedure>;

    /// Instruction content by id.
    fn instruction_content(&self, instruction_id: &str) -> Option<InstructionContent>;
}
