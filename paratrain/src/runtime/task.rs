//! Cooperative step tasks.
//!
//! Asynchronous step handlers return a [`StepTask`] instead of blocking.
//! The [`CooperativeRunner`] polls every live task once per tick, in spawn
//! order, with a fresh [`StepContext`] bound to the procedure the task was
//! started for. Tasks report [`TaskPoll::Complete`] when done and are then
//! dropped.
//!
//! # Example
//!
//! ```ignore
//! let mut runner = CooperativeRunner::new();
//! runner.spawn(Box::new(Delay::new(seconds(3.0))), Some(cursor), "brief");
//!
//! // once per frame
//! for ctx in runner.poll_all(dt, &events) {
//!     machine.apply(ctx);
//! }
//! ```

use std::time::Duration;

use tracing::{debug, trace};

use super::timer::Countdown;
use crate::procedure::{ProcedureCursor, StepContext};
use crate::streaming::StreamEvent;

/// Result of polling a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPoll {
    /// Poll again next tick.
    Pending,
    /// Finished; drop the task.
    Complete,
}

/// A unit of handler work spread over several ticks.
pub trait StepTask {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Advance the task by `dt`.
    ///
    /// Effects on the scenario go through `ctx`.
    fn poll(&mut self, ctx: &mut StepContext, dt: Duration) -> TaskPoll;
}

struct RunningTask {
    task: Box<dyn StepTask>,
    cursor: Option<ProcedureCursor>,
    step: String,
}

/// Owns and polls spawned step tasks.
#[derive(Default)]
pub struct CooperativeRunner {
    tasks: Vec<RunningTask>,
}

impl CooperativeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `task` for the procedure at `cursor`.
    pub fn spawn(
        &mut self,
        task: Box<dyn StepTask>,
        cursor: Option<ProcedureCursor>,
        step: impl Into<String>,
    ) {
        let step = step.into();
        debug!(task = task.name(), step = %step, "Task spawned");
        self.tasks.push(RunningTask { task, cursor, step });
    }

    /// Poll every task once.
    ///
    /// Returns one context per polled task, carrying whatever the task
    /// recorded. Completed tasks are removed.
    pub fn poll_all(&mut self, dt: Duration, observed: &[StreamEvent]) -> Vec<StepContext> {
        let mut contexts = Vec::with_capacity(self.tasks.len());

        self.tasks.retain_mut(|running| {
            let mut ctx = StepContext::new(running.cursor, running.step.clone())
                .with_observed(observed.to_vec());
            let poll = running.task.poll(&mut ctx, dt);
            contexts.push(ctx);
            match poll {
                TaskPoll::Pending => true,
                TaskPoll::Complete => {
                    trace!(task = running.task.name(), step = %running.step, "Task complete");
                    false
                }
            }
        });

        contexts
    }

    /// Drop every task.
    pub fn clear(&mut self) {
        if !self.tasks.is_empty() {
            debug!(count = self.tasks.len(), "Cancelling running tasks");
        }
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl std::fmt::Debug for CooperativeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|t| t.task.name()).collect();
        f.debug_struct("CooperativeRunner").field("tasks", &names).finish()
    }
}

// =============================================================================
// Built-in Tasks
// =============================================================================

/// Waits for a duration, then marks the procedure successful and completes it.
///
/// This is the shape of a typical asynchronous step: do something that takes
/// time, then report.
#[derive(Debug)]
pub struct Delay {
    timer: Countdown,
    mark_success: bool,
}

impl Delay {
    pub fn new(duration: Duration) -> Self {
        Self {
            timer: Countdown::new(duration),
            mark_success: true,
        }
    }

    /// Complete the procedure without marking it successful.
    pub fn without_success(mut self) -> Self {
        self.mark_success = false;
        self
    }
}

impl StepTask for Delay {
    fn name(&self) -> &str {
        "delay"
    }

    fn poll(&mut self, ctx: &mut StepContext, dt: Duration) -> TaskPoll {
        if !self.timer.advance(dt) {
            return TaskPoll::Pending;
        }
        if self.mark_success {
            ctx.mark_success();
        }
        ctx.complete_procedure();
        TaskPoll::Complete
    }
}

/// Completes the procedure once a named scene reports loaded.
#[derive(Debug)]
pub struct AwaitSceneLoaded {
    scene: String,
}

impl AwaitSceneLoaded {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
        }
    }
}

impl StepTask for AwaitSceneLoaded {
    fn name(&self) -> &str {
        "await_scene_loaded"
    }

    fn poll(&mut self, ctx: &mut StepContext, _dt: Duration) -> TaskPoll {
        if !ctx.scene_loaded(&self.scene) {
            return TaskPoll::Pending;
        }
        debug!(scene = %self.scene, "Awaited scene loaded");
        ctx.mark_success();
        ctx.complete_procedure();
        TaskPoll::Complete
    }
}
