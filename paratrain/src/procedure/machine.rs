//! Timeline/procedure state machine.
//!
//! Drives an ordered list of timelines, each an ordered list of procedures.
//! Every procedure waits on its trigger, dispatches its step handlers, and
//! then waits for an explicit completion before moving on:
//!
//! ```text
//!  Idle ──set_timeline──> start_timeline ──> enter_procedure(i)
//!                                              │
//!                  ┌──────── None ─────────────┤
//!                  │        Time: AwaitingTime │ Alt: AwaitingAltitude
//!                  v                           v
//!              Executing <──── trigger fires ──┘
//!                  │
//!         on_procedure_complete ──> enter_procedure(i + 1)
//!                  │                     or
//!                  └──────────────> TimelineComplete ──> next timeline
//!                                                        or ScenarioComplete
//! ```
//!
//! Handlers talk back through [`StepContext`] commands. Commands are applied
//! after the handler returns, and only if the procedure they were issued for
//! is still the current one.
//!
//! # Skipping ahead
//!
//! `set_timeline(n)` with `n` more than one past the current timeline runs
//! the skip routine first: every procedure key of the bypassed timelines is
//! dispatched in skip mode, one per tick, with no cursor. Only `SkipOnly`
//! and `Always` handlers run, and none of them can advance the machine.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::channels::{InstructionBus, InstructionShown, TelemetrySink};
use super::context::{StepCommand, StepContext};
use super::dispatch::DispatchTable;
use super::model::{Procedure, ProcedureCursor, ScenarioSource, Timeline, TriggerCondition};
use super::watcher::AltitudeWatcher;
use crate::runtime::{CooperativeRunner, Countdown};
use crate::streaming::{StreamEvent, StreamRequest};

// =============================================================================
// Configuration
// =============================================================================

/// Default session identifier used in telemetry reports.
pub const DEFAULT_SESSION_ID: &str = "local";

/// State machine configuration.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Session identifier passed to telemetry.
    pub session_id: String,

    /// Start the next timeline as soon as one completes.
    ///
    /// When false, the machine parks in [`MachinePhase::TimelineComplete`]
    /// until `set_timeline` is called.
    pub auto_advance: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
            auto_advance: true,
        }
    }
}

// =============================================================================
// Phase
// =============================================================================

/// Coarse state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachinePhase {
    /// No timeline active.
    Idle,
    /// Dispatching skip handlers on the way to `target`.
    Skipping { target: usize },
    /// Waiting for a `Time` trigger.
    AwaitingTime,
    /// Waiting for the altitude watcher.
    AwaitingAltitude,
    /// Handlers dispatched; waiting for completion.
    Executing,
    /// Current timeline finished, next one not started.
    TimelineComplete,
    /// Last timeline finished.
    ScenarioComplete,
}

impl fmt::Display for MachinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Skipping { target } => write!(f, "skipping to {}", target),
            Self::AwaitingTime => write!(f, "awaiting time"),
            Self::AwaitingAltitude => write!(f, "awaiting altitude"),
            Self::Executing => write!(f, "executing"),
            Self::TimelineComplete => write!(f, "timeline complete"),
            Self::ScenarioComplete => write!(f, "scenario complete"),
        }
    }
}

#[derive(Debug)]
struct SkipRoutine {
    target: usize,
    keys: VecDeque<String>,
}

// =============================================================================
// State Machine
// =============================================================================

/// Scenario driver.
pub struct TrainingStateMachine {
    config: MachineConfig,
    source: Box<dyn ScenarioSource>,
    dispatch: DispatchTable,
    telemetry: Box<dyn TelemetrySink>,
    instructions: InstructionBus,
    altitude: Box<dyn AltitudeWatcher>,
    runner: CooperativeRunner,

    timelines: Vec<Timeline>,
    current_timeline: Option<usize>,
    procedures: Vec<Procedure>,
    current_procedure: Option<usize>,
    phase: MachinePhase,

    epoch: u64,
    procedure_succeeded: bool,
    timeline_succeeded: bool,
    time_trigger: Option<Countdown>,
    skip: Option<SkipRoutine>,

    pending: VecDeque<(Option<ProcedureCursor>, StepCommand)>,
    outbox: Vec<StreamRequest>,
    executions: u64,
}

impl TrainingStateMachine {
    /// Create a machine. Timelines are read from `source` once, here.
    pub fn new(
        config: MachineConfig,
        source: Box<dyn ScenarioSource>,
        dispatch: DispatchTable,
        telemetry: Box<dyn TelemetrySink>,
        instructions: InstructionBus,
        altitude: Box<dyn AltitudeWatcher>,
    ) -> Self {
        let timelines = source.timelines();
        info!(
            session_id = %config.session_id,
            timelines = timelines.len(),
            handlers = dispatch.len(),
            "Training state machine created"
        );

        Self {
            config,
            source,
            dispatch,
            telemetry,
            instructions,
            altitude,
            runner: CooperativeRunner::new(),
            timelines,
            current_timeline: None,
            procedures: Vec::new(),
            current_procedure: None,
            phase: MachinePhase::Idle,
            epoch: 0,
            procedure_succeeded: false,
            timeline_succeeded: true,
            time_trigger: None,
            skip: None,
            pending: VecDeque::new(),
            outbox: Vec::new(),
            executions: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Timeline selection
    // -------------------------------------------------------------------------

    /// Select the timeline at `order`.
    ///
    /// - Out of range, already active, or already the skip target: no-op.
    /// - At most one past the current timeline (or earlier): starts directly.
    /// - Further ahead: runs the skip routine, then starts it.
    pub fn set_timeline(&mut self, order: usize) {
        if order >= self.timelines.len() {
            warn!(order, available = self.timelines.len(), "Timeline out of range");
            return;
        }
        if self.current_timeline == Some(order) && self.skip.is_none() {
            debug!(order, "Timeline already active");
            return;
        }
        if self.skip.as_ref().map(|s| s.target) == Some(order) {
            debug!(order, "Already skipping to timeline");
            return;
        }

        let current = self.current_timeline.map(|c| c as isize).unwrap_or(-1);
        if order as isize <= current + 1 {
            self.start_timeline(order);
        } else {
            self.begin_skip(current.max(0) as usize, order);
            self.advance_skip();
        }
        self.flush();
    }

    fn begin_skip(&mut self, from: usize, target: usize) {
        let keys: VecDeque<String> = self.timelines[from..target]
            .iter()
            .flat_map(|timeline| self.source.procedures_of(&timeline.id))
            .map(|procedure| procedure.key())
            .collect();

        info!(from, target, steps = keys.len(), "Skipping ahead");
        self.abandon_procedure();
        self.skip = Some(SkipRoutine { target, keys });
        self.phase = MachinePhase::Skipping { target };
    }

    /// Dispatch the next skipped key, or start the target when none remain.
    fn advance_skip(&mut self) {
        let Some(skip) = self.skip.as_mut() else {
            return;
        };
        match skip.keys.pop_front() {
            Some(key) => {
                let mut ctx = StepContext::new(None, key.clone());
                self.dispatch
                    .invoke(&key, true, false, &mut ctx, &mut self.runner);
                self.queue_commands(ctx);
            }
            None => {
                let target = skip.target;
                self.start_timeline(target);
            }
        }
    }

    /// Begin the timeline at `order` from its first procedure.
    fn start_timeline(&mut self, order: usize) {
        self.skip = None;
        self.abandon_procedure();

        let Some(timeline) = self.timelines.get(order) else {
            return;
        };
        self.current_timeline = Some(order);
        self.procedures = self.source.procedures_of(&timeline.id);
        self.timeline_succeeded = true;
        info!(
            order,
            timeline = %timeline.id,
            procedures = self.procedures.len(),
            "Timeline started"
        );

        if self.procedures.is_empty() {
            self.complete_timeline();
        } else {
            self.enter(0);
        }
    }

    fn abandon_procedure(&mut self) {
        self.time_trigger = None;
        self.altitude.disarm();
        self.current_procedure = None;
    }

    // -------------------------------------------------------------------------
    // Procedures
    // -------------------------------------------------------------------------

    /// Enter procedure `index` of the active timeline.
    ///
    /// Returns false if no timeline is active or the index is out of range.
    pub fn enter_procedure(&mut self, index: usize) -> bool {
        if self.current_timeline.is_none() || index >= self.procedures.len() {
            warn!(index, "Cannot enter procedure");
            return false;
        }
        self.enter(index);
        self.flush();
        true
    }

    fn enter(&mut self, index: usize) {
        self.time_trigger = None;
        self.altitude.disarm();
        self.current_procedure = Some(index);
        self.epoch += 1;
        self.procedure_succeeded = false;

        let procedure = &self.procedures[index];
        debug!(
            index,
            step = %procedure.step,
            condition = %procedure.condition,
            parameter = procedure.parameter,
            "Procedure entered"
        );

        match procedure.condition {
            TriggerCondition::None => self.execute(),
            TriggerCondition::Time => {
                self.time_trigger = Some(Countdown::new(procedure.wait_duration()));
                self.phase = MachinePhase::AwaitingTime;
            }
            TriggerCondition::Alt => {
                let threshold = procedure.parameter;
                self.altitude.arm(threshold);
                self.phase = MachinePhase::AwaitingAltitude;
            }
        }
    }

    /// Dispatch the current procedure's handlers and show its instructions.
    fn execute(&mut self) {
        let (Some(timeline), Some(index)) = (self.current_timeline, self.current_procedure) else {
            return;
        };
        let procedure = self.procedures[index].clone();
        self.phase = MachinePhase::Executing;
        self.executions += 1;

        let key = procedure.key();
        let mut ctx = StepContext::new(self.cursor(), key.clone());
        self.dispatch
            .invoke(&key, false, false, &mut ctx, &mut self.runner);
        self.queue_commands(ctx);

        let content = procedure
            .instruction
            .as_deref()
            .and_then(|id| self.source.instruction_content(id));
        let listeners = self.instructions.publish(InstructionShown {
            timeline_id: self.timelines[timeline].id.clone(),
            step: procedure.step.clone(),
            procedure: index,
            content,
        });
        debug!(step = %procedure.step, listeners, "Procedure executed");
    }

    /// Mark the current procedure successful.
    pub fn on_success(&mut self) {
        if self.current_procedure.is_some() {
            self.procedure_succeeded = true;
        }
    }

    /// Finish the current procedure and move on.
    ///
    /// Returns false if no procedure is active.
    pub fn on_procedure_complete(&mut self) -> bool {
        let completed = self.complete_procedure();
        self.flush();
        completed
    }

    fn complete_procedure(&mut self) -> bool {
        let Some(index) = self.current_procedure else {
            debug!("Completion with no active procedure");
            return false;
        };
        if !matches!(
            self.phase,
            MachinePhase::AwaitingTime | MachinePhase::AwaitingAltitude | MachinePhase::Executing
        ) {
            debug!(phase = %self.phase, "Completion outside a procedure");
            return false;
        }

        self.time_trigger = None;
        self.altitude.disarm();

        if !self.procedure_succeeded {
            let key = self.procedures[index].key();
            warn!(step = %key, "Procedure completed without success, running fail handlers");
            self.timeline_succeeded = false;
            let mut ctx = StepContext::new(None, key.clone());
            self.dispatch
                .invoke(&key, false, true, &mut ctx, &mut self.runner);
            self.queue_commands(ctx);
        }

        let next = index + 1;
        if next < self.procedures.len() {
            self.enter(next);
        } else {
            self.complete_timeline();
        }
        true
    }

    fn complete_timeline(&mut self) {
        let Some(order) = self.current_timeline else {
            return;
        };
        let success = self.timeline_succeeded;
        let timeline_id = self.timelines[order].id.clone();
        self.telemetry
            .report_timeline_complete(&self.config.session_id, &timeline_id, success);
        info!(timeline = %timeline_id, success, "Timeline complete");

        self.timeline_succeeded = true;
        self.current_procedure = None;
        self.phase = MachinePhase::TimelineComplete;

        let next = order + 1;
        if next >= self.timelines.len() {
            info!("Scenario complete");
            self.phase = MachinePhase::ScenarioComplete;
        } else if self.config.auto_advance {
            self.start_timeline(next);
        }
    }

    /// Push-style altitude callback.
    ///
    /// Executes the current procedure if it is waiting on an `Alt` trigger.
    pub fn on_altitude_reached(&mut self) {
        if self.phase != MachinePhase::AwaitingAltitude {
            debug!(phase = %self.phase, "Altitude callback ignored");
            return;
        }
        self.altitude.disarm();
        self.execute();
        self.flush();
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Advance by one frame.
    ///
    /// `events` are the stream events published this frame; running tasks
    /// observe them through their context.
    pub fn tick(&mut self, dt: Duration, events: &[StreamEvent]) {
        if self.skip.is_some() {
            self.advance_skip();
        }

        match self.phase {
            MachinePhase::AwaitingTime => {
                let fired = self
                    .time_trigger
                    .as_mut()
                    .map(|timer| timer.advance(dt))
                    .unwrap_or(false);
                if fired {
                    self.time_trigger = None;
                    self.execute();
                }
            }
            MachinePhase::AwaitingAltitude => {
                if self.altitude.take_crossing() {
                    self.execute();
                }
            }
            _ => {}
        }

        for ctx in self.runner.poll_all(dt, events) {
            self.queue_commands(ctx);
        }
        self.flush();
    }

    fn queue_commands(&mut self, ctx: StepContext) {
        let cursor = ctx.cursor();
        self.pending
            .extend(ctx.into_commands().into_iter().map(|cmd| (cursor, cmd)));
    }

    /// Apply queued handler commands until none remain.
    fn flush(&mut self) {
        while let Some((cursor, command)) = self.pending.pop_front() {
            match command {
                StepCommand::Stream(request) => self.outbox.push(request),
                StepCommand::MarkSuccess if self.is_current(cursor) => {
                    self.procedure_succeeded = true;
                }
                StepCommand::CompleteProcedure if self.is_current(cursor) => {
                    self.complete_procedure();
                }
                stale => {
                    debug!(?cursor, command = ?stale, "Dropping command for inactive procedure");
                }
            }
        }
    }

    fn cursor(&self) -> Option<ProcedureCursor> {
        Some(ProcedureCursor {
            timeline: self.current_timeline?,
            procedure: self.current_procedure?,
            epoch: self.epoch,
        })
    }

    fn is_current(&self, cursor: Option<ProcedureCursor>) -> bool {
        cursor.is_some() && cursor == self.cursor()
    }

    /// Take the stream requests handlers issued since the last call.
    pub fn take_stream_requests(&mut self) -> Vec<StreamRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Return to idle, dropping timers, tasks, and any skip in progress.
    pub fn reset(&mut self) {
        self.skip = None;
        self.abandon_procedure();
        self.runner.clear();
        self.pending.clear();
        self.outbox.clear();
        self.current_timeline = None;
        self.procedures.clear();
        self.procedure_succeeded = false;
        self.timeline_succeeded = true;
        self.phase = MachinePhase::Idle;
        info!("State machine reset");
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn phase(&self) -> MachinePhase {
        self.phase
    }

    pub fn current_timeline(&self) -> Option<usize> {
        self.current_timeline
    }

    pub fn current_procedure(&self) -> Option<usize> {
        self.current_procedure
    }

    /// The procedure currently entered, if any.
    pub fn active_procedure(&self) -> Option<&Procedure> {
        self.current_procedure.and_then(|i| self.procedures.get(i))
    }

    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    pub fn procedure_succeeded(&self) -> bool {
        self.procedure_succeeded
    }

    pub fn timeline_succeeded(&self) -> bool {
        self.timeline_succeeded
    }

    /// Number of times any procedure was executed.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn running_tasks(&self) -> usize {
        self.runner.len()
    }

    pub fn is_skipping(&self) -> bool {
        self.skip.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == MachinePhase::ScenarioComplete
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn dispatch_mut(&mut self) -> &mut DispatchTable {
        &mut self.dispatch
    }
}

impl fmt::Debug for TrainingStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingStateMachine")
            .field("phase", &self.phase)
            .field("current_timeline", &self.current_timeline)
            .field("current_procedure", &self.current_procedure)
            .field("epoch", &self.epoch)
            .field("timeline_succeeded", &self.timeline_succeeded)
            .field("running_tasks", &self.runner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::channels::{ChannelTelemetry, TimelineReport};
    use crate::procedure::dispatch::ExecutionMode;
    use crate::procedure::model::InstructionContent;
    use crate::procedure::watcher::AltitudeGate;
    use crate::runtime::{Delay, StepTask};
    use crate::streaming::StreamTarget;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::mpsc::UnboundedReceiver;

    const FRAME: Duration = Duration::from_millis(100);

    // =========================================================================
    // Helpers
    // =========================================================================

    #[derive(Default)]
    struct MemoryScenario {
        timelines: Vec<(Timeline, Vec<Procedure>)>,
    }

    impl MemoryScenario {
        fn with_timeline(mut self, id: &str, procedures: Vec<Procedure>) -> Self {
            let order = self.timelines.len();
            self.timelines.push((
                Timeline {
                    id: id.to_string(),
                    name: id.to_string(),
                    order,
                },
                procedures,
            ));
            self
        }
    }

    impl ScenarioSource for MemoryScenario {
        fn timelines(&self) -> Vec<Timeline> {
            self.timelines.iter().map(|(t, _)| t.clone()).collect()
        }

        fn procedures_of(&self, timeline_id: &str) -> Vec<Procedure> {
            self.timelines
                .iter()
                .find(|(t, _)| t.id == timeline_id)
                .map(|(_, p)| p.clone())
                .unwrap_or_default()
        }

        fn instruction_content(&self, instruction_id: &str) -> Option<InstructionContent> {
            Some(InstructionContent {
                id: instruction_id.to_string(),
                title: instruction_id.to_uppercase(),
                ..Default::default()
            })
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    struct Harness {
        machine: TrainingStateMachine,
        reports: UnboundedReceiver<TimelineReport>,
        gate: AltitudeGate,
    }

    impl Harness {
        fn new(scenario: MemoryScenario, dispatch: DispatchTable) -> Self {
            Self::with_config(scenario, dispatch, MachineConfig::default())
        }

        fn with_config(scenario: MemoryScenario, dispatch: DispatchTable, config: MachineConfig) -> Self {
            let (telemetry, reports) = ChannelTelemetry::new();
            let gate = AltitudeGate::new();
            let machine = TrainingStateMachine::new(
                config,
                Box::new(scenario),
                dispatch,
                Box::new(telemetry),
                InstructionBus::default(),
                Box::new(gate.clone()),
            );
            Self {
                machine,
                reports,
                gate,
            }
        }

        fn tick(&mut self, frames: usize) {
            for _ in 0..frames {
                self.machine.tick(FRAME, &[]);
            }
        }

        fn reports(&mut self) -> Vec<TimelineReport> {
            let mut out = Vec::new();
            while let Ok(report) = self.reports.try_recv() {
                out.push(report);
            }
            out
        }
    }

    fn procedures(keys: &[&str]) -> Vec<Procedure> {
        keys.iter().map(|k| Procedure::new(*k)).collect()
    }

    /// Normal handler that succeeds and completes; SkipOnly handler that logs.
    fn register_step(table: &mut DispatchTable, key: &str, log: &Log) {
        let normal_log = Rc::clone(log);
        let normal_key = key.to_string();
        table.register(key, ExecutionMode::Normal, move |ctx: &mut StepContext| {
            normal_log.borrow_mut().push(format!("normal:{}", normal_key));
            ctx.mark_success();
            ctx.complete_procedure();
        });
        let skip_log = Rc::clone(log);
        let skip_key = key.to_string();
        table.register(key, ExecutionMode::SkipOnly, move |ctx: &mut StepContext| {
            skip_log.borrow_mut().push(format!("skip:{}", skip_key));
            // Skip-mode completion must never advance the machine.
            ctx.complete_procedure();
        });
    }

    // =========================================================================
    // Timeline selection
    // =========================================================================

    #[test]
    fn test_sync_handlers_run_whole_scenario() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        for key in ["a", "b", "c"] {
            register_step(&mut table, key, &log);
        }
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["a", "b"]))
            .with_timeline("t1", procedures(&["c"]));
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(0);
        assert!(h.machine.is_complete());
        assert_eq!(*log.borrow(), vec!["normal:a", "normal:b", "normal:c"]);

        let reports = h.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.success));
        assert_eq!(reports[0].session_id, DEFAULT_SESSION_ID);
    }

    #[test]
    fn test_set_timeline_out_of_range_or_active_is_noop() {
        let scenario = MemoryScenario::default().with_timeline("t0", procedures(&["wait"]));
        let mut h = Harness::new(scenario, DispatchTable::new());

        h.machine.set_timeline(5);
        assert_eq!(h.machine.phase(), MachinePhase::Idle);

        h.machine.set_timeline(0);
        let executions = h.machine.executions();
        h.machine.set_timeline(0);
        assert_eq!(h.machine.executions(), executions);
    }

    #[test]
    fn test_skip_runs_skip_only_handlers() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        for key in ["a0", "a1", "a2", "b0", "b1", "b2", "c0", "c1", "c2"] {
            register_step(&mut table, key, &log);
        }
        // Parking handler so timeline 0 stays active.
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["a0", "a1", "a2"]))
            .with_timeline("t1", procedures(&["b0", "b1", "b2"]))
            .with_timeline("t2", vec![Procedure::new("c0").with_trigger(TriggerCondition::Time, 60.0)]);
        let mut h = Harness::with_config(
            scenario,
            table,
            MachineConfig {
                auto_advance: false,
                ..Default::default()
            },
        );

        h.machine.set_timeline(0);
        assert_eq!(h.machine.phase(), MachinePhase::TimelineComplete);
        log.borrow_mut().clear();

        // From timeline 0, jump to 2.
        h.machine.set_timeline(2);
        assert_eq!(h.machine.phase(), MachinePhase::Skipping { target: 2 });
        assert_eq!(log.borrow().len(), 1, "first skipped key dispatched immediately");

        h.tick(5);
        assert_eq!(
            *log.borrow(),
            vec!["skip:a0", "skip:a1", "skip:a2", "skip:b0", "skip:b1", "skip:b2"]
        );
        assert!(h.machine.is_skipping());

        h.tick(1);
        assert!(!h.machine.is_skipping());
        assert_eq!(h.machine.current_timeline(), Some(2));
        assert_eq!(h.machine.current_procedure(), Some(0));
        assert_eq!(h.machine.phase(), MachinePhase::AwaitingTime);
        assert!(log.borrow().iter().all(|entry| entry.starts_with("skip:")));
    }

    #[test]
    fn test_repeated_skip_target_is_noop() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        for key in ["a", "b", "c"] {
            register_step(&mut table, key, &log);
        }
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["a"]))
            .with_timeline("t1", procedures(&["b"]))
            .with_timeline("t2", procedures(&["c"]));
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(2);
        h.machine.set_timeline(2);
        assert_eq!(log.borrow().len(), 1);
        h.tick(5);
        assert_eq!(*log.borrow(), vec!["skip:a", "skip:b", "normal:c"]);
    }

    #[test]
    fn test_empty_timeline_reports_success() {
        let scenario = MemoryScenario::default()
            .with_timeline("empty", Vec::new())
            .with_timeline("also_empty", Vec::new());
        let mut h = Harness::new(scenario, DispatchTable::new());

        h.machine.set_timeline(0);
        let reports = h.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.success));
        assert!(h.machine.is_complete());
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    #[test]
    fn test_time_trigger_fires_once_at_duration() {
        let scenario = MemoryScenario::default().with_timeline(
            "t0",
            vec![Procedure::new("wait").with_trigger(TriggerCondition::Time, 2.0)],
        );
        let mut h = Harness::new(scenario, DispatchTable::new());

        h.machine.set_timeline(0);
        assert_eq!(h.machine.phase(), MachinePhase::AwaitingTime);

        h.tick(19);
        assert_eq!(h.machine.executions(), 0, "1.9s is not enough");
        h.tick(1);
        assert_eq!(h.machine.executions(), 1);
        h.tick(30);
        assert_eq!(h.machine.executions(), 1);
    }

    #[test]
    fn test_enter_procedure_restarts_time_trigger() {
        let scenario = MemoryScenario::default().with_timeline(
            "t0",
            vec![Procedure::new("wait").with_trigger(TriggerCondition::Time, 2.0)],
        );
        let mut h = Harness::new(scenario, DispatchTable::new());
        h.machine.set_timeline(0);
        h.tick(15);

        assert!(h.machine.enter_procedure(0));
        h.tick(19);
        assert_eq!(h.machine.executions(), 0);
        h.tick(1);
        assert_eq!(h.machine.executions(), 1);

        assert!(!h.machine.enter_procedure(3));
    }

    #[test]
    fn test_alt_trigger_waits_for_crossing() {
        let scenario = MemoryScenario::default().with_timeline(
            "t0",
            vec![Procedure::new("flare").with_trigger(TriggerCondition::Alt, 50.0)],
        );
        let mut h = Harness::new(scenario, DispatchTable::new());
        h.machine.set_timeline(0);
        assert_eq!(h.machine.phase(), MachinePhase::AwaitingAltitude);
        assert_eq!(h.gate.threshold(), Some(50.0));

        h.gate.observe(120.0);
        h.tick(100);
        assert_eq!(h.machine.executions(), 0, "no timeout on Alt triggers");

        h.gate.observe(45.0);
        h.tick(1);
        assert_eq!(h.machine.executions(), 1);
        assert_eq!(h.machine.phase(), MachinePhase::Executing);
    }

    #[test]
    fn test_on_altitude_reached_push_callback() {
        let scenario = MemoryScenario::default().with_timeline(
            "t0",
            vec![Procedure::new("flare").with_trigger(TriggerCondition::Alt, 50.0)],
        );
        let mut h = Harness::new(scenario, DispatchTable::new());

        h.machine.on_altitude_reached();
        assert_eq!(h.machine.executions(), 0);

        h.machine.set_timeline(0);
        h.machine.on_altitude_reached();
        assert_eq!(h.machine.executions(), 1);
        assert!(!h.gate.is_armed());
    }

    // =========================================================================
    // Completion and failure
    // =========================================================================

    #[test]
    fn test_missing_success_runs_fail_handlers_and_reports_false() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        let fail_log = Rc::clone(&log);
        table.register("rescue", ExecutionMode::Fail, move |_ctx: &mut StepContext| {
            fail_log.borrow_mut().push("fail".to_string());
        });
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["rescue"]))
            .with_timeline("t1", Vec::new());
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(0);
        assert_eq!(h.machine.phase(), MachinePhase::Executing);
        assert!(log.borrow().is_empty());

        assert!(h.machine.on_procedure_complete());
        assert_eq!(*log.borrow(), vec!["fail"]);

        let reports = h.reports();
        assert_eq!(reports[0].timeline_id, "t0");
        assert!(!reports[0].success);
        // Flag resets for the next timeline.
        assert!(reports[1].success);
    }

    #[test]
    fn test_failure_invocation_is_detached() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        let normal_log = Rc::clone(&log);
        table.register("rescue", ExecutionMode::Normal, move |ctx: &mut StepContext| {
            normal_log
                .borrow_mut()
                .push(format!("normal detached={}", ctx.is_detached()));
        });
        let fail_log = Rc::clone(&log);
        table.register("rescue", ExecutionMode::Fail, move |ctx: &mut StepContext| {
            fail_log
                .borrow_mut()
                .push(format!("fail detached={}", ctx.is_detached()));
            // Detached completion must not advance the machine twice.
            ctx.complete_procedure();
        });
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["rescue", "debrief"]));
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(0);
        assert!(h.machine.on_procedure_complete());
        assert_eq!(
            *log.borrow(),
            vec![
                "normal detached=false",
                "normal detached=true",
                "fail detached=true",
            ]
        );
        assert_eq!(h.machine.current_procedure(), Some(1));
    }

    #[test]
    fn test_on_success_prevents_fail_handlers() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        let fail_log = Rc::clone(&log);
        table.register("rescue", ExecutionMode::Fail, move |_ctx: &mut StepContext| {
            fail_log.borrow_mut().push("fail".to_string());
        });
        let scenario = MemoryScenario::default().with_timeline("t0", procedures(&["rescue"]));
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(0);
        h.machine.on_success();
        h.machine.on_procedure_complete();
        assert!(log.borrow().is_empty());
        assert!(h.reports()[0].success);
    }

    #[test]
    fn test_completion_without_procedure_is_ignored() {
        let scenario = MemoryScenario::default().with_timeline("t0", procedures(&["x"]));
        let mut h = Harness::new(scenario, DispatchTable::new());
        assert!(!h.machine.on_procedure_complete());
    }

    #[test]
    fn test_async_handler_completes_procedure() {
        let mut table = DispatchTable::new();
        table.register_async("brief", ExecutionMode::Normal, |_ctx: &mut StepContext| {
            Box::new(Delay::new(Duration::from_millis(300))) as Box<dyn StepTask>
        });
        let scenario = MemoryScenario::default().with_timeline("t0", procedures(&["brief"]));
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(0);
        assert_eq!(h.machine.running_tasks(), 1);
        h.tick(2);
        assert_eq!(h.machine.phase(), MachinePhase::Executing);
        h.tick(1);
        assert!(h.machine.is_complete());
        assert!(h.reports()[0].success);
    }

    #[test]
    fn test_stale_task_commands_are_dropped() {
        let mut table = DispatchTable::new();
        table.register_async("slow", ExecutionMode::Normal, |_ctx: &mut StepContext| {
            Box::new(Delay::new(Duration::from_secs(1))) as Box<dyn StepTask>
        });
        let scenario = MemoryScenario::default().with_timeline(
            "t0",
            vec![
                Procedure::new("slow"),
                Procedure::new("next").with_trigger(TriggerCondition::Time, 60.0),
            ],
        );
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(0);
        // Completed externally before the task finishes.
        h.machine.on_success();
        h.machine.on_procedure_complete();
        assert_eq!(h.machine.current_procedure(), Some(1));

        h.tick(20);
        assert_eq!(h.machine.current_procedure(), Some(1), "old task cannot advance");
        assert_eq!(h.machine.phase(), MachinePhase::AwaitingTime);
    }

    #[test]
    fn test_stream_requests_reach_outbox() {
        let mut table = DispatchTable::new();
        table.register("open_door", ExecutionMode::Always, |ctx: &mut StepContext| {
            ctx.request_load(StreamTarget::scene("hangar"));
        });
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["open_door"]))
            .with_timeline("t1", Vec::new())
            .with_timeline("t2", Vec::new());
        let mut h = Harness::new(scenario, table);

        // Skip mode still forwards stream requests.
        h.machine.set_timeline(2);
        assert_eq!(
            h.machine.take_stream_requests(),
            vec![StreamRequest::Load(StreamTarget::scene("hangar"))]
        );
        assert!(h.machine.take_stream_requests().is_empty());
    }

    #[test]
    fn test_instruction_shown_on_execute() {
        let scenario = MemoryScenario::default().with_timeline(
            "t0",
            vec![Procedure::new("harness_check").with_instruction("harness")],
        );
        let (telemetry, _reports) = ChannelTelemetry::new();
        let bus = InstructionBus::default();
        let mut rx = bus.subscribe();
        let mut machine = TrainingStateMachine::new(
            MachineConfig::default(),
            Box::new(scenario),
            DispatchTable::new(),
            Box::new(telemetry),
            bus,
            Box::new(AltitudeGate::new()),
        );

        // No handler registered: warned, instructions still shown.
        machine.set_timeline(0);
        let shown = rx.try_recv().unwrap();
        assert_eq!(shown.step, "harness_check");
        assert_eq!(shown.timeline_id, "t0");
        assert_eq!(shown.content.unwrap().title, "HARNESS");
    }

    #[test]
    fn test_auto_advance_disabled_parks_between_timelines() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        register_step(&mut table, "a", &log);
        register_step(&mut table, "b", &log);
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["a"]))
            .with_timeline("t1", procedures(&["b"]));
        let mut h = Harness::with_config(
            scenario,
            table,
            MachineConfig {
                session_id: "s9".to_string(),
                auto_advance: false,
            },
        );

        h.machine.set_timeline(0);
        assert_eq!(h.machine.phase(), MachinePhase::TimelineComplete);
        h.tick(10);
        assert_eq!(h.machine.current_timeline(), Some(0));

        h.machine.set_timeline(1);
        assert!(h.machine.is_complete());
        assert_eq!(h.reports()[0].session_id, "s9");
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut table = DispatchTable::new();
        table.register_async("slow", ExecutionMode::Normal, |_ctx: &mut StepContext| {
            Box::new(Delay::new(Duration::from_secs(5))) as Box<dyn StepTask>
        });
        let scenario = MemoryScenario::default()
            .with_timeline("t0", procedures(&["slow"]))
            .with_timeline("t1", vec![Procedure::new("flare").with_trigger(TriggerCondition::Alt, 10.0)]);
        let mut h = Harness::new(scenario, table);

        h.machine.set_timeline(0);
        assert_eq!(h.machine.running_tasks(), 1);
        h.machine.reset();

        assert_eq!(h.machine.phase(), MachinePhase::Idle);
        assert_eq!(h.machine.current_timeline(), None);
        assert_eq!(h.machine.running_tasks(), 0);
        assert!(!h.gate.is_armed());

        // Idle again, so timeline 1 is reached by skipping timeline 0.
        h.machine.set_timeline(1);
        assert_eq!(h.machine.phase(), MachinePhase::Skipping { target: 1 });
        h.tick(1);
        assert_eq!(h.machine.phase(), MachinePhase::AwaitingAltitude);
        assert_eq!(h.machine.running_tasks(), 0, "skip mode does not start Normal tasks");
    }
}
