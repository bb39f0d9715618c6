//! Step dispatch table.
//!
//! Maps case-insensitive step keys to handlers. Several handlers may share
//! a key; all admitted ones run, in registration order. Each entry carries
//! an [`ExecutionMode`] deciding in which circumstances it runs:
//!
//! | Mode       | ordinary | skip batch | failure |
//! |------------|----------|------------|---------|
//! | `Normal`   | yes      | no         | yes     |
//! | `SkipOnly` | no       | yes        | no      |
//! | `Always`   | yes      | yes        | no      |
//! | `Fail`     | no       | no         | yes     |
//!
//! Failure invocations are made with `skip_batch = false`, which is why
//! `Normal` entries also run during failure cleanup.
//!
//! # Example
//!
//! ```ignore
//! let mut table = DispatchTable::new();
//! table.register("open_door", ExecutionMode::Normal, |ctx: &mut StepContext| {
//!     ctx.request_load(StreamTarget::scene("hangar"));
//!     ctx.mark_success();
//!     ctx.complete_procedure();
//! });
//! table.register_async("brief", ExecutionMode::Normal, |_ctx: &mut StepContext| {
//!     Box::new(Delay::new(seconds(4.0))) as Box<dyn StepTask>
//! });
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::context::StepContext;
use crate::runtime::{CooperativeRunner, StepTask};

// =============================================================================
// Execution Mode
// =============================================================================

/// When a dispatch entry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Ordinary execution (and failure cleanup).
    #[default]
    Normal,
    /// Only while skipping past a procedure.
    SkipOnly,
    /// Always, except during failure cleanup.
    Always,
    /// Only when the procedure completed unsuccessfully.
    Fail,
}

impl ExecutionMode {
    /// Whether an entry with this mode runs for the given invocation.
    pub fn admits(self, skip_batch: bool, is_fail: bool) -> bool {
        let excluded = (skip_batch && self == Self::Normal)
            || (is_fail && self == Self::Always)
            || (!skip_batch && self == Self::SkipOnly)
            || (!is_fail && self == Self::Fail);
        !excluded
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::SkipOnly => write!(f, "skip_only"),
            Self::Always => write!(f, "always"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handler that runs to completion inside `invoke`.
pub trait StepHandler {
    fn execute(&mut self, ctx: &mut StepContext);
}

impl<F> StepHandler for F
where
    F: FnMut(&mut StepContext),
{
    fn execute(&mut self, ctx: &mut StepContext) {
        self(ctx)
    }
}

/// Handler that starts a task for the cooperative runner.
pub trait AsyncStepHandler {
    fn start(&mut self, ctx: &mut StepContext) -> Box<dyn StepTask>;
}

impl<F> AsyncStepHandler for F
where
    F: FnMut(&mut StepContext) -> Box<dyn StepTask>,
{
    fn start(&mut self, ctx: &mut StepContext) -> Box<dyn StepTask> {
        self(ctx)
    }
}

enum Handler {
    Sync(Box<dyn StepHandler>),
    Async(Box<dyn AsyncStepHandler>),
}

struct DispatchEntry {
    mode: ExecutionMode,
    handler: Handler,
}

// =============================================================================
// Dispatch Table
// =============================================================================

/// Registry of step handlers keyed by lowercase step name.
#[derive(Default)]
pub struct DispatchTable {
    entries: HashMap<String, Vec<DispatchEntry>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous closure handler.
    pub fn register<F>(&mut self, key: &str, mode: ExecutionMode, handler: F)
    where
        F: FnMut(&mut StepContext) + 'static,
    {
        self.push(key, mode, Handler::Sync(Box::new(handler)));
    }

    /// Register a boxed synchronous handler.
    pub fn register_handler(&mut self, key: &str, mode: ExecutionMode, handler: Box<dyn StepHandler>) {
        self.push(key, mode, Handler::Sync(handler));
    }

    /// Register a handler that launches a task.
    pub fn register_async<F>(&mut self, key: &str, mode: ExecutionMode, handler: F)
    where
        F: FnMut(&mut StepContext) -> Box<dyn StepTask> + 'static,
    {
        self.push(key, mode, Handler::Async(Box::new(handler)));
    }

    fn push(&mut self, key: &str, mode: ExecutionMode, handler: Handler) {
        let key = key.to_lowercase();
        trace!(key = %key, %mode, "Handler registered");
        self.entries
            .entry(key)
            .or_default()
            .push(DispatchEntry { mode, handler });
    }

    /// Run every admitted handler registered under `key`.
    ///
    /// Synchronous handlers record into `ctx` before this returns.
    /// Asynchronous handlers have their task spawned on `runner`, bound to
    /// the context's cursor. Returns false if nothing is registered under
    /// `key`.
    pub fn invoke(
        &mut self,
        key: &str,
        skip_batch: bool,
        is_fail: bool,
        ctx: &mut StepContext,
        runner: &mut CooperativeRunner,
    ) -> bool {
        let key = key.to_lowercase();
        let Some(entries) = self.entries.get_mut(&key) else {
            warn!(key = %key, "No handler registered for step");
            return false;
        };

        let mut ran = 0usize;
        for entry in entries.iter_mut() {
            if !entry.mode.admits(skip_batch, is_fail) {
                continue;
            }
            ran += 1;
            match &mut entry.handler {
                Handler::Sync(handler) => handler.execute(ctx),
                Handler::Async(handler) => {
                    let task = handler.start(ctx);
                    runner.spawn(task, ctx.cursor(), key.clone());
                }
            }
        }

        debug!(key = %key, skip_batch, is_fail, ran, "Step dispatched");
        true
    }

    /// Returns true if any handler is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    /// Number of handlers registered under `key`.
    pub fn handler_count(&self, key: &str) -> usize {
        self.entries
            .get(&key.to_lowercase())
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        keys.sort_unstable();
        f.debug_struct("DispatchTable").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Delay;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn logging_handler(log: &Log, label: &'static str) -> impl FnMut(&mut StepContext) + 'static {
        let log = Rc::clone(log);
        move |_ctx: &mut StepContext| log.borrow_mut().push(label)
    }

    fn table_with_all_modes(log: &Log) -> DispatchTable {
        let mut table = DispatchTable::new();
        table.register("step", ExecutionMode::Normal, logging_handler(log, "normal"));
        table.register("step", ExecutionMode::SkipOnly, logging_handler(log, "skip"));
        table.register("step", ExecutionMode::Always, logging_handler(log, "always"));
        table.register("step", ExecutionMode::Fail, logging_handler(log, "fail"));
        table
    }

    fn invoke(table: &mut DispatchTable, key: &str, skip: bool, fail: bool) -> bool {
        let mut ctx = StepContext::new(None, key);
        let mut runner = CooperativeRunner::new();
        table.invoke(key, skip, fail, &mut ctx, &mut runner)
    }

    #[test]
    fn test_open_door_normal_and_skip_only() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        table.register("open_door", ExecutionMode::Normal, logging_handler(&log, "normal"));
        table.register("open_door", ExecutionMode::SkipOnly, logging_handler(&log, "skip"));

        assert!(invoke(&mut table, "open_door", false, false));
        assert_eq!(*log.borrow(), vec!["normal"]);

        log.borrow_mut().clear();
        assert!(invoke(&mut table, "open_door", true, false));
        assert_eq!(*log.borrow(), vec!["skip"]);
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let log: Log = Rc::default();
        let mut table = table_with_all_modes(&log);

        invoke(&mut table, "step", false, false);
        assert_eq!(*log.borrow(), vec!["normal", "always"]);

        log.borrow_mut().clear();
        invoke(&mut table, "step", true, false);
        assert_eq!(*log.borrow(), vec!["skip", "always"]);

        log.borrow_mut().clear();
        invoke(&mut table, "step", false, true);
        assert_eq!(*log.borrow(), vec!["normal", "fail"]);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        table.register("Open_Door", ExecutionMode::Normal, logging_handler(&log, "x"));

        assert!(table.contains("OPEN_DOOR"));
        assert!(invoke(&mut table, "open_DOOR", false, false));
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(table.handler_count("open_door"), 1);
    }

    #[test]
    fn test_missing_key_returns_false() {
        let mut table = DispatchTable::new();
        assert!(!invoke(&mut table, "nothing", false, false));
    }

    #[test]
    fn test_key_with_no_admitted_entry_still_resolves() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        table.register("cleanup", ExecutionMode::Fail, logging_handler(&log, "fail"));
        assert!(invoke(&mut table, "cleanup", false, false));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_async_handler_spawns_task() {
        let mut table = DispatchTable::new();
        table.register_async("brief", ExecutionMode::Normal, |_ctx: &mut StepContext| {
            Box::new(Delay::new(Duration::from_secs(1))) as Box<dyn StepTask>
        });

        let mut ctx = StepContext::new(None, "brief");
        let mut runner = CooperativeRunner::new();
        assert!(table.invoke("brief", false, false, &mut ctx, &mut runner));
        assert_eq!(runner.len(), 1);
        assert!(ctx.commands().is_empty());

        // Skip batches do not start Normal async handlers.
        assert!(table.invoke("brief", true, false, &mut ctx, &mut runner));
        assert_eq!(runner.len(), 1);
    }

    #[test]
    fn test_sync_handlers_record_into_context() {
        let mut table = DispatchTable::new();
        table.register("finish", ExecutionMode::Always, |ctx: &mut StepContext| {
            ctx.mark_success();
            ctx.complete_procedure();
        });
        let mut ctx = StepContext::new(None, "finish");
        let mut runner = CooperativeRunner::new();
        table.invoke("finish", false, false, &mut ctx, &mut runner);
        assert_eq!(ctx.commands().len(), 2);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn mode_strategy() -> impl Strategy<Value = ExecutionMode> {
            prop_oneof![
                Just(ExecutionMode::Normal),
                Just(ExecutionMode::SkipOnly),
                Just(ExecutionMode::Always),
                Just(ExecutionMode::Fail),
            ]
        }

        proptest! {
            /// The exclusion filter reduces to one condition per mode.
            #[test]
            fn test_admits_matches_mode_table(
                mode in mode_strategy(),
                skip in any::<bool>(),
                fail in any::<bool>(),
            ) {
                let expected = match mode {
                    ExecutionMode::Normal => !skip,
                    ExecutionMode::SkipOnly => skip,
                    ExecutionMode::Always => !fail,
                    ExecutionMode::Fail => fail,
                };
                prop_assert_eq!(mode.admits(skip, fail), expected);
            }
        }
    }
}
