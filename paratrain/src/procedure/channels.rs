//! Outbound notification channels.
//!
//! Two fire-and-forget outputs leave the state machine:
//!
//! - timeline completion reports, for the instructor/telemetry side
//! - "instruction shown" broadcasts, for any number of UI listeners
//!
//! Neither waits for a receiver. A send with nobody listening is dropped.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, trace};

use super::model::InstructionContent;

// =============================================================================
// Telemetry
// =============================================================================

/// Result of one completed timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineReport {
    pub session_id: String,
    pub timeline_id: String,
    pub success: bool,
}

/// Receives timeline completion reports.
pub trait TelemetrySink {
    fn report_timeline_complete(&self, session_id: &str, timeline_id: &str, success: bool);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn report_timeline_complete(&self, session_id: &str, timeline_id: &str, success: bool) {
        info!(session_id, timeline_id, success, "Timeline complete");
    }
}

/// Sink that forwards reports on an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTelemetry {
    tx: mpsc::UnboundedSender<TimelineReport>,
}

impl ChannelTelemetry {
    /// Create the sink and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimelineReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn report_timeline_complete(&self, session_id: &str, timeline_id: &str, success: bool) {
        let report = TimelineReport {
            session_id: session_id.to_string(),
            timeline_id: timeline_id.to_string(),
            success,
        };
        if self.tx.send(report).is_err() {
            trace!(timeline_id, "Telemetry receiver dropped, report discarded");
        }
    }
}

// =============================================================================
// Instruction UI
// =============================================================================

/// Default capacity of the instruction broadcast channel.
pub const DEFAULT_INSTRUCTION_CAPACITY: usize = 32;

/// Notification that a procedure's instructions should be displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionShown {
    pub timeline_id: String,
    pub step: String,
    pub procedure: usize,
    /// Resolved content, if the procedure references any.
    pub content: Option<InstructionContent>,
}

/// Broadcasts [`InstructionShown`] to every subscriber.
#[derive(Debug, Clone)]
pub struct InstructionBus {
    tx: broadcast::Sender<InstructionShown>,
}

impl InstructionBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Add a listener. Only notifications sent after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<InstructionShown> {
        self.tx.subscribe()
    }

    /// Send to all current listeners.
    ///
    /// Returns the number of listeners reached (zero when nobody listens).
    pub fn publish(&self, shown: InstructionShown) -> usize {
        match self.tx.send(shown) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No instruction listeners");
                0
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InstructionBus {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTION_CAPACITY)
    }
}
