//! Streamable regions and their trigger state machine.
//!
//! # State Machine
//!
//! ```text
//! Start --register--> Ready --enter--> Loading --payload--> Loaded
//!                                         ^                  |   ^
//!                                       enter              exit  enter (timer stopped)
//!                                         |                  v   |
//!                                     Unloaded <--timer-- Unloading
//! ```
//!
//! A region has at most one outstanding load and one outstanding unload:
//! entering while `Loading`/`Loaded` and exiting while
//! `Unloading`/`Unloaded` are no-ops.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::host::ScenePayload;
use super::request::{RegionId, StreamTarget};
use super::scheduler::StreamQueue;
use crate::runtime::Countdown;

/// Identifier of something that can enter a region's trigger volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(pub u64);

/// Lifecycle state of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegionState {
    /// Created but not yet registered.
    #[default]
    Start,
    /// Registered and idle.
    Ready,
    /// Load requested, waiting for the payload.
    Loading,
    /// Payload placed.
    Loaded,
    /// Actor left; unload delay running.
    Unloading,
    /// Unload requested; may be re-triggered.
    Unloaded,
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegionState::Start => "start",
            RegionState::Ready => "ready",
            RegionState::Loading => "loading",
            RegionState::Loaded => "loaded",
            RegionState::Unloading => "unloading",
            RegionState::Unloaded => "unloaded",
        };
        f.write_str(name)
    }
}

/// Which actors can activate a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Only the bound player actor.
    #[default]
    PlayerOnly,
    /// Any actor entering the volume.
    AnyCollider,
}

/// A streamable zone whose scene loads when an actor enters it.
#[derive(Debug)]
pub struct Region {
    id: RegionId,
    scene: String,
    policy: ActivationPolicy,
    unload_delay: Duration,
    anchor: [f32; 3],
    state: RegionState,
    payload: Option<ScenePayload>,
    unload_timer: Option<Countdown>,
}

impl Region {
    /// Create an unregistered region.
    pub fn new(
        id: RegionId,
        scene: impl Into<String>,
        policy: ActivationPolicy,
        unload_delay: Duration,
    ) -> Self {
        Self {
            id,
            scene: scene.into(),
            policy,
            unload_delay,
            anchor: [0.0; 3],
            state: RegionState::Start,
            payload: None,
            unload_timer: None,
        }
    }

    /// Set the world position payloads are placed at.
    pub fn with_anchor(mut self, anchor: [f32; 3]) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn scene(&self) -> &str {
        &self.scene
    }

    pub fn policy(&self) -> ActivationPolicy {
        self.policy
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn anchor(&self) -> [f32; 3] {
        self.anchor
    }

    pub fn unload_delay(&self) -> Duration {
        self.unload_delay
    }

    /// The placed payload, while loaded or unloading.
    pub fn payload(&self) -> Option<&ScenePayload> {
        self.payload.as_ref()
    }

    /// The stream target used for this region's requests.
    pub fn target(&self) -> StreamTarget {
        StreamTarget::region(self.id, self.scene.clone())
    }

    pub(crate) fn mark_registered(&mut self) {
        if self.state == RegionState::Start {
            self.state = RegionState::Ready;
        }
    }

    fn qualifies(&self, actor: ActorId, player: Option<ActorId>) -> bool {
        match self.policy {
            ActivationPolicy::AnyCollider => true,
            ActivationPolicy::PlayerOnly => player == Some(actor),
        }
    }

    /// Handle an actor entering the trigger volume.
    ///
    /// Returns true if the region changed state.
    pub fn on_enter(
        &mut self,
        actor: ActorId,
        player: Option<ActorId>,
        queue: &mut dyn StreamQueue,
    ) -> bool {
        match self.state {
            RegionState::Start | RegionState::Loading | RegionState::Loaded => return false,
            RegionState::Ready | RegionState::Unloading | RegionState::Unloaded => {}
        }
        if !self.qualifies(actor, player) {
            debug!(region = %self.id, actor = actor.0, "Actor does not qualify for region");
            return false;
        }

        if self.state == RegionState::Unloading {
            // Still holding the payload; stop the pending unload.
            self.unload_timer = None;
            self.state = RegionState::Loaded;
            debug!(region = %self.id, "Re-entered region, unload cancelled");
            return true;
        }

        self.state = RegionState::Loading;
        info!(region = %self.id, scene = %self.scene, "Region triggered, requesting load");
        queue.request_load(self.target());
        true
    }

    /// Handle an actor leaving the trigger volume.
    ///
    /// Returns true if the unload delay was started.
    pub fn on_exit(&mut self, actor: ActorId, player: Option<ActorId>) -> bool {
        match self.state {
            RegionState::Unloading | RegionState::Unloaded => return false,
            _ => {}
        }
        if !self.qualifies(actor, player) || self.payload.is_none() {
            return false;
        }

        self.state = RegionState::Unloading;
        self.unload_timer = Some(Countdown::new(self.unload_delay));
        debug!(
            region = %self.id,
            delay_ms = self.unload_delay.as_millis() as u64,
            "Region exited, unload delay started"
        );
        true
    }

    /// Advance the unload delay; issues the unload request on expiry.
    pub fn tick(&mut self, dt: Duration, queue: &mut dyn StreamQueue) {
        if self.state != RegionState::Unloading {
            return;
        }
        let expired = self
            .unload_timer
            .as_mut()
            .map(|timer| timer.advance(dt))
            .unwrap_or(true);
        if !expired {
            return;
        }

        self.unload_timer = None;
        self.payload = None;
        self.state = RegionState::Unloaded;
        info!(region = %self.id, scene = %self.scene, "Unload delay expired, requesting unload");
        queue.request_unload(self.target());
    }

    /// Claim a freshly loaded payload, placing it at the region's anchor.
    ///
    /// Only accepted while `Loading`; returns false otherwise.
    pub fn set_payload(&mut self, mut payload: ScenePayload) -> bool {
        if self.state != RegionState::Loading {
            return false;
        }
        payload.position = Some(self.anchor);
        self.payload = Some(payload);
        self.state = RegionState::Loaded;
        debug!(region = %self.id, "Region payload placed");
        true
    }
}
