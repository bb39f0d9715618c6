//! Region registry.
//!
//! Owns every [`Region`], binds the player actor lazily, routes freshly
//! loaded payloads to the region that asked for them, and advances region
//! unload delays.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::host::ScenePayload;
use super::region::{ActorId, Region, RegionState};
use super::request::{RegionId, StreamTarget};
use super::scheduler::StreamQueue;

/// Tag used to find the player actor.
pub const DEFAULT_PLAYER_TAG: &str = "Player";

// =============================================================================
// Actor Lookup
// =============================================================================

/// Looks up actors by tag.
pub trait ActorDirectory {
    /// Find the actor carrying `tag`, if it exists yet.
    fn find_by_tag(&self, tag: &str) -> Option<ActorId>;
}

/// Fixed tag-to-actor table.
#[derive(Debug, Clone, Default)]
pub struct StaticActorDirectory {
    actors: HashMap<String, ActorId>,
}

impl StaticActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag an actor, replacing any previous actor with the same tag.
    pub fn insert(&mut self, tag: impl Into<String>, actor: ActorId) {
        self.actors.insert(tag.into(), actor);
    }

    pub fn with(mut self, tag: impl Into<String>, actor: ActorId) -> Self {
        self.insert(tag, actor);
        self
    }
}

impl ActorDirectory for StaticActorDirectory {
    fn find_by_tag(&self, tag: &str) -> Option<ActorId> {
        self.actors.get(tag).copied()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Collection of streamable regions.
#[derive(Debug)]
pub struct RegionRegistry {
    regions: Vec<Region>,
    player: Option<ActorId>,
    player_tag: String,
}

impl RegionRegistry {
    /// Create an empty registry that binds the actor tagged `player_tag`.
    pub fn new(player_tag: impl Into<String>) -> Self {
        Self {
            regions: Vec::new(),
            player: None,
            player_tag: player_tag.into(),
        }
    }

    /// Register a region. Registering an id twice is a no-op.
    ///
    /// Returns true if the region was added.
    pub fn register(&mut self, mut region: Region) -> bool {
        if self.regions.iter().any(|r| r.id() == region.id()) {
            debug!(region = %region.id(), "Region already registered");
            return false;
        }
        region.mark_registered();
        debug!(region = %region.id(), scene = region.scene(), "Region registered");
        self.regions.push(region);
        true
    }

    /// Hand a loaded payload to the region waiting for it.
    ///
    /// The first region in `Loading` whose scene matches the payload origin
    /// claims it. Unclaimed payloads are orphans and are unloaded again.
    pub fn resolve_payload(
        &mut self,
        payload: ScenePayload,
        queue: &mut dyn StreamQueue,
    ) -> Option<RegionId> {
        let origin = payload.origin.clone();
        let waiting = self
            .regions
            .iter_mut()
            .find(|r| r.scene() == origin && r.state() == RegionState::Loading);

        match waiting {
            Some(region) => {
                let id = region.id();
                region.set_payload(payload);
                Some(id)
            }
            None => {
                warn!(scene = %origin, "Loaded payload has no waiting region, unloading");
                queue.request_unload(StreamTarget::Scene(origin));
                None
            }
        }
    }

    /// Bind the player if needed, then advance every region.
    pub fn tick(&mut self, dt: Duration, actors: &dyn ActorDirectory, queue: &mut dyn StreamQueue) {
        if self.player.is_none() {
            self.player = actors.find_by_tag(&self.player_tag);
            if let Some(player) = self.player {
                info!(actor = player.0, tag = %self.player_tag, "Player bound");
            }
        }

        for region in &mut self.regions {
            region.tick(dt, queue);
        }
    }

    /// Forward a trigger-enter to region `id`.
    pub fn on_enter(&mut self, id: RegionId, actor: ActorId, queue: &mut dyn StreamQueue) -> bool {
        let player = self.player;
        match self.region_mut(id) {
            Some(region) => region.on_enter(actor, player, queue),
            None => {
                debug!(region = %id, "Enter for unknown region");
                false
            }
        }
    }

    /// Forward a trigger-exit to region `id`.
    pub fn on_exit(&mut self, id: RegionId, actor: ActorId) -> bool {
        let player = self.player;
        match self.region_mut(id) {
            Some(region) => region.on_exit(actor, player),
            None => {
                debug!(region = %id, "Exit for unknown region");
                false
            }
        }
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id() == id)
    }

    fn region_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.id() == id)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The bound player, once found.
    pub fn player(&self) -> Option<ActorId> {
        self.player
    }

    pub fn player_tag(&self) -> &str {
        &self.player_tag
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER_TAG)
    }
}
