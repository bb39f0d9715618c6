//! Stream targets, requests, and completion events.
//!
//! A [`StreamTarget`] names what should be loaded or unloaded. All three
//! variants resolve to a single scene identifier, which is what the
//! scheduler uses for cancel-pairing and residency tracking.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::host::ScenePayload;

/// Identifier of a streamable region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// What a load or unload request refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    /// A plain scene requested by name (typically from a step handler).
    Scene(String),

    /// The payload scene of a streamable region.
    Region {
        /// Region that owns the request.
        region: RegionId,
        /// Scene streamed in for the region.
        scene: String,
    },

    /// One piece of a terrain scene that was split into segments.
    ///
    /// Segment scenes are named `{parent}_seg{index}`.
    Segment {
        /// Name of the scene the segment was split from.
        parent: String,
        /// Segment index within the parent.
        index: u32,
    },
}

impl StreamTarget {
    /// Plain scene target.
    pub fn scene(name: impl Into<String>) -> Self {
        Self::Scene(name.into())
    }

    /// Region payload target.
    pub fn region(region: RegionId, scene: impl Into<String>) -> Self {
        Self::Region {
            region,
            scene: scene.into(),
        }
    }

    /// Split-segment target.
    pub fn segment(parent: impl Into<String>, index: u32) -> Self {
        Self::Segment {
            parent: parent.into(),
            index,
        }
    }

    /// The scene identifier the host loads or unloads for this target.
    pub fn identifier(&self) -> String {
        match self {
            Self::Scene(name) => name.clone(),
            Self::Region { scene, .. } => scene.clone(),
            Self::Segment { parent, index } => format!("{}_seg{}", parent, index),
        }
    }

    /// Whether a loaded payload for this target is claimed through the
    /// region registry.
    ///
    /// Only region payloads are. Plain scenes and segments are loaded for
    /// step handlers and never claimed by a region, so they must not be
    /// treated as orphans.
    pub fn routes_to_registry(&self) -> bool {
        matches!(self, Self::Region { .. })
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scene(name) => write!(f, "scene:{}", name),
            Self::Region { region, scene } => write!(f, "{}:{}", region, scene),
            Self::Segment { parent, index } => write!(f, "segment:{}#{}", parent, index),
        }
    }
}

/// A load or unload intent, as produced by step handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    /// Bring the target's scene in.
    Load(StreamTarget),
    /// Take the target's scene out.
    Unload(StreamTarget),
}

impl StreamRequest {
    /// The target of this request.
    pub fn target(&self) -> &StreamTarget {
        match self {
            Self::Load(target) | Self::Unload(target) => target,
        }
    }
}

/// Completion notification published by the scheduler.
///
/// Events are only published after the settling delay, so consumers always
/// observe fully committed scenes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The target's scene is resident.
    Loaded {
        /// The request that was satisfied.
        target: StreamTarget,
        /// The resident payload.
        payload: ScenePayload,
    },

    /// The target's scene was removed.
    Unloaded {
        /// The request that was satisfied.
        target: StreamTarget,
    },
}

impl StreamEvent {
    /// The target this event answers.
    pub fn target(&self) -> &StreamTarget {
        match self {
            Self::Loaded { target, .. } | Self::Unloaded { target } => target,
        }
    }

    /// Returns true if this event reports `scene` as loaded.
    pub fn is_loaded(&self, scene: &str) -> bool {
        matches!(self, Self::Loaded { target, .. } if target.identifier() == scene)
    }
}
