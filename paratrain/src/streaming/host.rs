//! Scene host interface and a deterministic in-memory host.
//!
//! The [`SceneHost`] is the engine-level primitive the scheduler drives:
//! start an additive load by name, start an unload by handle, and poll an
//! operation until it completes. A host may refuse an operation by returning
//! `None` (for example a duplicate load); the scheduler treats that as
//! already satisfied.
//!
//! [`SimulatedSceneHost`] completes operations after a fixed number of
//! polls. It backs the tests and the CLI driver.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, trace, warn};

// =============================================================================
// Handles and Payloads
// =============================================================================

/// Handle to a scene resident in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneHandle(pub u64);

/// Handle to an asynchronous load or unload operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub u64);

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// A loaded scene as seen by the streaming layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePayload {
    /// Host handle used to unload the scene.
    pub handle: SceneHandle,

    /// Name of the scene the payload came from.
    ///
    /// The registry matches this against region scene names.
    pub origin: String,

    /// World position the payload was placed at, once a region claimed it.
    pub position: Option<[f32; 3]>,
}

impl ScenePayload {
    /// Create an unplaced payload.
    pub fn new(handle: SceneHandle, origin: impl Into<String>) -> Self {
        Self {
            handle,
            origin: origin.into(),
            position: None,
        }
    }
}

/// Progress of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    /// Still running.
    Pending,
    /// A load finished; the scene is resident.
    Loaded(ScenePayload),
    /// An unload finished.
    Unloaded,
    /// The host does not know this operation.
    Missing,
}

// =============================================================================
// Scene Host Trait
// =============================================================================

/// Engine-level scene loading primitive.
pub trait SceneHost {
    /// Start loading `scene` additively.
    ///
    /// Returns `None` when the host declines to schedule the load.
    fn load_additive(&mut self, scene: &str) -> Option<OperationHandle>;

    /// Start unloading a resident scene.
    ///
    /// Returns `None` when the host declines (for example the scene is not
    /// resident).
    fn unload(&mut self, scene: &SceneHandle) -> Option<OperationHandle>;

    /// Poll an operation. Called at most once per scheduler tick.
    fn poll_operation(&mut self, op: OperationHandle) -> OperationStatus;
}

// =============================================================================
// Simulated Host
// =============================================================================

/// Default number of polls before a simulated operation completes.
pub const DEFAULT_SIMULATED_LATENCY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimulatedKind {
    Load,
    Unload,
}

#[derive(Debug)]
struct SimulatedOperation {
    kind: SimulatedKind,
    scene: String,
    remaining: u32,
}

/// In-memory scene host with deterministic latency.
///
/// - Loads of scenes already resident or loading are refused.
/// - Operations on scenes listed with [`stall`](Self::stall) never finish.
/// - Every accepted call is recorded for inspection.
#[derive(Debug)]
pub struct SimulatedSceneHost {
    latency: u32,
    next_operation: u64,
    next_scene: u64,
    operations: HashMap<OperationHandle, SimulatedOperation>,
    resident: HashMap<String, SceneHandle>,
    loading: HashSet<String>,
    stalled: HashSet<String>,
    load_calls: Vec<String>,
    unload_calls: Vec<String>,
}

impl SimulatedSceneHost {
    /// Create a host whose operations finish after `latency` pending polls.
    pub fn new(latency: u32) -> Self {
        Self {
            latency,
            next_operation: 1,
            next_scene: 1,
            operations: HashMap::new(),
            resident: HashMap::new(),
            loading: HashSet::new(),
            stalled: HashSet::new(),
            load_calls: Vec::new(),
            unload_calls: Vec::new(),
        }
    }

    /// Make every operation on `scene` hang forever.
    pub fn stall(&mut self, scene: impl Into<String>) {
        self.stalled.insert(scene.into());
    }

    /// Returns true if the host currently holds `scene`.
    pub fn is_resident(&self, scene: &str) -> bool {
        self.resident.contains_key(scene)
    }

    /// Number of scenes currently resident.
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Scenes for which a load was accepted, in call order.
    pub fn load_calls(&self) -> &[String] {
        &self.load_calls
    }

    /// Scenes for which an unload was accepted, in call order.
    pub fn unload_calls(&self) -> &[String] {
        &self.unload_calls
    }

    /// Total accepted operations.
    pub fn operations_started(&self) -> usize {
        self.load_calls.len() + self.unload_calls.len()
    }

    fn allocate_operation(&mut self, kind: SimulatedKind, scene: &str) -> OperationHandle {
        let op = OperationHandle(self.next_operation);
        self.next_operation += 1;
        self.operations.insert(
            op,
            SimulatedOperation {
                kind,
                scene: scene.to_string(),
                remaining: self.latency,
            },
        );
        op
    }
}

impl Default for SimulatedSceneHost {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATED_LATENCY)
    }
}

impl SceneHost for SimulatedSceneHost {
    fn load_additive(&mut self, scene: &str) -> Option<OperationHandle> {
        if self.resident.contains_key(scene) || self.loading.contains(scene) {
            debug!(scene, "Simulated host refused duplicate load");
            return None;
        }
        self.loading.insert(scene.to_string());
        self.load_calls.push(scene.to_string());
        Some(self.allocate_operation(SimulatedKind::Load, scene))
    }

    fn unload(&mut self, handle: &SceneHandle) -> Option<OperationHandle> {
        let scene = self
            .resident
            .iter()
            .find(|(_, h)| *h == handle)
            .map(|(name, _)| name.clone())?;
        self.resident.remove(&scene);
        self.unload_calls.push(scene.clone());
        Some(self.allocate_operation(SimulatedKind::Unload, &scene))
    }

    fn poll_operation(&mut self, op: OperationHandle) -> OperationStatus {
        let Some(operation) = self.operations.get_mut(&op) else {
            warn!(%op, "Simulated host polled for unknown operation");
            return OperationStatus::Missing;
        };

        if self.stalled.contains(&operation.scene) {
            return OperationStatus::Pending;
        }
        if operation.remaining > 0 {
            operation.remaining -= 1;
            trace!(%op, remaining = operation.remaining, "Operation pending");
            return OperationStatus::Pending;
        }

        let Some(operation) = self.operations.remove(&op) else {
            return OperationStatus::Missing;
        };
        match operation.kind {
            SimulatedKind::Load => {
                self.loading.remove(&operation.scene);
                let handle = SceneHandle(self.next_scene);
                self.next_scene += 1;
                self.resident.insert(operation.scene.clone(), handle);
                OperationStatus::Loaded(ScenePayload::new(handle, operation.scene))
            }
            SimulatedKind::Unload => OperationStatus::Unloaded,
        }
    }
}
