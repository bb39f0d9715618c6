//! Region streaming.
//!
//! Trigger-volume regions request their payload scene when the player
//! enters and release it a while after the player leaves. All load and
//! unload traffic flows through a single [`LoadScheduler`], which
//! serialises host operations, pairs off contradicting requests, and only
//! publishes a scene once it has settled.
//!
//! ```text
//! Region ──request──> LoadScheduler ──load/unload──> SceneHost
//!   ^                       │
//!   └──resolve_payload── StreamEvent
//! ```

mod host;
mod region;
mod registry;
mod request;
mod scheduler;

pub use host::{
    OperationHandle, OperationStatus, SceneHandle, SceneHost, ScenePayload, SimulatedSceneHost,
    DEFAULT_SIMULATED_LATENCY,
};
pub use region::{ActivationPolicy, ActorId, Region, RegionState};
pub use registry::{ActorDirectory, RegionRegistry, StaticActorDirectory, DEFAULT_PLAYER_TAG};
pub use request::{RegionId, StreamEvent, StreamRequest, StreamTarget};
pub use scheduler::{
    DrainPhase, LoadScheduler, SchedulerConfig, SchedulerStats, StreamQueue,
    DEFAULT_SETTLE_FRAMES,
};
