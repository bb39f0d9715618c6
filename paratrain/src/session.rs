//! Training session orchestrator.
//!
//! A [`TrainingSession`] owns one of everything (state machine, load
//! scheduler, region registry) and advances them together once per frame:
//!
//! ```text
//! tick(dt)
//!   1. registry.tick      bind player, run region unload delays
//!   2. scheduler.tick     settle operations, service one queue entry
//!   3. route events       region payloads -> registry.resolve_payload
//!   4. machine.tick       skip routine, triggers, tasks, handler commands
//!   5. forward requests   handler loads/unloads -> scheduler
//! ```
//!
//! # Example
//!
//! ```ignore
//! let scenario = ScenarioConfig::load(path)?;
//! let regions = scenario.regions(settings.default_unload_delay);
//! let mut session = TrainingSessionBuilder::new(SimulatedSceneHost::default(), Box::new(scenario))
//!     .with_config(SessionConfig::from(&settings))
//!     .with_dispatch(table)
//!     .add_regions(regions)
//!     .build();
//!
//! session.set_timeline(0);
//! loop {
//!     session.tick(frame_dt);
//! }
//! ```

use std::time::Duration;

use tracing::{debug, info, trace};

use crate::config::Settings;
use crate::procedure::{
    AltitudeGate, DispatchTable, InstructionBus, MachineConfig, ScenarioSource, TelemetrySink,
    TracingTelemetry, TrainingStateMachine,
};
use crate::streaming::{
    ActorDirectory, ActorId, LoadScheduler, Region, RegionId, RegionRegistry, SceneHost,
    SchedulerConfig, StaticActorDirectory, StreamEvent, StreamQueue, DEFAULT_PLAYER_TAG,
};

// =============================================================================
// Configuration
// =============================================================================

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub machine: MachineConfig,
    pub scheduler: SchedulerConfig,
    /// Tag the registry looks up to bind the player.
    pub player_tag: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            machine: MachineConfig::default(),
            scheduler: SchedulerConfig::default(),
            player_tag: DEFAULT_PLAYER_TAG.to_string(),
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            machine: settings.machine_config(),
            scheduler: settings.scheduler_config(),
            player_tag: settings.player_tag.clone(),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`TrainingSession`].
pub struct TrainingSessionBuilder<H: SceneHost> {
    host: H,
    scenario: Box<dyn ScenarioSource>,
    config: SessionConfig,
    dispatch: DispatchTable,
    telemetry: Box<dyn TelemetrySink>,
    instructions: InstructionBus,
    actors: Box<dyn ActorDirectory>,
    altitude: AltitudeGate,
    regions: Vec<Region>,
}

impl<H: SceneHost> TrainingSessionBuilder<H> {
    /// Start a builder with defaults for everything but the host and data.
    pub fn new(host: H, scenario: Box<dyn ScenarioSource>) -> Self {
        Self {
            host,
            scenario,
            config: SessionConfig::default(),
            dispatch: DispatchTable::new(),
            telemetry: Box::new(TracingTelemetry),
            instructions: InstructionBus::default(),
            actors: Box::new(StaticActorDirectory::new()),
            altitude: AltitudeGate::new(),
            regions: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchTable) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_instructions(mut self, instructions: InstructionBus) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_actors(mut self, actors: Box<dyn ActorDirectory>) -> Self {
        self.actors = actors;
        self
    }

    /// Use an existing gate, e.g. one already fed by a sensor.
    pub fn with_altitude(mut self, altitude: AltitudeGate) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn add_region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    pub fn add_regions(mut self, regions: impl IntoIterator<Item = Region>) -> Self {
        self.regions.extend(regions);
        self
    }

    pub fn build(self) -> TrainingSession<H> {
        let mut registry = RegionRegistry::new(self.config.player_tag.clone());
        for region in self.regions {
            registry.register(region);
        }

        let machine = TrainingStateMachine::new(
            self.config.machine,
            self.scenario,
            self.dispatch,
            self.telemetry,
            self.instructions,
            Box::new(self.altitude.clone()),
        );

        info!(regions = registry.len(), "Training session built");

        TrainingSession {
            machine,
            scheduler: LoadScheduler::new(self.host, self.config.scheduler),
            registry,
            actors: self.actors,
            altitude: self.altitude,
            frame: 0,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// One running training scenario with its streaming world.
pub struct TrainingSession<H: SceneHost> {
    machine: TrainingStateMachine,
    scheduler: LoadScheduler<H>,
    registry: RegionRegistry,
    actors: Box<dyn ActorDirectory>,
    altitude: AltitudeGate,
    frame: u64,
}

impl<H: SceneHost> TrainingSession<H> {
    /// Advance everything by one frame.
    ///
    /// Returns the stream events published this frame.
    pub fn tick(&mut self, dt: Duration) -> Vec<StreamEvent> {
        self.registry
            .tick(dt, self.actors.as_ref(), &mut self.scheduler);

        self.scheduler.tick();
        let events = self.scheduler.take_events();

        for event in &events {
            if let StreamEvent::Loaded { target, payload } = event {
                if target.routes_to_registry() {
                    self.registry
                        .resolve_payload(payload.clone(), &mut self.scheduler);
                }
            }
        }

        self.machine.tick(dt, &events);
        self.forward_requests();

        self.frame += 1;
        if !events.is_empty() {
            trace!(frame = self.frame, events = events.len(), "Stream events");
        }
        events
    }

    fn forward_requests(&mut self) {
        for request in self.machine.take_stream_requests() {
            debug!(?request, "Forwarding handler stream request");
            self.scheduler.submit(request);
        }
    }

    /// Select a timeline (see [`TrainingStateMachine::set_timeline`]).
    pub fn set_timeline(&mut self, order: usize) {
        self.machine.set_timeline(order);
        self.forward_requests();
    }

    /// Mark the current procedure successful.
    pub fn on_success(&mut self) {
        self.machine.on_success();
    }

    /// Complete the current procedure from host code.
    pub fn on_procedure_complete(&mut self) -> bool {
        let completed = self.machine.on_procedure_complete();
        self.forward_requests();
        completed
    }

    /// An actor entered a region's trigger volume.
    pub fn actor_entered(&mut self, region: RegionId, actor: ActorId) -> bool {
        self.registry.on_enter(region, actor, &mut self.scheduler)
    }

    /// An actor left a region's trigger volume.
    pub fn actor_exited(&mut self, region: RegionId, actor: ActorId) -> bool {
        self.registry.on_exit(region, actor)
    }

    /// Feed an altitude sample to the `Alt` trigger gate.
    pub fn observe_altitude(&self, altitude: f32) {
        self.altitude.observe(altitude);
    }

    /// Return the scenario to idle.
    ///
    /// Streaming state is kept: resident scenes stay resident and regions
    /// keep their state.
    pub fn reset(&mut self) {
        self.machine.reset();
        info!(frame = self.frame, "Session reset");
    }

    pub fn machine(&self) -> &TrainingStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut TrainingStateMachine {
        &mut self.machine
    }

    pub fn scheduler(&self) -> &LoadScheduler<H> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut LoadScheduler<H> {
        &mut self.scheduler
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    /// Shared handle to the altitude gate.
    pub fn altitude(&self) -> AltitudeGate {
        self.altitude.clone()
    }

    /// Frames ticked so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Returns true once the last timeline has completed.
    pub fn is_complete(&self) -> bool {
        self.machine.is_complete()
    }
}

impl<H: SceneHost> std::fmt::Debug for TrainingSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingSession")
            .field("frame", &self.frame)
            .field("machine", &self.machine)
            .field("scheduler", &self.scheduler)
            .field("regions", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use crate::streaming::{ActivationPolicy, RegionState, SimulatedSceneHost};

    const FRAME: Duration = Duration::from_millis(100);
    const PLAYER: ActorId = ActorId(1);

    fn session_with_region(delay: Duration) -> TrainingSession<SimulatedSceneHost> {
        let scenario = ScenarioConfig::from_json(r#"{ "timelines": [] }"#).unwrap();
        TrainingSessionBuilder::new(SimulatedSceneHost::new(1), Box::new(scenario))
            .with_actors(Box::new(
                StaticActorDirectory::new().with(DEFAULT_PLAYER_TAG, PLAYER),
            ))
            .add_region(Region::new(
                RegionId(1),
                "valley",
                ActivationPolicy::PlayerOnly,
                delay,
            ))
            .build()
    }

    fn tick_until(
        session: &mut TrainingSession<SimulatedSceneHost>,
        mut done: impl FnMut(&TrainingSession<SimulatedSceneHost>) -> bool,
    ) {
        for _ in 0..100 {
            session.tick(FRAME);
            if done(&*session) {
                return;
            }
        }
        panic!("condition never reached: {:?}", session);
    }

    fn region_state(session: &TrainingSession<SimulatedSceneHost>) -> RegionState {
        session.registry().region(RegionId(1)).unwrap().state()
    }

    #[test]
    fn test_region_round_trip_through_scheduler() {
        let mut session = session_with_region(Duration::from_millis(500));
        session.tick(FRAME); // binds player

        assert!(session.actor_entered(RegionId(1), PLAYER));
        tick_until(&mut session, |s| region_state(s) == RegionState::Loaded);
        assert!(session.scheduler().is_resident("valley"));

        assert!(session.actor_exited(RegionId(1), PLAYER));
        tick_until(&mut session, |s| region_state(s) == RegionState::Unloaded);
        tick_until(&mut session, |s| s.scheduler().is_idle());
        assert!(!session.scheduler().host().is_resident("valley"));
    }

    #[test]
    fn test_quick_exit_and_reenter_keeps_payload() {
        let mut session = session_with_region(Duration::from_secs(2));
        session.tick(FRAME);
        session.actor_entered(RegionId(1), PLAYER);
        tick_until(&mut session, |s| region_state(s) == RegionState::Loaded);

        session.actor_exited(RegionId(1), PLAYER);
        session.tick(FRAME);
        assert_eq!(region_state(&session), RegionState::Unloading);
        session.actor_entered(RegionId(1), PLAYER);
        assert_eq!(region_state(&session), RegionState::Loaded);

        for _ in 0..40 {
            session.tick(FRAME);
        }
        assert_eq!(region_state(&session), RegionState::Loaded);
        assert!(session.scheduler().host().unload_calls().is_empty());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            player_tag: "Pilot".to_string(),
            settle_frames: 0,
            ..Settings::default()
        };
        let config = SessionConfig::from(&settings);
        assert_eq!(config.player_tag, "Pilot");
        assert_eq!(config.scheduler.settle_frames, 0);
    }
}
