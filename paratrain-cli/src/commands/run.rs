//! `run`: fly a scenario headlessly against the simulated scene host.
//!
//! The pilot follows the scenario's regions in file order, spending a fixed
//! dwell time in each, while descending at a constant rate from the start
//! altitude. Every step key gets a `Normal` handler that waits a moment and
//! reports success, plus `SkipOnly` and `Fail` handlers that only log.
//!
//! ```text
//! tokio interval ──tick──> Flight::advance ──> TrainingSession::tick
//!        │                                          │
//!   ctrl-c token                          reports / instructions
//! ```

use std::path::PathBuf;
use std::time::Duration;

use paratrain::procedure::{
    ChannelTelemetry, DispatchTable, ExecutionMode, InstructionBus, InstructionShown,
    StepContext, TimelineReport, DEFAULT_INSTRUCTION_CAPACITY,
};
use paratrain::runtime::{seconds, Delay, StepTask};
use paratrain::session::{SessionConfig, TrainingSession, TrainingSessionBuilder};
use paratrain::streaming::{
    ActorId, RegionId, SimulatedSceneHost, StaticActorDirectory, StreamEvent,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::common;
use crate::error::CliError;

/// Actor id the simulated pilot is registered under.
const PILOT: ActorId = ActorId(1);

/// Arguments for the run command.
pub struct RunArgs {
    pub scenario: PathBuf,
    pub settings: Option<PathBuf>,
    pub log_level: Option<String>,
    /// Timeline to start on. Earlier timelines are skipped.
    pub timeline: usize,
    pub fps: u32,
    /// Stop after this much simulated time.
    pub max_seconds: f32,
    /// How long each step handler takes to report.
    pub step_seconds: f32,
    /// Step keys whose handler finishes without marking success.
    pub fail_steps: Vec<String>,
    pub region_dwell_secs: f32,
    pub start_altitude: f32,
    /// Metres per second.
    pub descent_rate: f32,
    /// Frames the simulated host takes per operation.
    pub host_latency: u32,
    /// Pace frames in wall-clock time instead of running flat out.
    pub realtime: bool,
}

/// Why the frame loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Complete,
    TimeLimit,
    Interrupted,
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    validate_args(&args)?;

    let settings = common::load_settings(args.settings.as_deref())?;
    let _logging = common::init_logging(&settings, args.log_level.as_deref())?;
    let scenario = common::load_scenario(&args.scenario)?;

    println!("Paratrain v{}", paratrain::VERSION);
    println!("==========================================");
    println!();
    println!("Scenario:    {}", args.scenario.display());
    println!("Session:     {}", settings.session_id);
    println!(
        "Timelines:   {} ({} procedures)",
        scenario.timeline_count(),
        scenario.procedure_count()
    );
    println!("Regions:     {}", scenario.region_records().len());
    println!("Frame rate:  {} fps", args.fps);
    println!();

    let route: Vec<RegionId> = scenario
        .region_records()
        .iter()
        .map(|record| RegionId(record.id))
        .collect();
    let regions = scenario.regions(settings.default_unload_delay);
    let dispatch = build_dispatch(&scenario.step_keys(), &args);

    let (telemetry, reports) = ChannelTelemetry::new();
    let instructions = InstructionBus::new(DEFAULT_INSTRUCTION_CAPACITY);
    let shown = instructions.subscribe();

    let session = TrainingSessionBuilder::new(
        SimulatedSceneHost::new(args.host_latency),
        Box::new(scenario),
    )
    .with_config(SessionConfig::from(&settings))
    .with_dispatch(dispatch)
    .with_telemetry(Box::new(telemetry))
    .with_instructions(instructions)
    .with_actors(Box::new(
        StaticActorDirectory::new().with(settings.player_tag.clone(), PILOT),
    ))
    .add_regions(regions)
    .build();

    let mut flight = Flight {
        session,
        route,
        leg: None,
        elapsed: Duration::ZERO,
        dwell: seconds(args.region_dwell_secs),
        start_altitude: args.start_altitude,
        descent_rate: args.descent_rate,
        reports,
        shown,
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        println!();
        println!("Interrupted, stopping after this frame (press again to force)");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| CliError::Runtime(format!("Failed to create runtime: {}", e)))?;

    let frame = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let limit = seconds(args.max_seconds);

    flight.session.set_timeline(args.timeline);
    info!(timeline = args.timeline, "Scenario started");

    let stop = runtime.block_on(drive(&mut flight, frame, limit, args.realtime, token));

    print_summary(&flight, stop);
    Ok(())
}

fn validate_args(args: &RunArgs) -> Result<(), CliError> {
    if args.fps == 0 {
        return Err(CliError::Config("--fps must be at least 1".to_string()));
    }
    let non_negative = [
        ("--seconds", args.max_seconds),
        ("--step-seconds", args.step_seconds),
        ("--region-dwell", args.region_dwell_secs),
        ("--descent-rate", args.descent_rate),
    ];
    for (flag, value) in non_negative {
        if !value.is_finite() || value < 0.0 {
            return Err(CliError::Config(format!(
                "{} must be a non-negative number, got {}",
                flag, value
            )));
        }
    }
    if !args.start_altitude.is_finite() {
        return Err(CliError::Config(
            "--start-altitude must be a finite number".to_string(),
        ));
    }
    Ok(())
}

/// Register demo handlers for every step key in the scenario.
fn build_dispatch(keys: &[String], args: &RunArgs) -> DispatchTable {
    let mut dispatch = DispatchTable::new();
    let step = seconds(args.step_seconds);

    for key in keys {
        let fails = args
            .fail_steps
            .iter()
            .any(|failing| failing.eq_ignore_ascii_case(key));

        dispatch.register_async(
            key,
            ExecutionMode::Normal,
            move |_ctx: &mut StepContext| -> Box<dyn StepTask> {
                if fails {
                    Box::new(Delay::new(step).without_success())
                } else {
                    Box::new(Delay::new(step))
                }
            },
        );
        dispatch.register(key, ExecutionMode::SkipOnly, |ctx: &mut StepContext| {
            println!("  ~ skipped {}", ctx.step());
        });
        dispatch.register(key, ExecutionMode::Fail, |ctx: &mut StepContext| {
            println!("  ! failure handler for {}", ctx.step());
        });
    }

    dispatch
}

// =============================================================================
// Flight
// =============================================================================

/// The simulated pilot and the session it flies.
struct Flight {
    session: TrainingSession<SimulatedSceneHost>,
    route: Vec<RegionId>,
    leg: Option<usize>,
    elapsed: Duration,
    dwell: Duration,
    start_altitude: f32,
    descent_rate: f32,
    reports: mpsc::UnboundedReceiver<TimelineReport>,
    shown: broadcast::Receiver<InstructionShown>,
}

impl Flight {
    fn altitude(&self) -> f32 {
        (self.start_altitude - self.descent_rate * self.elapsed.as_secs_f32()).max(0.0)
    }

    fn advance(&mut self, dt: Duration) -> Vec<StreamEvent> {
        self.elapsed += dt;
        self.session.observe_altitude(self.altitude());
        let events = self.session.tick(dt);
        // After the tick so the registry has bound the pilot.
        self.fly_route();
        events
    }

    fn fly_route(&mut self) {
        if self.route.is_empty() {
            return;
        }
        let leg = if self.dwell.is_zero() {
            self.route.len() - 1
        } else {
            let legs = self.elapsed.as_secs_f64() / self.dwell.as_secs_f64();
            (legs as usize).min(self.route.len() - 1)
        };
        if self.leg == Some(leg) {
            return;
        }

        if let Some(previous) = self.leg {
            self.session.actor_exited(self.route[previous], PILOT);
        }
        if self.session.actor_entered(self.route[leg], PILOT) {
            println!("  > entered {}", self.route[leg]);
        }
        self.leg = Some(leg);
    }

    fn print_outputs(&mut self, events: &[StreamEvent]) {
        for event in events {
            match event {
                StreamEvent::Loaded { target, .. } => println!("  + loaded {}", target),
                StreamEvent::Unloaded { target } => println!("  - unloaded {}", target),
            }
        }

        while let Ok(report) = self.reports.try_recv() {
            let verdict = if report.success { "passed" } else { "FAILED" };
            println!(
                "[{:>7.2}s] timeline '{}' {}",
                self.elapsed.as_secs_f32(),
                report.timeline_id,
                verdict
            );
        }

        loop {
            match self.shown.try_recv() {
                Ok(shown) => {
                    let title = shown
                        .content
                        .as_ref()
                        .map(|content| content.title.as_str())
                        .unwrap_or("(no instruction)");
                    println!(
                        "[{:>7.2}s] {}/{}: {}",
                        self.elapsed.as_secs_f32(),
                        shown.timeline_id,
                        shown.step,
                        title
                    );
                }
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Instruction display fell behind");
                }
                Err(_) => break,
            }
        }
    }
}

async fn drive(
    flight: &mut Flight,
    frame: Duration,
    limit: Duration,
    realtime: bool,
    token: CancellationToken,
) -> Stop {
    let mut interval = tokio::time::interval(frame);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if realtime {
            tokio::select! {
                _ = token.cancelled() => return Stop::Interrupted,
                _ = interval.tick() => {}
            }
        } else if token.is_cancelled() {
            return Stop::Interrupted;
        }

        let events = flight.advance(frame);
        flight.print_outputs(&events);

        if flight.session.is_complete() {
            return Stop::Complete;
        }
        if flight.elapsed >= limit {
            return Stop::TimeLimit;
        }
    }
}

fn print_summary(flight: &Flight, stop: Stop) {
    let session = &flight.session;
    let machine = session.machine();
    let stats = session.scheduler().stats();

    println!();
    match stop {
        Stop::Complete => println!("Scenario complete"),
        Stop::TimeLimit => println!("Time limit reached ({})", machine.phase()),
        Stop::Interrupted => println!("Interrupted ({})", machine.phase()),
    }
    println!("==========================================");
    println!(
        "Simulated:   {:.2}s over {} frames",
        flight.elapsed.as_secs_f32(),
        session.frame()
    );
    println!("Altitude:    {:.1} m", flight.altitude());
    println!("Procedures:  {} executed", machine.executions());
    println!(
        "Streaming:   {} loads, {} unloads, {} refused, {} pairs cancelled",
        stats.loads_issued, stats.unloads_issued, stats.refused, stats.cancelled_pairs
    );

    let mut resident: Vec<&str> = session.scheduler().resident_scenes().collect();
    resident.sort_unstable();
    if resident.is_empty() {
        println!("Resident:    none");
    } else {
        println!("Resident:    {}", resident.join(", "));
    }

    info!(?stop, frames = session.frame(), "Run finished");
}
