//! Paratrain command line.
//!
//! ```text
//! paratrain validate --scenario demos/scenario.json
//! paratrain run --scenario demos/scenario.json --timeline 1 --realtime
//! ```

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::run::RunArgs;
use commands::validate::ValidateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "paratrain")]
#[command(version, about = "Paraglider training scenarios with region streaming", long_about = None)]
struct Cli {
    /// Log level filter (overrides the settings file and RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a scenario file and print its timelines and regions
    Validate {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: PathBuf,
    },

    /// Fly a scenario against the simulated scene host
    Run {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Settings INI file (default: <config dir>/paratrain/settings.ini)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Timeline to start on; earlier timelines are skipped
        #[arg(short, long, default_value_t = 0)]
        timeline: usize,

        /// Simulation frame rate
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Stop after this many simulated seconds
        #[arg(long = "seconds", default_value_t = 600.0)]
        max_seconds: f32,

        /// Seconds each step takes before reporting
        #[arg(long, default_value_t = 1.0)]
        step_seconds: f32,

        /// Step key that finishes without success (repeatable)
        #[arg(long = "fail", value_name = "STEP")]
        fail_steps: Vec<String>,

        /// Seconds spent in each region along the route
        #[arg(long = "region-dwell", default_value_t = 10.0)]
        region_dwell_secs: f32,

        /// Starting altitude in metres
        #[arg(long, default_value_t = 300.0)]
        start_altitude: f32,

        /// Descent rate in metres per second
        #[arg(long, default_value_t = 1.5)]
        descent_rate: f32,

        /// Frames the simulated host takes per load or unload
        #[arg(long, default_value_t = 3)]
        host_latency: u32,

        /// Pace frames in wall-clock time
        #[arg(long)]
        realtime: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { scenario } => commands::validate::run(ValidateArgs {
            scenario,
            log_level: cli.log_level,
        }),
        Commands::Run {
            scenario,
            settings,
            timeline,
            fps,
            max_seconds,
            step_seconds,
            fail_steps,
            region_dwell_secs,
            start_altitude,
            descent_rate,
            host_latency,
            realtime,
        } => commands::run::run(RunArgs {
            scenario,
            settings,
            log_level: cli.log_level,
            timeline,
            fps,
            max_seconds,
            step_seconds,
            fail_steps,
            region_dwell_secs,
            start_altitude,
            descent_rate,
            host_latency,
            realtime,
        }),
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(e.exit_code());
    }
}

fn report(error: &CliError) {
    eprintln!("Error: {}", error);
}
