//! `validate`: load a scenario and print what it contains.

use std::path::PathBuf;

use paratrain::procedure::{ScenarioSource, TriggerCondition};

use super::common;
use crate::error::CliError;

/// Arguments for the validate command.
pub struct ValidateArgs {
    pub scenario: PathBuf,
    pub log_level: Option<String>,
}

/// Run the validate command.
pub fn run(args: ValidateArgs) -> Result<(), CliError> {
    let settings = common::load_settings(None)?;
    let _logging = common::init_logging(&settings, args.log_level.as_deref())?;
    let scenario = common::load_scenario(&args.scenario)?;

    println!("Scenario: {}", args.scenario.display());
    println!("==========================================");
    println!();

    let mut missing_instructions = 0usize;
    for timeline in scenario.timelines() {
        println!("[{}] {} ({})", timeline.order, timeline.name, timeline.id);
        for (index, procedure) in scenario.procedures_of(&timeline.id).iter().enumerate() {
            let trigger = match procedure.condition {
                TriggerCondition::None => String::new(),
                TriggerCondition::Time => format!("  after {:.1}s", procedure.parameter),
                TriggerCondition::Alt => format!("  at {:.1} m", procedure.parameter),
            };
            let instruction = match &procedure.instruction {
                Some(id) if scenario.instruction_content(id).is_none() => {
                    missing_instructions += 1;
                    format!("  instruction '{}' (missing)", id)
                }
                Some(id) => format!("  instruction '{}'", id),
                None => String::new(),
            };
            println!("    {:>2}. {}{}{}", index, procedure.key(), trigger, instruction);
        }
    }

    println!();
    println!("Regions:");
    for region in scenario.region_records() {
        let delay = region
            .unload_delay_secs
            .map(|secs| format!("{:.1}s", secs))
            .unwrap_or_else(|| "default".to_string());
        println!(
            "    {:>3}  {:<24} {:?}  unload delay {}",
            region.id, region.scene, region.policy, delay
        );
    }

    println!();
    println!(
        "{} timelines, {} procedures, {} step keys, {} instructions, {} regions",
        scenario.timeline_count(),
        scenario.procedure_count(),
        scenario.step_keys().len(),
        scenario.instruction_count(),
        scenario.region_records().len()
    );
    if missing_instructions > 0 {
        println!(
            "Warning: {} procedures reference unknown instructions",
            missing_instructions
        );
    }

    Ok(())
}
