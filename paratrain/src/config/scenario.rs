//! Scenario file loading.
//!
//! A scenario is a JSON document:
//!
//! ```text
//! {
//!   "timelines": [
//!     { "id": "launch", "name": "Launch",
//!       "procedures": [
//!         { "step": "harness_check", "instruction": "harness" },
//!         { "step": "run_up", "condition": "Time", "parameter": 3 },
//!         { "step": "flare", "condition": "alt", "parameter": "12.5" }
//!       ] }
//!   ],
//!   "instructions": [ { "id": "harness", "title": "Check your harness" } ],
//!   "regions": [ { "id": 1, "scene": "valley_north", "unload_delay_secs": 4 } ]
//! }
//! ```
//!
//! Conditions and parameters are parsed leniently: an unknown condition
//! becomes `None` and an unusable parameter becomes `0.0`, both with a
//! warning.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ScenarioError;
use crate::procedure::{InstructionContent, Procedure, ScenarioSource, Timeline, TriggerCondition};
use crate::runtime::seconds;
use crate::streaming::{ActivationPolicy, Region, RegionId};

// =============================================================================
// File Records
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    timelines: Vec<TimelineRecord>,
    #[serde(default)]
    instructions: Vec<InstructionContent>,
    #[serde(default)]
    regions: Vec<RegionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct TimelineRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    procedures: Vec<ProcedureRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProcedureRecord {
    step: String,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    parameter: Option<serde_json::Value>,
    #[serde(default)]
    instruction: Option<String>,
}

/// A region as written in the scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionRecord {
    pub id: u32,
    pub scene: String,
    #[serde(default)]
    pub policy: ActivationPolicy,
    /// Falls back to the runtime default when absent.
    #[serde(default)]
    pub unload_delay_secs: Option<f32>,
    #[serde(default)]
    pub anchor: [f32; 3],
}

/// Parse a procedure parameter that may be a number or a numeric string.
fn parse_parameter(step: &str, value: Option<&serde_json::Value>) -> f32 {
    let parsed = match value {
        None | Some(serde_json::Value::Null) => return 0.0,
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|v| v as f32),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f32>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => v,
        _ => {
            warn!(step, parameter = ?value, "Unusable procedure parameter, using 0");
            0.0
        }
    }
}

impl ProcedureRecord {
    fn to_procedure(&self) -> Procedure {
        let condition = self
            .condition
            .as_deref()
            .map(TriggerCondition::parse)
            .unwrap_or_default();
        Procedure {
            step: self.step.clone(),
            condition,
            parameter: parse_parameter(&self.step, self.parameter.as_ref()),
            instruction: self.instruction.clone(),
        }
    }
}

// =============================================================================
// Scenario Config
// =============================================================================

/// A loaded, validated scenario.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    timelines: Vec<Timeline>,
    procedures: HashMap<String, Vec<Procedure>>,
    instructions: HashMap<String, InstructionContent>,
    regions: Vec<RegionRecord>,
}

impl ScenarioConfig {
    /// Load a scenario file.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            timelines = scenario.timelines.len(),
            regions = scenario.regions.len(),
            "Scenario loaded"
        );
        Ok(scenario)
    }

    /// Parse scenario JSON.
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        let file: ScenarioFile = serde_json::from_str(text)?;

        let mut seen = HashSet::new();
        let mut timelines = Vec::with_capacity(file.timelines.len());
        let mut procedures = HashMap::new();
        for (order, record) in file.timelines.iter().enumerate() {
            if !seen.insert(record.id.clone()) {
                return Err(ScenarioError::DuplicateTimeline(record.id.clone()));
            }
            timelines.push(Timeline {
                id: record.id.clone(),
                name: record.name.clone().unwrap_or_else(|| record.id.clone()),
                order,
            });
            procedures.insert(
                record.id.clone(),
                record.procedures.iter().map(ProcedureRecord::to_procedure).collect(),
            );
        }

        let mut region_ids = HashSet::new();
        for region in &file.regions {
            if !region_ids.insert(region.id) {
                return Err(ScenarioError::DuplicateRegion(region.id));
            }
        }

        let instructions = file
            .instructions
            .into_iter()
            .map(|content| (content.id.clone(), content))
            .collect();

        Ok(Self {
            timelines,
            procedures,
            instructions,
            regions: file.regions,
        })
    }

    /// Build the scenario's regions, using `default_delay` where a region
    /// does not set its own unload delay.
    pub fn regions(&self, default_delay: Duration) -> Vec<Region> {
        self.regions
            .iter()
            .map(|record| {
                let delay = record
                    .unload_delay_secs
                    .map(seconds)
                    .unwrap_or(default_delay);
                Region::new(RegionId(record.id), record.scene.clone(), record.policy, delay)
                    .with_anchor(record.anchor)
            })
            .collect()
    }

    pub fn region_records(&self) -> &[RegionRecord] {
        &self.regions
    }

    pub fn timeline_count(&self) -> usize {
        self.timelines.len()
    }

    /// Total procedures across all timelines.
    pub fn procedure_count(&self) -> usize {
        self.procedures.values().map(Vec::len).sum()
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Distinct step keys, sorted.
    pub fn step_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .procedures
            .values()
            .flatten()
            .map(Procedure::key)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        keys.sort();
        keys
    }
}

impl ScenarioSource for ScenarioConfig {
    fn timelines(&self) -> Vec<Timeline> {
        self.timelines.clone()
    }

    fn procedures_of(&self, timeline_id: &str) -> Vec<Procedure> {
        self.procedures.get(timeline_id).cloned().unwrap_or_default()
    }

    fn instruction_content(&self, instruction_id: &str) -> Option<InstructionContent> {
        self.instructions.get(instruction_id).cloned()
    }
}
