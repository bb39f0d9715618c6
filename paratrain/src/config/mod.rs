//! Configuration loading.
//!
//! - [`ScenarioConfig`]: timelines, procedures, instructions, and regions
//!   from a JSON scenario file
//! - [`Settings`]: runtime knobs from an INI file

mod scenario;
mod settings;

pub use scenario::{RegionRecord, ScenarioConfig};
pub use settings::{Settings, DEFAULT_UNLOAD_DELAY_SECS, SETTINGS_FILE};
