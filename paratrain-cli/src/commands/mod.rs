//! CLI subcommands.

pub mod common;
pub mod run;
pub mod validate;
