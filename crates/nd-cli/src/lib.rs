//! Weekly course planner CLI library.
//!
//! This crate provides the `nd` command-line interface: catalog building,
//! course selection, busy time and calendar reconciliation.

mod cli;
pub mod commands;
mod config;

pub use cli::{BusyAction, CatalogAction, Cli, Commands, Toggle};
pub use config::Config;
