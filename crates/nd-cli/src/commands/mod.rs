//! CLI subcommand implementations.

pub mod autoschedule;
pub mod busy;
pub mod calendar;
pub mod catalog;
pub mod courses;
pub mod search;
pub mod select;
pub mod session;
pub mod source;
pub mod status;
pub mod util;
