//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

/// Weekly course planner.
///
/// Builds a course catalog from registrar data, tracks the sessions you pick
/// for each saved course, and keeps a weekly calendar in sync with them.
#[derive(Debug, Parser)]
#[command(name = "nd", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build or inspect the local course catalog.
    #[command(subcommand)]
    Catalog(CatalogAction),

    /// Suggest course names matching a query.
    Search {
        query: String,

        /// Maximum number of suggestions.
        #[arg(long, default_value_t = nd_core::catalog::SEARCH_LIMIT)]
        limit: usize,
    },

    /// Show a course's sessions grouped by type.
    Show {
        /// Course name or saved key.
        name: String,
    },

    /// Save a course to your list.
    Add {
        /// Course name; the closest catalog match is saved.
        name: String,
    },

    /// Remove a saved course and its selections.
    Remove {
        /// Saved course key (lower-cased name).
        key: String,
    },

    /// List saved courses and their selections.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Choose a session for a course type; omit the index to unset it.
    Select {
        key: String,
        /// Session type code, e.g. `L` or `Lab`.
        code: String,
        /// Session index as shown by `nd show`.
        index: Option<usize>,
    },

    /// Pin a session so autoschedule keeps it, or unpin it if already pinned.
    Pin {
        key: String,
        code: String,
        index: usize,
    },

    /// Mark whether a course type's time counts against busy time.
    Attend {
        key: String,
        code: String,
        state: Toggle,
    },

    /// Manage busy time blocks.
    #[command(subcommand)]
    Busy(BusyAction),

    /// Ask the optimizer for a plan, or cycle to the next cached plan.
    Autoschedule {
        /// Drop cached plans and request new ones.
        #[arg(long)]
        refresh: bool,
    },

    /// Reconcile the calendar and print this week's course events.
    Calendar {
        /// Any date in the week to lay events out on.
        #[arg(long)]
        week: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show database, catalog and schedule status.
    Status,
}

/// Catalog subcommands.
#[derive(Debug, Subcommand)]
pub enum CatalogAction {
    /// Merge scraped registrar rows into a compressed catalog file.
    Build {
        /// Scraped courses as JSON.
        #[arg(long)]
        input: PathBuf,

        /// Output path (defaults to the configured catalog path).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Drop sessions whose time is a placeholder.
        #[arg(long)]
        strip: bool,
    },
}

/// Busy time subcommands.
#[derive(Debug, Subcommand)]
pub enum BusyAction {
    /// Block out a time span (`YYYY-MM-DDTHH:MM` local or RFC 3339).
    Add {
        start: String,
        end: String,

        /// Label shown on the calendar.
        #[arg(long, default_value = "Busy")]
        title: String,
    },

    /// List busy blocks.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete one busy block by id.
    Remove { id: String },

    /// Delete every busy block.
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}
