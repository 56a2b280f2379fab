//! Core domain logic for the nuddle course planner.
//!
//! This crate contains the fundamental types and logic for:
//! - Time parsing: registrar time text into day/minute ranges
//! - Bitmasks: the 24-byte weekly slot grid and its base64 encoding
//! - Merging: collapsing duplicate scraped rows into sessions
//! - Selections: saved courses and per-type session choices
//! - Reconciliation: keeping course events on a live calendar in sync

pub mod bitmask;
pub mod calendar;
pub mod catalog;
pub mod course;
pub mod day;
pub mod merge;
pub mod optimizer;
pub mod planner;
pub mod reconcile;
pub mod selection;
pub mod time_range;
pub mod types;

pub use bitmask::{BitmaskError, Interval, WeeklyBitmask};
pub use calendar::{Calendar, CalendarEvent, EventOrigin, LiveCalendar, WeekAnchor, busy_mask};
pub use catalog::{Catalog, CourseLookup};
pub use course::{Course, ScrapedCourse, ScrapedRow, Session};
pub use day::Day;
pub use optimizer::{AutoscheduleOutcome, AutoscheduleRequest, Plan, PlanCycler};
pub use planner::{AutoscheduleReport, Planner, ReconcileScheduler};
pub use reconcile::{ReconcileOp, ReconcileReport, reconcile};
pub use selection::{SavedCourse, Selection, SelectionError, SelectionState, SelectionStore};
pub use time_range::{ClockRange, DayTimeMap, parse_time_range, parse_time_text};
pub use types::{CourseKey, TypeCode, ValidationError};
