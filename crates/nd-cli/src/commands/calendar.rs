//! Calendar command: run the pending reconciliation and show the week.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use nd_core::calendar::{CalendarEvent, LiveCalendar, WeekAnchor};
use nd_core::reconcile::{CLASH_TAG, PINNED_TAG, ReconcileReport};
use serde::Serialize;

use super::session::PlannerSession;

/// What one `nd calendar` run did and shows.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarView {
    pub week: WeekAnchor,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub events: Vec<CalendarEvent>,
}

impl CalendarView {
    fn new(week: WeekAnchor, report: Option<&ReconcileReport>, events: Vec<CalendarEvent>) -> Self {
        Self {
            week,
            added: report.map_or(0, ReconcileReport::added),
            updated: report.map_or(0, ReconcileReport::updated),
            removed: report.map_or(0, ReconcileReport::removed),
            unchanged: report.map_or(0, |report| report.unchanged),
            events,
        }
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    mut session: PlannerSession,
    week: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    if let Some(date) = week {
        session.planner_mut().set_week(WeekAnchor::containing(date));
    }
    let week = session.planner().week();
    let (db, report) = session.finish()?;

    let events = events_in_week(db.events().context("failed to read calendar")?, week);
    let view = CalendarView::new(week, report.as_ref(), events);
    if json {
        serde_json::to_writer_pretty(&mut *writer, &view)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_view(&view))?;
    }
    Ok(())
}

/// Events starting inside `week`, in start order.
fn events_in_week(mut events: Vec<CalendarEvent>, week: WeekAnchor) -> Vec<CalendarEvent> {
    let first = week.monday();
    let last = first + Duration::days(7);
    events.retain(|event| {
        let date = event.start.date();
        date >= first && date < last
    });
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    events
}

pub fn format_view(view: &CalendarView) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Week of {}: {} added, {} updated, {} removed, {} unchanged",
        view.week, view.added, view.updated, view.removed, view.unchanged
    );
    let _ = writeln!(output);

    if view.events.is_empty() {
        let _ = writeln!(output, "No events this week.");
        return output;
    }
    for event in &view.events {
        let mut line = format!(
            "{} {}-{}  {}",
            event.start.format("%a"),
            event.start.format("%H:%M"),
            event.end.format("%H:%M"),
            event.title
        );
        let flags: Vec<&str> = event
            .tags
            .iter()
            .map(String::as_str)
            .filter(|tag| *tag == PINNED_TAG || *tag == CLASH_TAG)
            .collect();
        if !flags.is_empty() {
            let _ = write!(line, "  [{}]", flags.join(", "));
        }
        let _ = writeln!(output, "{line}");
    }
    output
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use insta::assert_snapshot;
    use nd_db::Database;

    use super::*;
    use crate::commands::busy;
    use crate::commands::select;
    use crate::commands::source::fixtures;

    #[tokio::test]
    async fn calendar_lays_out_selected_week() {
        let db = Database::open_in_memory().unwrap();
        let source = fixtures::local();
        let mut session = PlannerSession::open(db, &source).await.unwrap();
        session
            .planner_mut()
            .add_course("CSCI 151 Programming", Utc::now())
            .unwrap();
        let mut sink = Vec::new();
        select::pin(&mut sink, &mut session, "csci", "L", 0).unwrap();
        select::select(&mut sink, &mut session, "csci", "Lab", Some(2)).unwrap();
        busy::add(&mut sink, &mut session, "2025-09-01T09:30", "2025-09-01T10:00", "Gym").unwrap();

        let mut out = Vec::new();
        let week = NaiveDate::from_ymd_opt(2025, 9, 3);
        run(&mut out, session, week, false).unwrap();
        assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        Week of 2025-09-01: 3 added, 0 updated, 0 removed, 0 unchanged

        Mon 09:00-10:15  CSCI 151 Programming — L1  [pinned, clash]
        Mon 09:30-10:00  Gym
        Wed 09:00-10:15  CSCI 151 Programming — L1  [pinned]
        Fri 14:00-15:50  CSCI 151 Programming — Lab1
        ");
    }

    #[tokio::test]
    async fn empty_week_says_so() {
        let db = Database::open_in_memory().unwrap();
        let source = fixtures::local();
        let session = PlannerSession::open(db, &source).await.unwrap();
        let mut out = Vec::new();
        run(&mut out, session, NaiveDate::from_ymd_opt(2025, 9, 7), false).unwrap();
        assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        Week of 2025-09-01: 0 added, 0 updated, 0 removed, 0 unchanged

        No events this week.
        ");
    }

    #[test]
    fn events_outside_week_are_hidden() {
        let monday = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let inside = CalendarEvent::busy(
            "a",
            monday.and_hms_opt(8, 0, 0).unwrap(),
            monday.and_hms_opt(9, 0, 0).unwrap(),
        );
        let next = monday + Duration::days(7);
        let outside = CalendarEvent::busy(
            "b",
            next.and_hms_opt(8, 0, 0).unwrap(),
            next.and_hms_opt(9, 0, 0).unwrap(),
        );
        let kept = events_in_week(vec![outside, inside], WeekAnchor::containing(monday));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
    }
}
