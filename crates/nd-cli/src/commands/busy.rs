//! Busy command: block out time the optimizer should avoid.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result, bail};
use nd_core::calendar::CalendarEvent;
use nd_db::Database;

use super::session::PlannerSession;
use super::util::parse_local_datetime;

pub fn add<W: Write>(
    writer: &mut W,
    session: &mut PlannerSession,
    start: &str,
    end: &str,
    title: &str,
) -> Result<()> {
    let start = parse_local_datetime(start)?;
    let end = parse_local_datetime(end)?;
    if end <= start {
        bail!("busy block must end after it starts ({start} .. {end})");
    }

    let id = format!("busy-{}", uuid::Uuid::new_v4().simple());
    let mut event = CalendarEvent::busy(id.as_str(), start, end);
    if !title.trim().is_empty() {
        event.title = title.trim().to_string();
    }
    session
        .db_mut()
        .add_busy_event(&event)
        .context("failed to store busy block")?;
    refresh_busy(session)?;
    writeln!(writer, "Added {id}")?;
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, session: &mut PlannerSession, id: &str) -> Result<()> {
    if !session.db_mut().remove_busy_event(id)? {
        bail!("no busy block with id {id}");
    }
    refresh_busy(session)?;
    writeln!(writer, "Removed {id}")?;
    Ok(())
}

pub fn clear<W: Write>(writer: &mut W, session: &mut PlannerSession) -> Result<()> {
    let removed = session.db_mut().clear_busy_events()?;
    refresh_busy(session)?;
    writeln!(writer, "Removed {removed} busy blocks")?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let events = db.list_busy_events()?;
    if json {
        serde_json::to_writer_pretty(&mut *writer, &events)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_busy(&events))?;
    }
    Ok(())
}

/// Pushes the stored busy mask into the planner so plans and clash tags
/// follow it.
fn refresh_busy(session: &mut PlannerSession) -> Result<()> {
    let mask = session.db().busy_mask()?;
    session.planner_mut().set_busy(mask);
    Ok(())
}

pub fn format_busy(events: &[CalendarEvent]) -> String {
    let mut output = String::new();
    if events.is_empty() {
        let _ = writeln!(output, "No busy blocks.");
        return output;
    }
    for event in events {
        let _ = writeln!(
            output,
            "{}  {} - {}  {}",
            event.id,
            event.start.format("%a %Y-%m-%d %H:%M"),
            event.end.format("%H:%M"),
            event.title
        );
    }
    output
}
