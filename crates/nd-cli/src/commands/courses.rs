//! Add, remove and list saved courses.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Result, bail};
use chrono::Utc;
use nd_core::selection::{SelectionState, SelectionStore};

use super::session::PlannerSession;
use super::source::CourseSource;

/// Saves the course `name` resolves to.
pub async fn add<W: Write>(
    writer: &mut W,
    session: &mut PlannerSession,
    source: &CourseSource,
    name: &str,
) -> Result<()> {
    let Some(course) = source.resolve(name).await else {
        bail!("no course matches '{name}'");
    };
    let added = session.planner_mut().add_course(&course.name, Utc::now())?;
    if added {
        writeln!(writer, "Saved {}", course.name)?;
    } else {
        writeln!(writer, "{} is already saved", course.name)?;
    }
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, session: &mut PlannerSession, key: &str) -> Result<()> {
    let key = session.saved_key(key)?;
    session.planner_mut().remove_course(&key);
    writeln!(writer, "Removed {key}")?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, store: &SelectionStore, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *writer, store)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_store(store))?;
    }
    Ok(())
}

/// Human-readable list of saved courses, newest first.
pub fn format_store(store: &SelectionStore) -> String {
    let mut output = String::new();
    if store.is_empty() {
        let _ = writeln!(output, "No saved courses.");
        let _ = writeln!(output);
        let _ = writeln!(output, "Hint: Run 'nd search <name>' then 'nd add <name>'.");
        return output;
    }

    let _ = writeln!(output, "SAVED COURSES ({})", store.len());
    for saved in store.courses() {
        let _ = writeln!(output);
        let _ = writeln!(output, "{}  [{}]", saved.name, saved.key);
        if saved.selections.is_empty() {
            let _ = writeln!(output, "  (no sessions chosen)");
        }
        for (code, selection) in &saved.selections {
            let choice = match selection.state() {
                SelectionState::Unset => "-".to_string(),
                SelectionState::Chosen { .. } => selection.session_name.clone(),
                SelectionState::Pinned { .. } => format!("{} (pinned)", selection.session_name),
            };
            let mut line = format!("  {:<5} {choice}", code.as_str());
            if !selection.attended {
                line.push_str("  not attended");
            }
            if !selection.relevant {
                line.push_str("  placeholder time");
            }
            let _ = writeln!(output, "{line}");
        }
    }
    output
}
