//! Search and show commands for browsing course data.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Result, bail};
use nd_core::course::Course;
use nd_core::selection::{SavedCourse, SelectionState};
use nd_db::Database;

use super::source::CourseSource;

pub async fn run<W: Write>(
    writer: &mut W,
    source: &CourseSource,
    query: &str,
    limit: usize,
) -> Result<()> {
    let names = source.search(query, limit).await;
    if names.is_empty() {
        writeln!(writer, "No courses match '{query}'.")?;
        return Ok(());
    }
    for name in names {
        writeln!(writer, "{name}")?;
    }
    Ok(())
}

pub async fn show<W: Write>(
    writer: &mut W,
    db: &Database,
    source: &CourseSource,
    name: &str,
) -> Result<()> {
    let Some(course) = source.resolve(name).await else {
        bail!("no course matches '{name}'");
    };
    let store = db.load_store()?;
    let saved = course.key().ok().and_then(|key| store.get(&key));
    write!(writer, "{}", format_course(&course, saved))?;
    Ok(())
}

/// Sessions grouped by type, with their index for `nd select`/`nd pin`.
pub fn format_course(course: &Course, saved: Option<&SavedCourse>) -> String {
    let mut output = String::new();
    let credits = if course.credits.is_empty() {
        String::new()
    } else {
        format!(" ({} credits)", course.credits)
    };
    let _ = writeln!(output, "{}{credits}", course.name);

    for code in &course.types {
        let state = saved.map_or(SelectionState::Unset, |saved| saved.state(code));
        let attended = saved
            .and_then(|saved| saved.selections.get(code))
            .is_none_or(|selection| selection.attended);
        let _ = writeln!(output);
        if attended {
            let _ = writeln!(output, "{code}");
        } else {
            let _ = writeln!(output, "{code} (not attended)");
        }

        for &index in course.sessions_of(code) {
            let Some(session) = course.session(index) else {
                continue;
            };
            let mut marks = Vec::new();
            match state {
                SelectionState::Pinned { index: chosen } if chosen == index => marks.push("pinned"),
                SelectionState::Chosen { index: chosen } if chosen == index => marks.push("chosen"),
                _ => {}
            }
            if !session.available {
                marks.push("full");
            }
            if !session.relevant {
                marks.push("placeholder");
            }
            let line = format!(
                "  [{index}] {:<6} {:<22} {:>6}  {:<18} {}",
                session.name,
                session.time_text,
                session.enrollment,
                session.professors.join(", "),
                marks.join(", ")
            );
            let _ = writeln!(output, "{}", line.trim_end());
        }
    }
    output
}
