//! Status command: where data lives and what the planner holds.

use std::io::Write;

use anyhow::{Context, Result};

use nd_db::Database;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let store = db.load_store()?;
    let busy_blocks = db.list_busy_events()?.len();
    let busy = db.busy_mask()?;
    let plans = db.load_plans()?;

    writeln!(writer, "Planner status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    match &config.server_url {
        Some(url) => writeln!(writer, "Courses from: {url}")?,
        None => writeln!(writer, "Courses from: {}", config.catalog_path.display())?,
    }
    match db.week_anchor()? {
        Some(week) => writeln!(writer, "Week: {week}")?,
        None => writeln!(writer, "Week: current")?,
    }
    writeln!(writer, "Saved courses: {}", store.len())?;
    writeln!(
        writer,
        "Busy blocks: {busy_blocks} ({} min)",
        busy.count_slots() * nd_core::bitmask::SLOT_MINUTES
    )?;
    writeln!(writer, "Course events: {}", db.course_event_count()?)?;
    match plans.summary_message() {
        Some(message) => writeln!(writer, "Cached plan: {message}")?,
        None => writeln!(writer, "Cached plan: none")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use insta::assert_snapshot;
    use nd_core::calendar::{CalendarEvent, WeekAnchor};

    fn config(temp: &tempfile::TempDir) -> Config {
        Config {
            database_path: temp.path().join("nd.db"),
            catalog_path: temp.path().join("courses.json.gz"),
            server_url: None,
        }
    }

    #[test]
    fn fresh_database_reports_nothing_stored() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        let mut output = Vec::new();
        run(&mut output, &config).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&temp.path().display().to_string(), "[TEMP]");
        assert_snapshot!(output, @r"
        Planner status
        Database: [TEMP]/nd.db
        Courses from: [TEMP]/courses.json.gz
        Week: current
        Saved courses: 0
        Busy blocks: 0 (0 min)
        Course events: 0
        Cached plan: none
        ");
    }

    #[test]
    fn status_counts_busy_time_and_week() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = config(&temp);
        config.server_url = Some("http://courses.test".to_string());
        let monday = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        {
            let mut db = Database::open(&config.database_path).unwrap();
            db.add_busy_event(&CalendarEvent::busy(
                "busy-1",
                monday.and_hms_opt(8, 0, 0).unwrap(),
                monday.and_hms_opt(9, 0, 0).unwrap(),
            ))
            .unwrap();
            db.set_week_anchor(WeekAnchor::containing(monday)).unwrap();
        }

        let mut output = Vec::new();
        run(&mut output, &config).unwrap();
        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&temp.path().display().to_string(), "[TEMP]");
        assert_snapshot!(output, @r"
        Planner status
        Database: [TEMP]/nd.db
        Courses from: http://courses.test
        Week: 2025-09-01
        Saved courses: 0
        Busy blocks: 1 (60 min)
        Course events: 0
        Cached plan: none
        ");
    }
}
