//! Deduplication of scraped session rows.
//!
//! The registrar lists a multi-day section once per meeting day, so one
//! section arrives as several rows sharing a name. Rows with the same
//! `(type, name)` collapse into one [`Session`]:
//!
//! | field       | merge rule                                              |
//! |-------------|---------------------------------------------------------|
//! | bitmask     | union                                                   |
//! | time text   | day letters joined when the ranges match, else `"; "`   |
//! | professors  | ordered set union                                       |
//! | available   | OR                                                      |
//! | enrollment  | first non-empty                                         |
//! | relevant    | AND                                                     |

use std::collections::HashMap;

use crate::bitmask::WeeklyBitmask;
use crate::course::{Session, push_names};
use crate::day::Day;
use crate::time_range::{is_placeholder_time, parse_time_range};

/// One scraped session row with its scrape-time derived fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSession {
    pub name: String,
    /// Explicit type; derived from the name when absent.
    pub session_type: Option<String>,
    pub time_text: String,
    pub enrollment: String,
    pub professor: String,
    pub bitmask: WeeklyBitmask,
    pub relevant: bool,
    pub available: bool,
}

impl RawSession {
    /// Builds a raw session from the four visible table cells.
    pub fn from_row(name: &str, time_text: &str, enrollment: &str, professor: &str) -> Self {
        let time_text = time_text.trim();
        let enrollment = enrollment.trim();
        Self {
            name: name.trim().to_string(),
            session_type: None,
            time_text: time_text.to_string(),
            enrollment: enrollment.to_string(),
            professor: professor.trim().to_string(),
            bitmask: time_text_bitmask(time_text),
            relevant: !is_placeholder_time(time_text),
            available: has_open_seats(enrollment),
        }
    }

    #[must_use]
    pub fn with_type(mut self, session_type: impl Into<String>) -> Self {
        self.session_type = Some(session_type.into());
        self
    }

    /// The merge type: the explicit type, or the name without digits.
    #[must_use]
    pub fn type_key(&self) -> String {
        match &self.session_type {
            Some(explicit) => explicit.trim().to_string(),
            None => self
                .name
                .chars()
                .filter(|c| !c.is_ascii_digit())
                .collect::<String>()
                .trim()
                .to_string(),
        }
    }

    fn into_session(self, session_type: String) -> Session {
        let mut professors = Vec::new();
        push_names(&mut professors, &self.professor);
        Session {
            name: self.name,
            session_type,
            time_text: self.time_text,
            bitmask: self.bitmask,
            relevant: self.relevant,
            available: self.available,
            enrollment: self.enrollment,
            professors,
        }
    }
}

/// The slots a piece of time text occupies, across all its records.
pub fn time_text_bitmask(text: &str) -> WeeklyBitmask {
    let mut mask = WeeklyBitmask::EMPTY;
    for record in text.split(';') {
        for (day, range) in parse_time_range(record) {
            mask.insert_range(day, range.start_minute, range.end_minute);
        }
    }
    mask
}

/// `"taken/capacity"` has seats left unless both sides are equal.
fn has_open_seats(enrollment: &str) -> bool {
    let mut parts = enrollment.split('/').map(str::trim);
    parts.next() != parts.next()
}

/// Merges rows sharing `(type, name)`, keeping first-seen order.
pub fn merge_sessions(rows: impl IntoIterator<Item = RawSession>) -> Vec<Session> {
    let mut merged: Vec<Session> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for row in rows {
        let session_type = row.type_key();
        let key = (session_type.clone(), row.name.clone());
        if let Some(&position) = positions.get(&key) {
            tracing::debug!(name = %row.name, session_type = %session_type, "merging duplicate session row");
            absorb(&mut merged[position], row);
        } else {
            positions.insert(key, merged.len());
            merged.push(row.into_session(session_type));
        }
    }
    merged
}

fn absorb(session: &mut Session, row: RawSession) {
    session.bitmask.union_with(&row.bitmask);
    session.time_text = merge_time_text(&session.time_text, &row.time_text);
    push_names(&mut session.professors, &row.professor);
    session.available |= row.available;
    if session.enrollment.is_empty() {
        session.enrollment = row.enrollment;
    }
    session.relevant &= row.relevant;
}

/// Combines two time descriptions of the same section.
///
/// `"M 09:00AM-09:50AM"` and `"W 09:00AM-09:50AM"` become
/// `"MW 09:00AM-09:50AM"`; differing ranges are kept side by side.
pub fn merge_time_text(first: &str, second: &str) -> String {
    if let (Some((first_days, range)), Some((second_days, other_range))) =
        (split_time_record(first), split_time_record(second))
    {
        if range == other_range {
            let letters: String = Day::MODELED
                .iter()
                .filter(|day| first_days.contains(day) || second_days.contains(day))
                .map(|day| day.letter())
                .collect();
            return format!("{letters} {range}");
        }
    }

    let mut parts: Vec<&str> = Vec::with_capacity(2);
    for text in [first, second] {
        if !text.is_empty() && !parts.contains(&text) {
            parts.push(text);
        }
    }
    parts.join("; ")
}

/// Splits `"MW 09:00AM-09:50AM"` into its day letters and range text.
fn split_time_record(text: &str) -> Option<(Vec<Day>, &str)> {
    let text = text.trim();
    let (days, range) = text.split_once(' ').unwrap_or((text, ""));
    let range = range.trim();
    let days: Vec<Day> = days
        .chars()
        .filter_map(Day::from_letter)
        .filter(|day| day.is_modeled())
        .collect();
    if days.is_empty() || range.is_empty() || !range.contains('-') {
        return None;
    }
    Some((days, range))
}
