//! Calendar events and the week they are laid out on.
//!
//! A live calendar holds two kinds of events: course events, which are owned
//! by reconciliation, and busy events the user blocks out by hand. Both are
//! plain records with local date-times; the host decides how to render them.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::bitmask::WeeklyBitmask;
use crate::day::Day;
use crate::types::{CourseKey, TypeCode};

/// Text color used on every course event.
pub const COURSE_TEXT_COLOR: &str = "#fff";
/// Background of user busy events.
pub const BUSY_COLOR: &str = "#6b7280";

/// Who owns an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Derived from a course selection; replaced on every reconcile pass.
    Course,
    /// Entered by the user; never touched by reconciliation.
    Busy,
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course => write!(f, "course"),
            Self::Busy => write!(f, "busy"),
        }
    }
}

/// Back-reference from a course event to the selection it shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRef {
    pub course_key: CourseKey,
    pub type_code: TypeCode,
    pub session_index: usize,
}

/// One event on the live calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub background_color: String,
    pub text_color: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub origin: EventOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseRef>,
}

impl CalendarEvent {
    /// A user busy block.
    #[must_use]
    pub fn busy(id: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            title: "Busy".to_string(),
            start,
            end,
            background_color: BUSY_COLOR.to_string(),
            text_color: COURSE_TEXT_COLOR.to_string(),
            tags: vec!["busy".to_string()],
            origin: EventOrigin::Busy,
            course: None,
        }
    }

    #[must_use]
    pub fn is_course(&self) -> bool {
        self.origin == EventOrigin::Course
    }

    /// Whether anything a viewer can see differs from `other`.
    ///
    /// Identity (`id`) and origin metadata are not compared.
    #[must_use]
    pub fn differs_visibly(&self, other: &Self) -> bool {
        self.start != other.start
            || self.end != other.end
            || self.title != other.title
            || self.background_color != other.background_color
            || self.text_color != other.text_color
            || self.tags != other.tags
    }
}

/// Slots covered by busy events, for the optimizer and clash tagging.
pub fn busy_mask<'a>(events: impl IntoIterator<Item = &'a CalendarEvent>) -> WeeklyBitmask {
    WeeklyBitmask::from_spans(
        events
            .into_iter()
            .filter(|event| event.origin == EventOrigin::Busy)
            .map(|event| (event.start, event.end)),
    )
}

/// The Monday the displayed week starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekAnchor(NaiveDate);

impl WeekAnchor {
    /// The week containing `date`; Sunday belongs to the week before it.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        let back = i64::from(date.weekday().num_days_from_monday());
        Self(date - Duration::days(back))
    }

    #[must_use]
    pub const fn monday(self) -> NaiveDate {
        self.0
    }

    /// Absolute time of `minute` past midnight on `day` of this week.
    ///
    /// Minute 1440 is midnight at the start of the following day.
    #[must_use]
    pub fn at(self, day: Day, minute: u32) -> NaiveDateTime {
        let date = self.0 + Duration::days(i64::try_from(day.index()).unwrap_or(0));
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(minute))
    }
}

impl fmt::Display for WeekAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic event color for a course key.
#[must_use]
pub fn course_color(key: &CourseKey) -> String {
    let hash = key
        .as_str()
        .encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(131).wrapping_add(u32::from(unit)));
    hsl_to_hex(f64::from(hash % 360), 68.0, 52.0)
}

/// Converts HSL (degrees, percent, percent) to `#rrggbb`.
#[must_use]
pub fn hsl_to_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let s = saturation / 100.0;
    let l = lightness / 100.0;
    let c = (1.0 - 2.0f64.mul_add(l, -1.0).abs()) * s;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match hue {
        h if (0.0..60.0).contains(&h) => (c, x, 0.0),
        h if (60.0..120.0).contains(&h) => (x, c, 0.0),
        h if (120.0..180.0).contains(&h) => (0.0, c, x),
        h if (180.0..240.0).contains(&h) => (0.0, x, c),
        h if (240.0..300.0).contains(&h) => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    format!(
        "#{:02x}{:02x}{:02x}",
        channel(r + m),
        channel(g + m),
        channel(b + m)
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel(value: f64) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// A calendar that reconciliation can read and mutate.
///
/// Implementations are free to persist, render, or forward each change.
pub trait LiveCalendar {
    type Error;

    /// Every event currently on the calendar, in any order.
    fn events(&self) -> Result<Vec<CalendarEvent>, Self::Error>;

    fn add_event(&mut self, event: CalendarEvent) -> Result<(), Self::Error>;

    /// Replaces the event with the same id, keeping its identity.
    fn update_event(&mut self, event: CalendarEvent) -> Result<(), Self::Error>;

    fn remove_event(&mut self, id: &str) -> Result<(), Self::Error>;
}

/// An in-memory calendar keyed by event id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calendar {
    events: BTreeMap<String, CalendarEvent>,
}

impl Calendar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CalendarEvent> {
        self.events.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalendarEvent> {
        self.events.values()
    }

    /// Inserts or replaces an event directly, bypassing reconciliation.
    pub fn insert(&mut self, event: CalendarEvent) {
        self.events.insert(event.id.clone(), event);
    }
}

impl LiveCalendar for Calendar {
    type Error = Infallible;

    fn events(&self) -> Result<Vec<CalendarEvent>, Self::Error> {
        Ok(self.events.values().cloned().collect())
    }

    fn add_event(&mut self, event: CalendarEvent) -> Result<(), Self::Error> {
        self.insert(event);
        Ok(())
    }

    fn update_event(&mut self, event: CalendarEvent) -> Result<(), Self::Error> {
        self.insert(event);
        Ok(())
    }

    fn remove_event(&mut self, id: &str) -> Result<(), Self::Error> {
        self.events.remove(id);
        Ok(())
    }
}
