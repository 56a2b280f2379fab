//! Storage layer for the nuddle planner.
//!
//! Persists saved courses, busy time and the live calendar using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but not shared without a `Mutex`.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! `saved_at` is stored as RFC 3339 UTC text. Calendar event times are local
//! wall-clock values stored as `YYYY-MM-DDTHH:MM:SS`, so lexicographic order
//! matches chronological order.
//!
//! ## JSON Columns
//!
//! `saved_courses.selections` and `calendar_events.data` hold serde JSON of the
//! core types. Unknown fields are ignored on read, so adding fields is safe.
//!
//! ## Settings
//!
//! Small singleton values (the busy bitmask as base64, cached optimizer plans)
//! live in a key/value `settings` table.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use nd_core::bitmask::BitmaskError;
use nd_core::calendar::{CalendarEvent, EventOrigin, LiveCalendar, WeekAnchor, busy_mask};
use nd_core::optimizer::PlanCycler;
use nd_core::selection::{SavedCourse, SelectionStore};
use nd_core::types::{CourseKey, ValidationError};
use nd_core::WeeklyBitmask;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

const BUSY_MASK_KEY: &str = "busy_mask";
const PLAN_CACHE_KEY: &str = "plan_cache";
const WEEK_KEY: &str = "week_anchor";
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {row}: {timestamp}")]
    TimestampParse {
        row: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A JSON column could not be encoded or decoded.
    #[error("invalid {column} data for {row}")]
    Json {
        column: &'static str,
        row: String,
        #[source]
        source: serde_json::Error,
    },
    /// A stored course key failed validation.
    #[error("invalid course key: {0}")]
    InvalidKey(#[from] ValidationError),
    /// The stored busy bitmask is not valid base64 of 24 bytes.
    #[error("invalid busy bitmask: {0}")]
    BusyMask(#[from] BitmaskError),
    /// An update targeted an event that is not stored.
    #[error("no calendar event with id {0}")]
    MissingEvent(String),
    /// A busy-only operation was given a course event.
    #[error("event {0} is not a busy event")]
    NotBusy(String),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- position: 0 is the most recently saved course
            CREATE TABLE IF NOT EXISTS saved_courses (
                key TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                position INTEGER NOT NULL,
                selections TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_saved_courses_position ON saved_courses(position);

            -- origin: 'course' rows are owned by reconciliation, 'busy' rows by the user
            -- data: JSON of the full event
            CREATE TABLE IF NOT EXISTS calendar_events (
                id TEXT PRIMARY KEY,
                origin TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_calendar_events_origin ON calendar_events(origin);
            CREATE INDEX IF NOT EXISTS idx_calendar_events_start ON calendar_events(start_at);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Loads the saved-course list, newest first.
    pub fn load_store(&self) -> Result<SelectionStore, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT key, name, saved_at, selections
            FROM saved_courses
            ORDER BY position ASC, key ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut courses = Vec::new();
        for row in rows {
            let (key, name, saved_at, selections) = row?;
            let selections =
                serde_json::from_str(&selections).map_err(|source| DbError::Json {
                    column: "selections",
                    row: key.clone(),
                    source,
                })?;
            courses.push(SavedCourse {
                saved_at: parse_timestamp(&saved_at, &key)?,
                key: CourseKey::new(key)?,
                name,
                selections,
            });
        }
        Ok(SelectionStore::from_courses(courses))
    }

    /// Replaces the stored course list with `store`.
    pub fn save_store(&mut self, store: &SelectionStore) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM saved_courses", [])?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO saved_courses (key, name, saved_at, position, selections)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for (position, course) in store.courses().iter().enumerate() {
                let selections =
                    serde_json::to_string(&course.selections).map_err(|source| DbError::Json {
                        column: "selections",
                        row: course.key.to_string(),
                        source,
                    })?;
                stmt.execute(params![
                    course.key.as_str(),
                    course.name,
                    format_timestamp(course.saved_at),
                    i64::try_from(position).unwrap_or(i64::MAX),
                    selections,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(courses = store.len(), "saved course list");
        Ok(())
    }

    /// Stores a user busy block and refreshes the busy bitmask.
    pub fn add_busy_event(&mut self, event: &CalendarEvent) -> Result<(), DbError> {
        if event.origin != EventOrigin::Busy {
            return Err(DbError::NotBusy(event.id.clone()));
        }
        upsert_event(&self.conn, event)?;
        self.refresh_busy_mask()?;
        Ok(())
    }

    /// Busy events ordered by start time.
    pub fn list_busy_events(&self) -> Result<Vec<CalendarEvent>, DbError> {
        self.query_events(Some(EventOrigin::Busy))
    }

    /// Deletes one busy event. Returns whether it existed.
    pub fn remove_busy_event(&mut self, id: &str) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM calendar_events WHERE id = ? AND origin = ?",
            params![id, EventOrigin::Busy.to_string()],
        )?;
        self.refresh_busy_mask()?;
        Ok(removed > 0)
    }

    /// Deletes every busy event. Returns how many were removed.
    pub fn clear_busy_events(&mut self) -> Result<usize, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM calendar_events WHERE origin = ?",
            [EventOrigin::Busy.to_string()],
        )?;
        self.refresh_busy_mask()?;
        Ok(removed)
    }

    /// The stored busy bitmask; empty when none was ever written.
    pub fn busy_mask(&self) -> Result<WeeklyBitmask, DbError> {
        match self.setting(BUSY_MASK_KEY)? {
            Some(encoded) => Ok(WeeklyBitmask::from_base64(&encoded)?),
            None => Ok(WeeklyBitmask::EMPTY),
        }
    }

    /// Recomputes the busy bitmask from stored busy events and saves it.
    pub fn refresh_busy_mask(&mut self) -> Result<WeeklyBitmask, DbError> {
        let events = self.list_busy_events()?;
        let mask = busy_mask(&events);
        self.set_setting(BUSY_MASK_KEY, &mask.to_base64())?;
        tracing::debug!(slots = mask.count_slots(), "refreshed busy bitmask");
        Ok(mask)
    }

    /// Cached optimizer plans; empty when nothing is cached.
    pub fn load_plans(&self) -> Result<PlanCycler, DbError> {
        let Some(raw) = self.setting(PLAN_CACHE_KEY)? else {
            return Ok(PlanCycler::default());
        };
        serde_json::from_str(&raw).map_err(|source| DbError::Json {
            column: "settings",
            row: PLAN_CACHE_KEY.to_string(),
            source,
        })
    }

    /// Stores the plan cache, or clears it when empty.
    pub fn save_plans(&mut self, plans: &PlanCycler) -> Result<(), DbError> {
        if plans.is_empty() {
            self.conn
                .execute("DELETE FROM settings WHERE key = ?", [PLAN_CACHE_KEY])?;
            return Ok(());
        }
        let raw = serde_json::to_string(plans).map_err(|source| DbError::Json {
            column: "settings",
            row: PLAN_CACHE_KEY.to_string(),
            source,
        })?;
        self.set_setting(PLAN_CACHE_KEY, &raw)
    }

    /// The week course events were last laid out on.
    pub fn week_anchor(&self) -> Result<Option<WeekAnchor>, DbError> {
        let Some(raw) = self.setting(WEEK_KEY)? else {
            return Ok(None);
        };
        let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|source| {
            DbError::TimestampParse {
                row: WEEK_KEY.to_string(),
                timestamp: raw.clone(),
                source,
            }
        })?;
        Ok(Some(WeekAnchor::containing(date)))
    }

    pub fn set_week_anchor(&mut self, week: WeekAnchor) -> Result<(), DbError> {
        self.set_setting(WEEK_KEY, &week.to_string())
    }

    /// Number of course events currently on the calendar.
    pub fn course_event_count(&self) -> Result<usize, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM calendar_events WHERE origin = ?",
            [EventOrigin::Course.to_string()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn query_events(&self, origin: Option<EventOrigin>) -> Result<Vec<CalendarEvent>, DbError> {
        let origin = origin.map(|origin| origin.to_string());
        let mut stmt = self.conn.prepare(
            "
            SELECT id, data
            FROM calendar_events
            WHERE ?1 IS NULL OR origin = ?1
            ORDER BY start_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([origin], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, data) = row?;
            let event = serde_json::from_str(&data).map_err(|source| DbError::Json {
                column: "data",
                row: id,
                source,
            })?;
            events.push(event);
        }
        Ok(events)
    }

    fn setting(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl LiveCalendar for Database {
    type Error = DbError;

    fn events(&self) -> Result<Vec<CalendarEvent>, Self::Error> {
        self.query_events(None)
    }

    fn add_event(&mut self, event: CalendarEvent) -> Result<(), Self::Error> {
        upsert_event(&self.conn, &event)
    }

    fn update_event(&mut self, event: CalendarEvent) -> Result<(), Self::Error> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM calendar_events WHERE id = ?",
                [&event.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DbError::MissingEvent(event.id));
        }
        upsert_event(&self.conn, &event)
    }

    fn remove_event(&mut self, id: &str) -> Result<(), Self::Error> {
        self.conn
            .execute("DELETE FROM calendar_events WHERE id = ?", [id])?;
        Ok(())
    }
}

fn upsert_event(conn: &Connection, event: &CalendarEvent) -> Result<(), DbError> {
    let data = serde_json::to_string(event).map_err(|source| DbError::Json {
        column: "data",
        row: event.id.clone(),
        source,
    })?;
    conn.execute(
        "
        INSERT INTO calendar_events (id, origin, start_at, end_at, data)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            origin = excluded.origin,
            start_at = excluded.start_at,
            end_at = excluded.end_at,
            data = excluded.data
        ",
        params![
            event.id,
            event.origin.to_string(),
            format_local(event.start),
            format_local(event.end),
            data,
        ],
    )?;
    Ok(())
}

fn parse_timestamp(timestamp: &str, row: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            row: row.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_local(time: NaiveDateTime) -> String {
    time.format(LOCAL_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::{NaiveDate, TimeZone};
    use nd_core::calendar::{Calendar, WeekAnchor};
    use nd_core::course::{Course, Session};
    use nd_core::day::Day;
    use nd_core::optimizer::{Assignment, Plan, PlanSummary};
    use nd_core::reconcile::reconcile;
    use nd_core::types::TypeCode;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 8, 30, 0).unwrap()
    }

    fn course() -> Course {
        Course::new(
            "CSCI 151",
            "8",
            vec![Session {
                name: "L1".to_string(),
                session_type: "L".to_string(),
                time_text: "MW 09:00AM-10:15AM".to_string(),
                bitmask: WeeklyBitmask::encode([Day::Monday, Day::Wednesday], 540, 615),
                relevant: true,
                available: true,
                enrollment: "10/40".to_string(),
                professors: vec!["Ada Lovelace".to_string()],
            }],
        )
    }

    fn store_with_choice() -> SelectionStore {
        let mut store = SelectionStore::default();
        store.add_course("MATH 161", now()).unwrap();
        store.add_course("CSCI 151", now()).unwrap();
        let key = CourseKey::from_name("CSCI 151").unwrap();
        let code = TypeCode::new("L").unwrap();
        store.choose_session(&key, &code, Some(0), &course()).unwrap();
        store
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "saved_courses"),
            vec!["key", "name", "saved_at", "position", "selections"]
        );
        assert_eq!(
            table_columns(&db.conn, "calendar_events"),
            vec!["id", "origin", "start_at", "end_at", "data"]
        );
        assert_eq!(table_columns(&db.conn, "settings"), vec!["key", "value"]);

        let indexes = index_names(&db.conn, "calendar_events");
        assert!(indexes.contains("idx_calendar_events_origin"));
        assert!(indexes.contains("idx_calendar_events_start"));
    }

    #[test]
    fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nd.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.save_store(&store_with_choice()).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_store().unwrap().len(), 2);
    }

    #[test]
    fn store_round_trips_in_order() {
        let mut db = Database::open_in_memory().unwrap();
        let store = store_with_choice();
        db.save_store(&store).unwrap();

        let loaded = db.load_store().unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.courses()[0].name, "CSCI 151");
    }

    #[test]
    fn saving_a_smaller_store_drops_removed_courses() {
        let mut db = Database::open_in_memory().unwrap();
        let mut store = store_with_choice();
        db.save_store(&store).unwrap();

        store.remove_course(&CourseKey::from_name("MATH 161").unwrap());
        db.save_store(&store).unwrap();
        assert_eq!(db.load_store().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_selection_json_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO saved_courses VALUES ('csci 151', 'CSCI 151', ?, 0, 'nope')",
                [format_timestamp(now())],
            )
            .unwrap();
        let err = db.load_store().unwrap_err();
        assert!(matches!(err, DbError::Json { column: "selections", .. }));
    }

    #[test]
    fn busy_events_drive_the_busy_mask() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.busy_mask().unwrap().is_empty());

        db.add_busy_event(&CalendarEvent::busy("gym", at(2, 8, 0), at(2, 9, 0)))
            .unwrap();
        db.add_busy_event(&CalendarEvent::busy("work", at(4, 13, 0), at(4, 14, 0)))
            .unwrap();
        let mut expected = WeeklyBitmask::encode([Day::Tuesday], 480, 540);
        expected.insert_range(Day::Thursday, 780, 840);
        assert_eq!(db.busy_mask().unwrap(), expected);

        assert!(db.remove_busy_event("gym").unwrap());
        assert!(!db.remove_busy_event("gym").unwrap());
        assert_eq!(db.list_busy_events().unwrap().len(), 1);

        assert_eq!(db.clear_busy_events().unwrap(), 1);
        assert!(db.busy_mask().unwrap().is_empty());
    }

    #[test]
    fn course_events_cannot_be_added_as_busy() {
        let mut db = Database::open_in_memory().unwrap();
        let mut event = CalendarEvent::busy("x", at(2, 8, 0), at(2, 9, 0));
        event.origin = EventOrigin::Course;
        assert!(matches!(db.add_busy_event(&event), Err(DbError::NotBusy(_))));
    }

    #[test]
    fn plan_cache_round_trips_and_clears() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.load_plans().unwrap().is_empty());

        let mut plans = PlanCycler::default();
        plans.load(vec![Plan {
            assignments: vec![Assignment {
                course_key: CourseKey::new("csci 151").unwrap(),
                type_code: TypeCode::new("L").unwrap(),
                session_index: 0,
            }],
            summary: PlanSummary {
                busy_overlap_minutes: 30,
                gap_minutes: 0,
            },
        }]);
        db.save_plans(&plans).unwrap();
        assert_eq!(db.load_plans().unwrap(), plans);

        db.save_plans(&PlanCycler::default()).unwrap();
        assert!(db.load_plans().unwrap().is_empty());
    }

    #[test]
    fn week_anchor_is_stored_as_monday() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.week_anchor().unwrap().is_none());

        let week = WeekAnchor::containing(at(4, 0, 0).date());
        db.set_week_anchor(week).unwrap();
        let stored = db.week_anchor().unwrap().unwrap();
        assert_eq!(stored.monday(), at(1, 0, 0).date());
    }

    #[test]
    fn update_of_unknown_event_fails() {
        let mut db = Database::open_in_memory().unwrap();
        let event = CalendarEvent::busy("ghost", at(2, 8, 0), at(2, 9, 0));
        assert!(matches!(
            db.update_event(event),
            Err(DbError::MissingEvent(id)) if id == "ghost"
        ));
    }

    #[test]
    fn reconcile_against_database_matches_in_memory_calendar() {
        let mut db = Database::open_in_memory().unwrap();
        let store = store_with_choice();
        let week = WeekAnchor::containing(at(1, 0, 0).date());
        db.add_busy_event(&CalendarEvent::busy("gym", at(1, 9, 0), at(1, 9, 30)))
            .unwrap();
        let busy = db.busy_mask().unwrap();

        let mut memory = Calendar::new();
        let first = reconcile(&mut db, &store, &busy, week).unwrap();
        reconcile(&mut memory, &store, &busy, week).unwrap();
        assert_eq!(first.added(), 2);
        assert_eq!(db.course_event_count().unwrap(), 2);

        let stored: Vec<_> = db.events().unwrap().into_iter().filter(CalendarEvent::is_course).collect();
        let expected: Vec<_> = memory.iter().cloned().collect();
        assert_eq!(stored, expected);

        let second = reconcile(&mut db, &store, &busy, week).unwrap();
        assert!(second.is_noop());
        assert_eq!(db.list_busy_events().unwrap().len(), 1);
    }
}
