//! Merged sessions and courses, in the registrar's wire format.
//!
//! Field names on the wire are the upper-case keys the scraper and the
//! catalog server exchange (`COURSE_NAME`, `TIME_BITS`, ...). Flags travel as
//! `0`/`1` integers; booleans are accepted too.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bitmask::WeeklyBitmask;
use crate::merge::{RawSession, merge_sessions};
use crate::types::{CourseKey, TypeCode, ValidationError};

/// One meeting pattern of a course after duplicate rows were merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Section name as listed, e.g. `L1` or `Lab3`.
    #[serde(rename = "SESSION_NAME")]
    pub name: String,
    /// Session type; the name with digits removed unless scraped explicitly.
    #[serde(rename = "SESSION_TYPE", default)]
    pub session_type: String,
    /// Human-readable meeting times, possibly several `"; "`-joined records.
    #[serde(rename = "TIME_RECORD", default)]
    pub time_text: String,
    #[serde(rename = "TIME_BITS", default)]
    pub bitmask: WeeklyBitmask,
    /// `false` when the listed time is a non-meeting placeholder.
    #[serde(rename = "TIME_RELEVANCE", default = "relevant_default", with = "flag")]
    pub relevant: bool,
    /// Whether seats remain.
    #[serde(rename = "AVAILABILITY", default, with = "flag")]
    pub available: bool,
    #[serde(rename = "ENROLLMENT", default)]
    pub enrollment: String,
    /// Distinct instructor names in first-seen order.
    #[serde(rename = "PROFESSOR", default, with = "comma_list")]
    pub professors: Vec<String>,
}

const fn relevant_default() -> bool {
    true
}

/// A course with its sessions indexed by type.
///
/// `types` lists each type code once, in the order its first session appears;
/// `grouped` maps every type code to the indexes of its sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "COURSE_NAME")]
    pub name: String,
    #[serde(rename = "COURSE_CREDITS", default)]
    pub credits: String,
    #[serde(rename = "COURSE_SESSIONS", default)]
    pub sessions: Vec<Session>,
    #[serde(rename = "TYPES", default)]
    pub types: Vec<TypeCode>,
    #[serde(rename = "GROUPED", default)]
    pub grouped: BTreeMap<TypeCode, Vec<usize>>,
}

impl Course {
    /// Builds a course and its type index from merged sessions.
    pub fn new(name: impl Into<String>, credits: impl Into<String>, sessions: Vec<Session>) -> Self {
        let mut course = Self {
            name: name.into(),
            credits: credits.into(),
            sessions,
            types: Vec::new(),
            grouped: BTreeMap::new(),
        };
        course.build_type_index();
        course
    }

    /// Recomputes `types` and `grouped` from the session list.
    pub fn build_type_index(&mut self) {
        self.types.clear();
        self.grouped.clear();
        for (index, session) in self.sessions.iter().enumerate() {
            let code = TypeCode::from_session_type(&session.session_type);
            let members = self.grouped.entry(code.clone()).or_default();
            if members.is_empty() {
                self.types.push(code);
            }
            members.push(index);
        }
    }

    /// Rebuilds the type index when a payload arrived without one.
    pub fn ensure_type_index(&mut self) {
        let indexed: usize = self.grouped.values().map(Vec::len).sum();
        if indexed != self.sessions.len() || self.types.len() != self.grouped.len() {
            self.build_type_index();
        }
    }

    /// Drops sessions whose time is a placeholder and reindexes.
    pub fn strip_irrelevant(&mut self) {
        let before = self.sessions.len();
        self.sessions.retain(|session| session.relevant);
        if self.sessions.len() != before {
            tracing::debug!(
                course = %self.name,
                dropped = before - self.sessions.len(),
                "stripped placeholder sessions"
            );
        }
        self.build_type_index();
    }

    /// The saved-course key for this course.
    pub fn key(&self) -> Result<CourseKey, ValidationError> {
        CourseKey::from_name(&self.name)
    }

    #[must_use]
    pub fn session(&self, index: usize) -> Option<&Session> {
        self.sessions.get(index)
    }

    /// Session indexes of `code`, empty for an unknown type.
    #[must_use]
    pub fn sessions_of(&self, code: &TypeCode) -> &[usize] {
        self.grouped.get(code).map_or(&[], Vec::as_slice)
    }

    /// Whether `index` is one of the sessions of type `code`.
    #[must_use]
    pub fn has_session(&self, code: &TypeCode, index: usize) -> bool {
        self.sessions_of(code).contains(&index)
    }
}

/// A scraped course as the scraper emits it, before merging.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedCourse {
    #[serde(rename = "COURSE_NAME")]
    pub name: String,
    #[serde(rename = "COURSE_CREDITS", default)]
    pub credits: String,
    #[serde(rename = "COURSE_SESSIONS", default)]
    pub rows: Vec<ScrapedRow>,
}

/// One raw session row from the registrar table.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedRow {
    #[serde(rename = "SESSION_NAME")]
    pub name: String,
    #[serde(rename = "SESSION_TYPE", default)]
    pub session_type: Option<String>,
    #[serde(rename = "TIME_RECORD", default)]
    pub time_text: String,
    #[serde(rename = "ENROLLMENT", default)]
    pub enrollment: String,
    #[serde(rename = "PROFESSOR", default)]
    pub professor: String,
}

impl From<ScrapedRow> for RawSession {
    fn from(row: ScrapedRow) -> Self {
        let raw = Self::from_row(&row.name, &row.time_text, &row.enrollment, &row.professor);
        match row.session_type {
            Some(session_type) => raw.with_type(session_type),
            None => raw,
        }
    }
}

impl ScrapedCourse {
    /// Merges the scraped rows and builds the course.
    #[must_use]
    pub fn into_course(self) -> Course {
        let sessions = merge_sessions(self.rows.into_iter().map(RawSession::from));
        Course::new(self.name.trim(), self.credits.trim(), sessions)
    }
}

/// `0`/`1` integer flags that also accept JSON booleans.
mod flag {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        struct FlagVisitor;

        impl Visitor<'_> for FlagVisitor {
            type Value = bool;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("0, 1 or a boolean")
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
                Ok(value)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
                Ok(value != 0)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
                Ok(value != 0)
            }
        }

        deserializer.deserialize_any(FlagVisitor)
    }
}

/// Professor lists travel as one comma-joined string.
mod comma_list {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(names: &Vec<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&names.join(", "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let joined = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let mut names = Vec::new();
        super::push_names(&mut names, &joined);
        Ok(names)
    }
}

/// Appends the comma-separated names in `joined` that are not already listed.
pub(crate) fn push_names(names: &mut Vec<String>, joined: &str) {
    for name in joined.split(',').map(str::trim) {
        if !name.is_empty() && !names.iter().any(|known| known == name) {
            names.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::day::Day;

    fn session(name: &str, session_type: &str, relevant: bool) -> Session {
        Session {
            name: name.to_string(),
            session_type: session_type.to_string(),
            time_text: String::new(),
            bitmask: WeeklyBitmask::EMPTY,
            relevant,
            available: true,
            enrollment: String::new(),
            professors: Vec::new(),
        }
    }

    fn code(value: &str) -> TypeCode {
        TypeCode::new(value).unwrap()
    }

    #[test]
    fn type_index_is_first_seen_ordered() {
        let course = Course::new(
            "PHYS 161",
            "6",
            vec![
                session("R1", "R", true),
                session("L1", "L", true),
                session("R2", "R", true),
                session("Lab1", "  ", true),
            ],
        );
        assert_eq!(course.types, vec![code("R"), code("L"), code("?")]);
        assert_eq!(course.sessions_of(&code("R")), &[0, 2]);
        assert_eq!(course.sessions_of(&code("?")), &[3]);
        assert!(course.sessions_of(&code("Lab")).is_empty());
        assert!(course.has_session(&code("L"), 1));
        assert!(!course.has_session(&code("L"), 0));
    }

    #[test]
    fn strip_drops_placeholders_and_reindexes() {
        let mut course = Course::new(
            "CHEM 101",
            "6",
            vec![
                session("L1", "L", false),
                session("L2", "L", true),
                session("Lab1", "Lab", false),
            ],
        );
        course.strip_irrelevant();
        assert_eq!(course.sessions.len(), 1);
        assert_eq!(course.types, vec![code("L")]);
        assert_eq!(course.sessions_of(&code("L")), &[0]);
    }

    #[test]
    fn wire_format_uses_registrar_keys() {
        let mut s = session("L1", "L", true);
        s.professors = vec!["A. Smith".into(), "B. Jones".into()];
        s.bitmask = WeeklyBitmask::encode([Day::Monday], 540, 600);
        let course = Course::new("MATH 161", "8", vec![s]);

        let value = serde_json::to_value(&course).unwrap();
        assert_eq!(value["COURSE_NAME"], "MATH 161");
        assert_eq!(value["TYPES"], serde_json::json!(["L"]));
        assert_eq!(value["GROUPED"]["L"], serde_json::json!([0]));
        let wire = &value["COURSE_SESSIONS"][0];
        assert_eq!(wire["PROFESSOR"], "A. Smith, B. Jones");
        assert_eq!(wire["TIME_RELEVANCE"], 1);
        assert_eq!(wire["AVAILABILITY"], 1);
        assert_eq!(wire["TIME_BITS"], course.sessions[0].bitmask.to_base64());

        let parsed: Course = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, course);
    }

    #[test]
    fn reads_sparse_server_sessions() {
        let json = r#"{
            "COURSE_NAME": "HIST 120",
            "COURSE_SESSIONS": [
                {"SESSION_NAME": "S1", "SESSION_TYPE": "S", "ENROLLMENT": "10/30",
                 "AVAILABILITY": true, "PROFESSOR": "C. Lee,  C. Lee"}
            ]
        }"#;
        let mut course: Course = serde_json::from_str(json).unwrap();
        course.ensure_type_index();

        let s = &course.sessions[0];
        assert!(s.relevant);
        assert!(s.available);
        assert!(s.bitmask.is_empty());
        assert_eq!(s.professors, vec!["C. Lee".to_string()]);
        assert_eq!(course.types, vec![code("S")]);
    }

    #[test]
    fn scraped_course_merges_rows() {
        let json = r#"{
            "COURSE_NAME": " CSCI 151 ",
            "COURSE_CREDITS": "8",
            "COURSE_SESSIONS": [
                {"SESSION_NAME": "L1", "TIME_RECORD": "M 09:00AM-09:50AM", "ENROLLMENT": "30/30", "PROFESSOR": "A. Smith"},
                {"SESSION_NAME": "L1", "TIME_RECORD": "W 09:00AM-09:50AM", "ENROLLMENT": "30/30", "PROFESSOR": "B. Jones"},
                {"SESSION_NAME": "Lab1", "TIME_RECORD": "F 02:00PM-04:50PM", "ENROLLMENT": "5/24", "PROFESSOR": ""}
            ]
        }"#;
        let course = serde_json::from_str::<ScrapedCourse>(json)
            .unwrap()
            .into_course();

        assert_eq!(course.name, "CSCI 151");
        assert_eq!(course.sessions.len(), 2);
        assert_eq!(course.sessions[0].time_text, "MW 09:00AM-09:50AM");
        assert!(!course.sessions[0].available);
        assert!(course.sessions[1].available);
        assert_eq!(course.types, vec![code("L"), code("Lab")]);
    }
}
