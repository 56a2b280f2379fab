//! Saved courses and the per-type session choices made for them.
//!
//! Each saved course holds at most one [`Selection`] per session type. A type
//! is *unset* when it has no selection (or only an attendance preference),
//! *chosen* when a session index is set, and *pinned* when the user locked
//! that index against future optimizer plans.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bitmask::WeeklyBitmask;
use crate::catalog::CourseLookup;
use crate::course::{Course, Session};
use crate::optimizer::Plan;
use crate::time_range::{DayTimeMap, parse_time_text};
use crate::types::{CourseKey, TypeCode, ValidationError};

/// Most saved courses kept; older entries fall off the end.
pub const MAX_SAVED_COURSES: usize = 200;

/// Errors from selection edits that reference unknown data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("course '{key}' is not saved")]
    UnknownCourse { key: String },

    #[error("course has no {code} session with index {index}")]
    UnknownSession { code: String, index: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The choice made for one session type of a saved course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Index into the course's sessions; `None` when only `attended` was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_index: Option<usize>,
    /// Slots of the chosen session.
    #[serde(default, alias = "bitsB64")]
    pub bitmask: WeeklyBitmask,
    /// Exact meeting times per day, parsed from the session's time text.
    #[serde(default)]
    pub time_map: DayTimeMap,
    /// Copied from the session; placeholder sessions never reach the calendar.
    #[serde(default = "default_true")]
    pub relevant: bool,
    #[serde(default)]
    pub session_name: String,
    #[serde(default)]
    pub pinned: bool,
    /// Whether this type's time counts against busy-time overlap.
    #[serde(default = "default_true")]
    pub attended: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            session_index: None,
            bitmask: WeeklyBitmask::EMPTY,
            time_map: DayTimeMap::new(),
            relevant: true,
            session_name: String::new(),
            pinned: false,
            attended: true,
        }
    }
}

/// Where a session type stands in the unset/chosen/pinned lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Unset,
    Chosen { index: usize },
    Pinned { index: usize },
}

impl Selection {
    /// A selection of `session`, which sits at `index` under `code`.
    #[must_use]
    pub fn of_session(code: &TypeCode, index: usize, session: &Session) -> Self {
        let session_name = if session.name.is_empty() {
            fallback_name(code, index)
        } else {
            session.name.clone()
        };
        Self {
            session_index: Some(index),
            bitmask: session.bitmask,
            time_map: parse_time_text(&session.time_text),
            relevant: session.relevant,
            session_name,
            pinned: false,
            attended: true,
        }
    }

    #[must_use]
    pub fn state(&self) -> SelectionState {
        match (self.session_index, self.pinned) {
            (None, _) => SelectionState::Unset,
            (Some(index), false) => SelectionState::Chosen { index },
            (Some(index), true) => SelectionState::Pinned { index },
        }
    }

    /// Whether this selection should appear on the calendar.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.relevant && self.session_index.is_some()
    }

    /// Carries the user's flags from the selection this one replaces.
    ///
    /// `pinned` survives only when the same session is kept; `attended`
    /// always survives.
    fn inherit(mut self, previous: Option<&Self>) -> Self {
        if let Some(previous) = previous {
            self.pinned = previous.pinned && previous.session_index == self.session_index;
            self.attended = previous.attended;
        }
        self
    }
}

fn fallback_name(code: &TypeCode, index: usize) -> String {
    format!("{code}{}", index + 1)
}

/// A course on the user's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCourse {
    /// Lower-cased trimmed course name.
    pub key: CourseKey,
    /// Display name as the user picked it.
    pub name: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub selections: BTreeMap<TypeCode, Selection>,
}

impl SavedCourse {
    #[must_use]
    pub fn state(&self, code: &TypeCode) -> SelectionState {
        self.selections
            .get(code)
            .map_or(SelectionState::Unset, Selection::state)
    }
}

/// The user's saved courses, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionStore {
    courses: Vec<SavedCourse>,
}

impl SelectionStore {
    #[must_use]
    pub fn from_courses(courses: Vec<SavedCourse>) -> Self {
        Self { courses }
    }

    #[must_use]
    pub fn courses(&self) -> &[SavedCourse] {
        &self.courses
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.courses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &CourseKey) -> Option<&SavedCourse> {
        self.courses.iter().find(|course| &course.key == key)
    }

    fn get_mut(&mut self, key: &CourseKey) -> Result<&mut SavedCourse, SelectionError> {
        self.courses
            .iter_mut()
            .find(|course| &course.key == key)
            .ok_or_else(|| SelectionError::UnknownCourse {
                key: key.to_string(),
            })
    }

    /// Saves a course by display name. Returns `false` if it was already saved.
    pub fn add_course(&mut self, name: &str, now: DateTime<Utc>) -> Result<bool, SelectionError> {
        let key = CourseKey::from_name(name)?;
        if self.get(&key).is_some() {
            return Ok(false);
        }
        self.courses.insert(
            0,
            SavedCourse {
                key,
                name: name.trim().to_string(),
                saved_at: now,
                selections: BTreeMap::new(),
            },
        );
        self.courses.truncate(MAX_SAVED_COURSES);
        Ok(true)
    }

    /// Removes a course and all its selections.
    pub fn remove_course(&mut self, key: &CourseKey) -> bool {
        let before = self.courses.len();
        self.courses.retain(|course| &course.key != key);
        self.courses.len() != before
    }

    /// Chooses session `index` for `code`, or clears the choice with `None`.
    ///
    /// Clearing keeps an entry only when it still records a non-default
    /// attendance preference.
    pub fn choose_session(
        &mut self,
        key: &CourseKey,
        code: &TypeCode,
        index: Option<usize>,
        course: &Course,
    ) -> Result<(), SelectionError> {
        let session = index.map(|index| lookup_session(course, code, index)).transpose()?;
        let saved = self.get_mut(key)?;
        let previous = saved.selections.remove(code);

        match (index, session) {
            (Some(index), Some(session)) => {
                let selection =
                    Selection::of_session(code, index, session).inherit(previous.as_ref());
                saved.selections.insert(code.clone(), selection);
            }
            _ => {
                if let Some(previous) = previous.filter(|p| !p.attended) {
                    saved.selections.insert(
                        code.clone(),
                        Selection {
                            attended: previous.attended,
                            ..Selection::default()
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Pins session `index` for `code`, or flips the pin if it is already the
    /// chosen session. Returns whether the type is pinned afterwards.
    pub fn toggle_pin(
        &mut self,
        key: &CourseKey,
        code: &TypeCode,
        index: usize,
        course: &Course,
    ) -> Result<bool, SelectionError> {
        let session = lookup_session(course, code, index)?;
        let saved = self.get_mut(key)?;

        match saved.selections.get_mut(code) {
            Some(current) if current.session_index == Some(index) => {
                current.pinned = !current.pinned;
                Ok(current.pinned)
            }
            current => {
                let attended = current.is_none_or(|c| c.attended);
                let selection = Selection {
                    pinned: true,
                    attended,
                    ..Selection::of_session(code, index, session)
                };
                saved.selections.insert(code.clone(), selection);
                Ok(true)
            }
        }
    }

    /// Sets whether `code` counts as attended, creating an entry if needed.
    pub fn set_attended(
        &mut self,
        key: &CourseKey,
        code: &TypeCode,
        attended: bool,
    ) -> Result<(), SelectionError> {
        let saved = self.get_mut(key)?;
        saved.selections.entry(code.clone()).or_default().attended = attended;
        Ok(())
    }

    /// Applies an optimizer plan to every saved course it can resolve.
    ///
    /// Types are visited in catalog order; types the plan does not address
    /// are left alone. Returns the number of selections written.
    pub fn apply_plan(&mut self, plan: &Plan, courses: &impl CourseLookup) -> usize {
        let mut written = 0;
        for saved in &mut self.courses {
            let Some(course) = courses.course(&saved.key) else {
                continue;
            };
            for code in &course.types {
                let Some(index) = plan.index_for(&saved.key, code) else {
                    continue;
                };
                let selection = match course.session(index) {
                    Some(session) => Selection::of_session(code, index, session),
                    None => {
                        tracing::warn!(course = %saved.key, %code, index, "plan assigns unknown session");
                        Selection {
                            session_index: Some(index),
                            session_name: fallback_name(code, index),
                            ..Selection::default()
                        }
                    }
                };
                let selection = selection.inherit(saved.selections.get(code));
                saved.selections.insert(code.clone(), selection);
                written += 1;
            }
        }
        written
    }
}

fn lookup_session<'a>(
    course: &'a Course,
    code: &TypeCode,
    index: usize,
) -> Result<&'a Session, SelectionError> {
    if !course.has_session(code, index) {
        return Err(SelectionError::UnknownSession {
            code: code.to_string(),
            index,
        });
    }
    course
        .session(index)
        .ok_or_else(|| SelectionError::UnknownSession {
            code: code.to_string(),
            index,
        })
}
