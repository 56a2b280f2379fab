//! Keeps a live calendar's course events in line with the saved selections.
//!
//! Every pass recomputes the desired course events from scratch and diffs
//! them by id against the course events already on the calendar:
//!
//! - id on both sides, visible fields differ: update in place
//! - id only desired: add
//! - id only live: remove
//!
//! Busy events are outside the diff and never touched. Because the desired
//! set is a pure function of the selections, the busy mask and the week, a
//! second pass over unchanged state performs no operations.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::bitmask::{Interval, WeeklyBitmask};
use crate::calendar::{
    COURSE_TEXT_COLOR, CalendarEvent, CourseRef, EventOrigin, LiveCalendar, WeekAnchor,
    course_color,
};
use crate::selection::{Selection, SelectionStore};
use crate::types::{CourseKey, TypeCode};

/// Tag carried by every course event.
pub const COURSE_TAG: &str = "course";
/// Tag on events of pinned selections.
pub const PINNED_TAG: &str = "pinned";
/// Tag on events that overlap busy time.
pub const CLASH_TAG: &str = "clash";

/// Stable identity of a course event.
#[must_use]
pub fn event_id(key: &CourseKey, code: &TypeCode, interval: &Interval) -> String {
    format!(
        "{key}:{code}:{}:{}-{}",
        interval.day.index(),
        interval.start_minute,
        interval.end_minute
    )
}

/// Computes every course event the calendar should show for `week`.
pub fn desired_events(
    store: &SelectionStore,
    busy: &WeeklyBitmask,
    week: WeekAnchor,
) -> BTreeMap<String, CalendarEvent> {
    let mut desired = BTreeMap::new();
    for saved in store.courses() {
        let color = course_color(&saved.key);
        for (code, selection) in &saved.selections {
            let Some(session_index) = selection.session_index.filter(|_| selection.relevant) else {
                continue;
            };
            let label = if selection.session_name.is_empty() {
                code.as_str()
            } else {
                selection.session_name.as_str()
            };

            for run in selection.bitmask.decode() {
                let interval = display_interval(selection, run);
                let mut slots = WeeklyBitmask::EMPTY;
                slots.insert_slots(run.day, run.start_slot(), run.end_slot());

                let mut tags = vec![COURSE_TAG.to_string(), format!("course-{}", saved.key)];
                if selection.pinned {
                    tags.push(PINNED_TAG.to_string());
                }
                if slots.intersects(busy) {
                    tags.push(CLASH_TAG.to_string());
                }

                let id = event_id(&saved.key, code, &interval);
                desired.insert(
                    id.clone(),
                    CalendarEvent {
                        id,
                        title: format!("{} \u{2014} {label}", saved.name),
                        start: week.at(interval.day, interval.start_minute),
                        end: week.at(interval.day, interval.end_minute),
                        background_color: color.clone(),
                        text_color: COURSE_TEXT_COLOR.to_string(),
                        tags,
                        origin: EventOrigin::Course,
                        course: Some(CourseRef {
                            course_key: saved.key.clone(),
                            type_code: code.clone(),
                            session_index,
                        }),
                    },
                );
            }
        }
    }
    desired
}

/// The exact meeting time for a decoded run when the parsed time map has one
/// that quantizes to the same slots, otherwise the run's grid bounds.
fn display_interval(selection: &Selection, run: Interval) -> Interval {
    let Some(range) = selection.time_map.get(&run.day) else {
        return run;
    };
    let precise = Interval {
        day: run.day,
        start_minute: range.start_minute,
        end_minute: range.end_minute,
    };
    if precise.start_slot() == run.start_slot() && precise.end_slot() == run.end_slot() {
        precise
    } else {
        run
    }
}

/// One change to a live calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOp {
    Add(CalendarEvent),
    Update(CalendarEvent),
    Remove(String),
}

impl ReconcileOp {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Add(event) | Self::Update(event) => &event.id,
            Self::Remove(id) => id,
        }
    }
}

impl fmt::Display for ReconcileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(event) => write!(f, "+ {}", event.id),
            Self::Update(event) => write!(f, "~ {}", event.id),
            Self::Remove(id) => write!(f, "- {id}"),
        }
    }
}

/// The operations that turn the course events of `live` into `desired`.
///
/// Adds and updates come first in id order, then removals in id order.
#[must_use]
pub fn diff(desired: &BTreeMap<String, CalendarEvent>, live: &[CalendarEvent]) -> Vec<ReconcileOp> {
    let current: HashMap<&str, &CalendarEvent> = live
        .iter()
        .filter(|event| event.is_course())
        .map(|event| (event.id.as_str(), event))
        .collect();

    let mut ops: Vec<ReconcileOp> = desired
        .values()
        .filter_map(|wanted| match current.get(wanted.id.as_str()) {
            Some(existing) if !existing.differs_visibly(wanted) => None,
            Some(_) => Some(ReconcileOp::Update(wanted.clone())),
            None => Some(ReconcileOp::Add(wanted.clone())),
        })
        .collect();

    let mut stale: Vec<&str> = current
        .keys()
        .copied()
        .filter(|id| !desired.contains_key(*id))
        .collect();
    stale.sort_unstable();
    ops.extend(stale.into_iter().map(|id| ReconcileOp::Remove(id.to_string())));
    ops
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub ops: Vec<ReconcileOp>,
    /// Course events that were already correct.
    pub unchanged: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn added(&self) -> usize {
        self.count(|op| matches!(op, ReconcileOp::Add(_)))
    }

    #[must_use]
    pub fn updated(&self) -> usize {
        self.count(|op| matches!(op, ReconcileOp::Update(_)))
    }

    #[must_use]
    pub fn removed(&self) -> usize {
        self.count(|op| matches!(op, ReconcileOp::Remove(_)))
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    fn count(&self, pred: impl Fn(&ReconcileOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }
}

/// Runs one reconciliation pass against `calendar`.
pub fn reconcile<C: LiveCalendar>(
    calendar: &mut C,
    store: &SelectionStore,
    busy: &WeeklyBitmask,
    week: WeekAnchor,
) -> Result<ReconcileReport, C::Error> {
    let desired = desired_events(store, busy, week);
    let live = calendar.events()?;
    let ops = diff(&desired, &live);

    for op in &ops {
        match op {
            ReconcileOp::Add(event) => calendar.add_event(event.clone())?,
            ReconcileOp::Update(event) => calendar.update_event(event.clone())?,
            ReconcileOp::Remove(id) => calendar.remove_event(id)?,
        }
    }

    let changed = ops
        .iter()
        .filter(|op| !matches!(op, ReconcileOp::Remove(_)))
        .count();
    let report = ReconcileReport {
        ops,
        unchanged: desired.len() - changed,
    };
    tracing::info!(
        %week,
        added = report.added(),
        updated = report.updated(),
        removed = report.removed(),
        unchanged = report.unchanged,
        "reconciled calendar"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::calendar::{Calendar, busy_mask};
    use crate::course::{Course, Session};
    use crate::merge::time_text_bitmask;

    fn session(name: &str, time_text: &str) -> Session {
        Session {
            name: name.to_string(),
            session_type: name.trim_end_matches(char::is_numeric).to_string(),
            time_text: time_text.to_string(),
            bitmask: time_text_bitmask(time_text),
            relevant: true,
            available: true,
            enrollment: String::new(),
            professors: Vec::new(),
        }
    }

    fn course() -> Course {
        Course::new(
            "CSCI 151",
            "8",
            vec![
                session("L1", "MW 09:00AM-10:15AM"),
                session("L2", "TR 01:30PM-02:45PM"),
                session("R1", "M 09:00AM-09:50AM; M 01:00PM-01:50PM"),
                session("Lab1", "S 11:00PM-11:50PM 11"),
            ],
        )
    }

    fn key() -> CourseKey {
        CourseKey::from_name("CSCI 151").unwrap()
    }

    fn code(value: &str) -> TypeCode {
        TypeCode::new(value).unwrap()
    }

    fn week() -> WeekAnchor {
        WeekAnchor::containing(NaiveDate::from_ymd_opt(2025, 9, 3).unwrap())
    }

    fn store_with_lecture(index: usize) -> SelectionStore {
        let mut store = SelectionStore::default();
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap();
        store.add_course("CSCI 151", now).unwrap();
        store
            .choose_session(&key(), &code("L"), Some(index), &course())
            .unwrap();
        store
    }

    fn course_ids(calendar: &Calendar) -> Vec<String> {
        calendar
            .iter()
            .filter(|event| event.is_course())
            .map(|event| event.id.clone())
            .collect()
    }

    #[test]
    fn first_pass_adds_and_second_pass_is_noop() {
        let store = store_with_lecture(0);
        let mut calendar = Calendar::new();

        let first = reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();
        assert_eq!(first.added(), 2);
        insta::assert_debug_snapshot!(course_ids(&calendar), @r#"
        [
            "csci 151:L:0:540-615",
            "csci 151:L:2:540-615",
        ]
        "#);

        let second = reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn events_carry_observable_fields() {
        let store = store_with_lecture(0);
        let desired = desired_events(&store, &WeeklyBitmask::EMPTY, week());
        let monday = &desired["csci 151:L:0:540-615"];
        assert_eq!(monday.title, "CSCI 151 \u{2014} L1");
        assert_eq!(
            monday.start,
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap().and_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(
            monday.end,
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap().and_hms_opt(10, 15, 0).unwrap()
        );
        assert_eq!(monday.background_color, course_color(&key()));
        assert_eq!(monday.text_color, "#fff");
        assert_eq!(monday.tags, vec!["course", "course-csci 151"]);
        assert_eq!(
            monday.course,
            Some(CourseRef {
                course_key: key(),
                type_code: code("L"),
                session_index: 0,
            })
        );
    }

    #[test]
    fn busy_events_are_never_touched() {
        let store = store_with_lecture(0);
        let mut calendar = Calendar::new();
        let start = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let busy_event = CalendarEvent::busy("gym", start, start + chrono::Duration::hours(1));
        calendar.insert(busy_event.clone());

        let report = reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();
        assert!(report.ops.iter().all(|op| op.id() != "gym"));

        let empty = SelectionStore::default();
        let report = reconcile(&mut calendar, &empty, &WeeklyBitmask::EMPTY, week()).unwrap();
        assert_eq!(report.removed(), 2);
        assert_eq!(calendar.len(), 1);
        assert_eq!(calendar.get("gym"), Some(&busy_event));
    }

    #[test]
    fn pin_toggle_updates_in_place() {
        let mut store = store_with_lecture(0);
        let mut calendar = Calendar::new();
        reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();

        store.toggle_pin(&key(), &code("L"), 0, &course()).unwrap();
        let report = reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();
        assert_eq!(report.updated(), 2);
        assert_eq!(report.added() + report.removed(), 0);
        assert!(
            calendar
                .get("csci 151:L:2:540-615")
                .unwrap()
                .tags
                .contains(&PINNED_TAG.to_string())
        );
    }

    #[test]
    fn changing_session_swaps_events() {
        let mut store = store_with_lecture(0);
        let mut calendar = Calendar::new();
        reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();

        store
            .choose_session(&key(), &code("L"), Some(1), &course())
            .unwrap();
        let report = reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();
        let ops: Vec<String> = report.ops.iter().map(ToString::to_string).collect();
        assert_eq!(
            ops,
            vec![
                "+ csci 151:L:1:810-885",
                "+ csci 151:L:3:810-885",
                "- csci 151:L:0:540-615",
                "- csci 151:L:2:540-615",
            ]
        );
    }

    #[test]
    fn time_map_is_used_only_when_it_matches_the_run() {
        let mut store = store_with_lecture(0);
        store
            .choose_session(&key(), &code("R"), Some(2), &course())
            .unwrap();
        let desired = desired_events(&store, &WeeklyBitmask::EMPTY, week());
        assert!(desired.contains_key("csci 151:R:0:540-590"));
        assert!(desired.contains_key("csci 151:R:0:780-840"));
    }

    #[test]
    fn busy_overlap_is_tagged_and_changes_with_the_mask() {
        let store = store_with_lecture(0);
        let mut calendar = Calendar::new();
        reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();

        let start = NaiveDate::from_ymd_opt(2025, 9, 3).unwrap().and_hms_opt(9, 30, 0).unwrap();
        let gym = CalendarEvent::busy("gym", start, start + chrono::Duration::hours(1));
        let busy = busy_mask([&gym]);

        let report = reconcile(&mut calendar, &store, &busy, week()).unwrap();
        assert_eq!(report.updated(), 1);
        assert_eq!(report.ops[0].id(), "csci 151:L:2:540-615");
        assert!(
            calendar
                .get("csci 151:L:2:540-615")
                .unwrap()
                .tags
                .contains(&CLASH_TAG.to_string())
        );
    }

    #[test]
    fn placeholder_and_attend_only_selections_are_hidden() {
        let mut store = store_with_lecture(0);
        store
            .choose_session(&key(), &code("Lab"), Some(3), &course())
            .unwrap();
        store.set_attended(&key(), &code("R"), false).unwrap();

        let desired = desired_events(&store, &WeeklyBitmask::EMPTY, week());
        assert_eq!(desired.len(), 2);
        assert!(desired.keys().all(|id| id.starts_with("csci 151:L:")));
    }

    #[test]
    fn desired_set_ignores_prior_calendar_state() {
        let store = store_with_lecture(1);
        let mut calendar = Calendar::new();
        let mut stray = desired_events(&store, &WeeklyBitmask::EMPTY, week())
            .into_values()
            .next()
            .unwrap();
        stray.title = "stale".into();
        calendar.insert(stray);

        let report = reconcile(&mut calendar, &store, &WeeklyBitmask::EMPTY, week()).unwrap();
        assert_eq!((report.added(), report.updated()), (1, 1));
        assert_eq!(
            calendar.get("csci 151:L:1:810-885").unwrap().title,
            "CSCI 151 \u{2014} L2"
        );
    }
}
