//! Request/response contract of the external autoscheduler.
//!
//! The optimizer itself is a remote service; this module builds its payload
//! from saved selections, interprets its answer, and keeps the returned plans
//! around so repeated triggers can cycle through equally good alternatives.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::bitmask::WeeklyBitmask;
use crate::catalog::CourseLookup;
use crate::selection::SelectionStore;
use crate::types::{CourseKey, TypeCode};

/// Shown when there is nothing to schedule.
pub const NO_COURSES_MESSAGE: &str = "Add courses first.";
/// Shown when the optimizer could not be reached or answered garbage.
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Failed to contact autoscheduler.";
/// Shown when the optimizer found nothing and gave no reason.
pub const NO_PLAN_MESSAGE: &str = "No plan found.";

/// Payload of `POST /api/autoschedule`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscheduleRequest {
    #[serde(alias = "busyBitsB64")]
    pub busy_bitmask_base64: WeeklyBitmask,
    pub courses: Vec<CoursePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoursePayload {
    pub key: CourseKey,
    pub name: String,
    pub types: Vec<TypePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypePayload {
    pub code: TypeCode,
    /// Session the optimizer must keep, if the user pinned a schedulable one.
    pub pinned_index: Option<usize>,
    /// Whether this type's time counts against busy-time overlap.
    pub attend_important: bool,
    /// Candidate sessions; placeholder-time sessions are never offered.
    pub sessions: Vec<SessionPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub index: usize,
    #[serde(alias = "bitsB64")]
    pub bitmask_base64: WeeklyBitmask,
}

/// Body of the optimizer's answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscheduleResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_optimal: Option<Vec<Plan>>,
}

/// One complete assignment of sessions to saved course types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub summary: PlanSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub course_key: CourseKey,
    pub type_code: TypeCode,
    pub session_index: usize,
}

/// Objective values of a plan, in minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    #[serde(default, alias = "busyOverlapMin")]
    pub busy_overlap_minutes: u32,
    #[serde(default, alias = "gapMin")]
    pub gap_minutes: u32,
}

impl Plan {
    /// Session index this plan assigns to `(course, code)`.
    #[must_use]
    pub fn index_for(&self, course: &CourseKey, code: &TypeCode) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| &a.course_key == course && &a.type_code == code)
            .map(|a| a.session_index)
    }
}

/// Builds the optimizer payload, or `None` when no saved course has catalog
/// data.
///
/// Every type of every known course is listed in catalog order. Sessions
/// with placeholder times are left out, and a pin is only forwarded when the
/// pinned session is one of the offered candidates.
pub fn build_request(
    store: &SelectionStore,
    busy: &WeeklyBitmask,
    courses: &impl CourseLookup,
) -> Option<AutoscheduleRequest> {
    let mut payload = Vec::new();
    for saved in store.courses() {
        let Some(course) = courses.course(&saved.key) else {
            tracing::debug!(course = %saved.key, "no catalog data; leaving course out of request");
            continue;
        };

        let types = course
            .types
            .iter()
            .map(|code| {
                let selection = saved.selections.get(code);
                let sessions: Vec<SessionPayload> = course
                    .sessions_of(code)
                    .iter()
                    .filter_map(|&index| {
                        let session = course.session(index)?;
                        session.relevant.then_some(SessionPayload {
                            index,
                            bitmask_base64: session.bitmask,
                        })
                    })
                    .collect();
                let pinned_index = selection
                    .filter(|s| s.pinned)
                    .and_then(|s| s.session_index)
                    .filter(|&index| course.session(index).is_some_and(|s| s.relevant));
                TypePayload {
                    code: code.clone(),
                    pinned_index,
                    attend_important: selection.is_none_or(|s| s.attended),
                    sessions,
                }
            })
            .collect();

        payload.push(CoursePayload {
            key: saved.key.clone(),
            name: saved.name.clone(),
            types,
        });
    }

    if payload.is_empty() {
        return None;
    }
    Some(AutoscheduleRequest {
        busy_bitmask_base64: *busy,
        courses: payload,
    })
}

/// What came of one optimizer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoscheduleOutcome {
    /// At least one plan, best first.
    Plans(Vec<Plan>),
    /// The request never produced a readable answer.
    TransportFailure(String),
    /// The service answered with a non-success status.
    Rejected { status: u16 },
    /// The service answered but found nothing feasible.
    NoPlan { message: Option<String> },
}

impl AutoscheduleResponse {
    /// Prefers the full list of optimal plans over the single chosen plan.
    #[must_use]
    pub fn into_outcome(self) -> AutoscheduleOutcome {
        if !self.ok {
            return AutoscheduleOutcome::NoPlan {
                message: self.message,
            };
        }
        let plans = match (self.all_optimal, self.chosen_plan) {
            (Some(all), _) if !all.is_empty() => all,
            (_, Some(chosen)) => vec![chosen],
            _ => Vec::new(),
        };
        if plans.is_empty() {
            AutoscheduleOutcome::NoPlan { message: None }
        } else {
            AutoscheduleOutcome::Plans(plans)
        }
    }
}

impl AutoscheduleOutcome {
    /// User-facing text for outcomes that did not yield a plan.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Plans(_) => None,
            Self::TransportFailure(_) => Some(TRANSPORT_FAILURE_MESSAGE.to_string()),
            Self::Rejected { status } => Some(format!("autoscheduler error ({status})")),
            Self::NoPlan { message } => Some(
                message
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .unwrap_or(NO_PLAN_MESSAGE)
                    .to_string(),
            ),
        }
    }
}

/// Cached optimizer plans and the one currently applied.
///
/// The first trigger fills the cache and applies plan 0; later triggers step
/// through the cache without a new request. Any edit to planner state clears
/// it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCycler {
    plans: Vec<Plan>,
    pick: usize,
}

impl PlanCycler {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn invalidate(&mut self) {
        self.plans.clear();
        self.pick = 0;
    }

    /// Replaces the cache and selects the first plan.
    pub fn load(&mut self, plans: Vec<Plan>) -> Option<&Plan> {
        self.plans = plans;
        self.pick = 0;
        self.plans.first()
    }

    /// Moves to the next cached plan, wrapping around.
    pub fn advance(&mut self) -> Option<&Plan> {
        if self.plans.is_empty() {
            return None;
        }
        self.pick = (self.pick + 1) % self.plans.len();
        self.plans.get(self.pick)
    }

    #[must_use]
    pub fn current(&self) -> Option<&Plan> {
        self.plans.get(self.pick)
    }

    /// `"Busy clash: 30m · Gaps: 90m (2/3)"`; the counter only appears when
    /// there is more than one plan.
    #[must_use]
    pub fn summary_message(&self) -> Option<String> {
        let summary = self.current()?.summary;
        let counter = if self.plans.len() > 1 {
            format!(" ({}/{})", self.pick + 1, self.plans.len())
        } else {
            String::new()
        };
        Some(format!(
            "Busy clash: {}m \u{b7} Gaps: {}m{counter}",
            summary.busy_overlap_minutes, summary.gap_minutes
        ))
    }
}

/// Refuses a second optimizer request while one is outstanding.
#[derive(Debug, Default)]
pub struct AutoscheduleGuard {
    in_flight: AtomicBool,
}

/// Marks a request as outstanding until dropped.
#[derive(Debug)]
pub struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl AutoscheduleGuard {
    /// Claims the single request slot, or `None` if a request is running.
    pub fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                flag: &self.in_flight,
            })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
