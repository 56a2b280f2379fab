//! Planner state and the coalescing reconcile scheduler.
//!
//! Mutations write to the [`Planner`]'s state and only *request* a
//! reconciliation. The host calls [`Planner::flush`] at its next opportunity
//! (a frame, the end of a command), which runs at most one pass against the
//! state as it is at that moment. A burst of edits therefore costs one pass.

use chrono::{DateTime, Utc};

use crate::bitmask::WeeklyBitmask;
use crate::calendar::{LiveCalendar, WeekAnchor};
use crate::catalog::CourseLookup;
use crate::optimizer::{
    AutoscheduleOutcome, AutoscheduleRequest, NO_COURSES_MESSAGE, NO_PLAN_MESSAGE, Plan,
    PlanCycler, build_request,
};
use crate::reconcile::{ReconcileReport, reconcile};
use crate::selection::{SelectionError, SelectionStore};
use crate::types::{CourseKey, TypeCode};

/// Single-slot debounce: at most one pass is ever outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileScheduler {
    pending: bool,
}

impl ReconcileScheduler {
    /// Marks a pass as pending. Returns `false` if one already was.
    pub fn request(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// Clears the pending flag, returning whether a pass should run.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

/// Result of an autoschedule trigger, ready to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoscheduleReport {
    /// Whether a plan was written into the selections.
    pub applied: bool,
    pub message: String,
}

impl AutoscheduleReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            applied: false,
            message: message.into(),
        }
    }

    /// Report for a trigger with no saved course to schedule.
    #[must_use]
    pub fn nothing_to_schedule() -> Self {
        Self::failed(NO_COURSES_MESSAGE)
    }
}

/// Everything a reconciliation pass reads, plus the cached optimizer plans.
#[derive(Debug)]
pub struct Planner<L> {
    store: SelectionStore,
    busy: WeeklyBitmask,
    week: WeekAnchor,
    courses: L,
    plans: PlanCycler,
    scheduler: ReconcileScheduler,
}

impl<L: CourseLookup> Planner<L> {
    /// Loads planner state; the initial load itself requests a pass.
    pub fn new(store: SelectionStore, busy: WeeklyBitmask, week: WeekAnchor, courses: L) -> Self {
        let mut scheduler = ReconcileScheduler::default();
        scheduler.request();
        Self {
            store,
            busy,
            week,
            courses,
            plans: PlanCycler::default(),
            scheduler,
        }
    }

    /// Restores plans cached by an earlier trigger.
    #[must_use]
    pub fn with_plans(mut self, plans: PlanCycler) -> Self {
        self.plans = plans;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &SelectionStore {
        &self.store
    }

    #[must_use]
    pub const fn busy(&self) -> &WeeklyBitmask {
        &self.busy
    }

    #[must_use]
    pub const fn week(&self) -> WeekAnchor {
        self.week
    }

    #[must_use]
    pub const fn plans(&self) -> &PlanCycler {
        &self.plans
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Records a state edit: stale plans are dropped and a pass is requested.
    fn changed(&mut self) {
        self.plans.invalidate();
        self.scheduler.request();
    }

    pub fn add_course(&mut self, name: &str, now: DateTime<Utc>) -> Result<bool, SelectionError> {
        let added = self.store.add_course(name, now)?;
        if added {
            self.changed();
        }
        Ok(added)
    }

    pub fn remove_course(&mut self, key: &CourseKey) -> bool {
        let removed = self.store.remove_course(key);
        if removed {
            self.changed();
        }
        removed
    }

    pub fn choose_session(
        &mut self,
        key: &CourseKey,
        code: &TypeCode,
        index: Option<usize>,
    ) -> Result<(), SelectionError> {
        let course = self
            .courses
            .course(key)
            .ok_or_else(|| SelectionError::UnknownCourse {
                key: key.to_string(),
            })?;
        self.store.choose_session(key, code, index, course)?;
        self.changed();
        Ok(())
    }

    pub fn toggle_pin(
        &mut self,
        key: &CourseKey,
        code: &TypeCode,
        index: usize,
    ) -> Result<bool, SelectionError> {
        let course = self
            .courses
            .course(key)
            .ok_or_else(|| SelectionError::UnknownCourse {
                key: key.to_string(),
            })?;
        let pinned = self.store.toggle_pin(key, code, index, course)?;
        self.changed();
        Ok(pinned)
    }

    pub fn set_attended(
        &mut self,
        key: &CourseKey,
        code: &TypeCode,
        attended: bool,
    ) -> Result<(), SelectionError> {
        self.store.set_attended(key, code, attended)?;
        self.changed();
        Ok(())
    }

    pub fn set_busy(&mut self, busy: WeeklyBitmask) {
        if busy != self.busy {
            self.busy = busy;
            self.changed();
        }
    }

    /// Moves the displayed week. Plans stay valid; only the layout changes.
    pub fn set_week(&mut self, week: WeekAnchor) {
        if week != self.week {
            self.week = week;
            self.scheduler.request();
        }
    }

    /// Writes `plan` into the selections without invalidating cached plans.
    pub fn apply_plan(&mut self, plan: &Plan) -> usize {
        let written = self.store.apply_plan(plan, &self.courses);
        self.scheduler.request();
        written
    }

    /// The optimizer payload for the current state.
    #[must_use]
    pub fn autoschedule_request(&self) -> Option<AutoscheduleRequest> {
        build_request(&self.store, &self.busy, &self.courses)
    }

    /// Steps to the next cached plan and applies it, if plans are cached.
    pub fn cycle_plan(&mut self) -> Option<AutoscheduleReport> {
        let plan = self.plans.advance()?.clone();
        Some(self.apply_current(&plan))
    }

    /// Takes an optimizer answer: caches and applies the first plan, or
    /// explains why nothing was applied.
    pub fn accept_outcome(&mut self, outcome: AutoscheduleOutcome) -> AutoscheduleReport {
        if let AutoscheduleOutcome::Plans(plans) = outcome {
            let Some(plan) = self.plans.load(plans).cloned() else {
                return AutoscheduleReport::failed(NO_PLAN_MESSAGE);
            };
            return self.apply_current(&plan);
        }
        if let AutoscheduleOutcome::TransportFailure(reason) = &outcome {
            tracing::warn!(%reason, "autoscheduler request failed");
        }
        AutoscheduleReport::failed(outcome.failure_message().unwrap_or_default())
    }

    fn apply_current(&mut self, plan: &Plan) -> AutoscheduleReport {
        self.apply_plan(plan);
        AutoscheduleReport {
            applied: true,
            message: self.plans.summary_message().unwrap_or_default(),
        }
    }

    /// Runs the pending pass, if any, against the current state.
    pub fn flush<C: LiveCalendar>(
        &mut self,
        calendar: &mut C,
    ) -> Result<Option<ReconcileReport>, C::Error> {
        if !self.scheduler.take() {
            return Ok(None);
        }
        reconcile(calendar, &self.store, &self.busy, self.week).map(Some)
    }

    /// Hands back the state for persistence.
    #[must_use]
    pub fn into_parts(self) -> (SelectionStore, PlanCycler) {
        (self.store, self.plans)
    }
}
