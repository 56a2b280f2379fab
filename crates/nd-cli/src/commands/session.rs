//! Loads planner state from the database and writes it back after a command.
//!
//! Every command that edits the plan goes through a [`PlannerSession`]: the
//! edits only request reconciliation, and [`PlannerSession::finish`] runs the
//! single pending pass against the stored calendar before persisting.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::Local;
use nd_core::calendar::WeekAnchor;
use nd_core::course::Course;
use nd_core::planner::Planner;
use nd_core::reconcile::ReconcileReport;
use nd_core::types::CourseKey;
use nd_db::Database;

use super::source::CourseSource;
use super::util::parse_course_key;

pub type CoursePlanner = Planner<BTreeMap<CourseKey, Course>>;

pub struct PlannerSession {
    db: Database,
    planner: CoursePlanner,
}

impl PlannerSession {
    /// Loads saved courses, busy time, the displayed week and cached plans.
    ///
    /// Without a stored week, events are laid out on the current week.
    pub async fn open(db: Database, source: &CourseSource) -> Result<Self> {
        let store = db.load_store().context("failed to load saved courses")?;
        let busy = db.busy_mask().context("failed to load busy time")?;
        let week = db
            .week_anchor()
            .context("failed to load calendar week")?
            .unwrap_or_else(|| WeekAnchor::containing(Local::now().date_naive()));
        let plans = db.load_plans().context("failed to load cached plans")?;
        let courses = source.saved_courses(&store).await;

        let planner = Planner::new(store, busy, week, courses).with_plans(plans);
        Ok(Self { db, planner })
    }

    pub const fn planner(&self) -> &CoursePlanner {
        &self.planner
    }

    pub const fn planner_mut(&mut self) -> &mut CoursePlanner {
        &mut self.planner
    }

    pub const fn db(&self) -> &Database {
        &self.db
    }

    pub const fn db_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    /// Resolves a user-typed key to a saved course: the exact key, or the
    /// only saved key starting with it.
    pub fn saved_key(&self, raw: &str) -> Result<CourseKey> {
        let key = parse_course_key(raw)?;
        let store = self.planner.store();
        if store.get(&key).is_some() {
            return Ok(key);
        }
        let matches: Vec<&CourseKey> = store
            .courses()
            .iter()
            .map(|saved| &saved.key)
            .filter(|saved| saved.as_str().starts_with(key.as_str()))
            .collect();
        match matches.as_slice() {
            [only] => Ok((*only).clone()),
            [] => bail!("no saved course matches '{raw}'"),
            _ => bail!(
                "'{raw}' matches several saved courses: {}",
                matches
                    .iter()
                    .map(|key| key.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Runs the pending reconciliation pass and persists all state.
    pub fn finish(mut self) -> Result<(Database, Option<ReconcileReport>)> {
        let report = self
            .planner
            .flush(&mut self.db)
            .context("failed to reconcile calendar")?;
        let week = self.planner.week();
        let (store, plans) = self.planner.into_parts();

        self.db.save_store(&store).context("failed to save courses")?;
        self.db.save_plans(&plans).context("failed to save plans")?;
        self.db
            .set_week_anchor(week)
            .context("failed to save calendar week")?;
        Ok((self.db, report))
    }
}
