//! Autoschedule command.
//!
//! The first trigger asks the optimizer for every optimal plan and applies the
//! best one. Later triggers step through the cached plans without another
//! request, until any edit to courses, selections or busy time drops the
//! cache. `--refresh` skips the cache and asks the optimizer again.

use std::io::Write;

use anyhow::{Result, bail};
use nd_core::optimizer::{AutoscheduleGuard, AutoscheduleOutcome};
use nd_core::planner::AutoscheduleReport;

use super::session::PlannerSession;
use super::source::CourseSource;

pub async fn run<W: Write>(
    writer: &mut W,
    session: &mut PlannerSession,
    source: &CourseSource,
    guard: &AutoscheduleGuard,
    refresh: bool,
) -> Result<()> {
    let report = trigger(session, source, guard, refresh).await?;
    writeln!(writer, "{}", report.message)?;
    Ok(())
}

async fn trigger(
    session: &mut PlannerSession,
    source: &CourseSource,
    guard: &AutoscheduleGuard,
    refresh: bool,
) -> Result<AutoscheduleReport> {
    let cached = if refresh {
        None
    } else {
        session.planner_mut().cycle_plan()
    };
    if let Some(report) = cached {
        return Ok(report);
    }

    let Some(request) = session.planner().autoschedule_request() else {
        return Ok(AutoscheduleReport::nothing_to_schedule());
    };
    let Some(client) = source.client() else {
        bail!("autoschedule needs a course server; set server_url in the config");
    };
    let Some(_in_flight) = guard.try_begin() else {
        bail!("an autoschedule request is already running");
    };

    tracing::debug!(courses = request.courses.len(), "requesting plans");
    let outcome = client.autoschedule(&request).await;
    if let AutoscheduleOutcome::Plans(plans) = &outcome {
        tracing::info!(plans = plans.len(), "received plans");
    }
    Ok(session.planner_mut().accept_outcome(outcome))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use insta::assert_snapshot;
    use nd_core::optimizer::{Assignment, Plan, PlanCycler, PlanSummary};
    use nd_core::types::{CourseKey, TypeCode};
    use nd_db::Database;

    use super::*;
    use crate::commands::source::fixtures;

    fn plan(index: usize, gaps: u32) -> Plan {
        Plan {
            assignments: vec![Assignment {
                course_key: CourseKey::new("csci 151 programming").unwrap(),
                type_code: TypeCode::new("L").unwrap(),
                session_index: index,
            }],
            summary: PlanSummary {
                busy_overlap_minutes: 0,
                gap_minutes: gaps,
            },
        }
    }

    fn cached_plans() -> PlanCycler {
        let mut plans = PlanCycler::default();
        plans.load(vec![plan(0, 15), plan(1, 45)]);
        plans
    }

    /// A saved course plus plans cached by an earlier trigger.
    async fn session_with_cached_plans(source: &CourseSource) -> PlannerSession {
        let db = Database::open_in_memory().unwrap();
        let mut session = PlannerSession::open(db, source).await.unwrap();
        session
            .planner_mut()
            .add_course("CSCI 151 Programming", Utc::now())
            .unwrap();
        let mut db = session.finish().unwrap().0;
        db.save_plans(&cached_plans()).unwrap();
        PlannerSession::open(db, source).await.unwrap()
    }

    #[tokio::test]
    async fn empty_list_needs_courses_first() {
        let db = Database::open_in_memory().unwrap();
        let source = fixtures::local();
        let mut session = PlannerSession::open(db, &source).await.unwrap();
        let mut out = Vec::new();
        run(&mut out, &mut session, &source, &AutoscheduleGuard::default(), false)
            .await
            .unwrap();
        assert_snapshot!(String::from_utf8(out).unwrap(), @"Add courses first.");
    }

    #[tokio::test]
    async fn edits_drop_cached_plans() {
        let source = fixtures::local();
        let mut session = session_with_cached_plans(&source).await;
        session
            .planner_mut()
            .add_course("MATH 161 Calculus", Utc::now())
            .unwrap();
        let mut out = Vec::new();
        let err = run(&mut out, &mut session, &source, &AutoscheduleGuard::default(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("needs a course server"));
    }

    #[tokio::test]
    async fn cached_plans_cycle_without_a_server() {
        let source = fixtures::local();
        let mut session = session_with_cached_plans(&source).await;
        let mut out = Vec::new();
        let guard = AutoscheduleGuard::default();
        run(&mut out, &mut session, &source, &guard, false).await.unwrap();
        run(&mut out, &mut session, &source, &guard, false).await.unwrap();
        assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        Busy clash: 0m · Gaps: 45m (2/2)
        Busy clash: 0m · Gaps: 15m (1/2)
        ");

        let key = CourseKey::new("csci 151 programming").unwrap();
        let saved = session.planner().store().get(&key).unwrap();
        assert_eq!(
            saved.selections[&TypeCode::new("L").unwrap()].session_name,
            "L1"
        );
    }

    #[tokio::test]
    async fn refresh_skips_the_cache() {
        let source = fixtures::local();
        let mut session = session_with_cached_plans(&source).await;
        let mut out = Vec::new();
        let result = run(&mut out, &mut session, &source, &AutoscheduleGuard::default(), true).await;
        assert!(result.is_err());
        assert!(out.is_empty());
        assert!(!session.planner().plans().is_empty());
    }
}
