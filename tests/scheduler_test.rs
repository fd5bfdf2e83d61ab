//! Integration tests for the scheduler: overdue detection plus recurrence,
//! driven tick by tick with a steerable clock.

mod common;

use std::collections::BTreeSet;

use taskhive::model::{
    KpiKind, Priority, RecurrenceKind, RecurrenceParams, RecurringTemplate, Task, TaskStatus,
    TimeWindow,
};
use taskhive::ports::{Clock, KpiRepository, TaskRepository};

use common::{harness, utc, TestHarness};

async fn seed_task(h: &TestHarness, due: chrono::DateTime<chrono::Utc>) -> Task {
    let task = Task::new(
        "g1",
        "ship the release notes",
        "alice",
        BTreeSet::from(["bob".to_string()]),
        None,
        Priority::Medium,
        Some(due),
        h.clock.now(),
    );
    h.ctx.lifecycle.create(task).await.unwrap()
}

// ─── Overdue detection ───────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_marks_open_tasks_overdue_once() {
    let h = harness(utc(2025, 6, 2, 9, 0)).await;
    let task = seed_task(&h, utc(2025, 6, 3, 18, 0)).await;
    let scheduler = h.ctx.scheduler();

    // Not yet due: nothing happens.
    let summary = scheduler.tick_once().await;
    assert_eq!(summary.marked_overdue, 0);

    // Past due: marked overdue, one notification, history records it.
    h.clock.set(utc(2025, 6, 3, 19, 0));
    let summary = scheduler.tick_once().await;
    assert_eq!(summary.marked_overdue, 1);
    let stored = h.ctx.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Overdue);
    assert_eq!(stored.workflow.history.last().unwrap().action, "overdue");
    assert_eq!(h.sink.count(), 1);

    // Next tick re-observes without re-marking or re-notifying.
    let summary = scheduler.tick_once().await;
    assert_eq!(summary.marked_overdue, 0);
    assert_eq!(h.sink.count(), 1);
}

#[tokio::test]
async fn penalty_lands_when_a_task_sits_open_past_48h() {
    let h = harness(utc(2025, 6, 2, 9, 0)).await;
    let _task = seed_task(&h, utc(2025, 6, 3, 18, 0)).await;
    let scheduler = h.ctx.scheduler();

    // Goes overdue one hour past due — too early for the penalty.
    h.clock.set(utc(2025, 6, 3, 19, 0));
    scheduler.tick_once().await;
    let outcomes = h
        .ctx
        .kpi_repo
        .recent_outcomes("g1", "bob", 10)
        .await
        .unwrap();
    assert!(outcomes.is_empty());

    // 49h past due: the re-observation writes the penalty, exactly once.
    h.clock.set(utc(2025, 6, 5, 19, 0));
    scheduler.tick_once().await;
    scheduler.tick_once().await;
    let outcomes = h
        .ctx
        .kpi_repo
        .recent_outcomes("g1", "bob", 10)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].kind, KpiKind::PenaltyOverdue);
}

#[tokio::test]
async fn overdue_task_still_completes_normally() {
    let h = harness(utc(2025, 6, 2, 9, 0)).await;
    let task = seed_task(&h, utc(2025, 6, 3, 18, 0)).await;
    let scheduler = h.ctx.scheduler();

    h.clock.set(utc(2025, 6, 3, 19, 0));
    scheduler.tick_once().await;

    // Overdue is overwritten by the normal submit/approve flow.
    h.ctx.lifecycle.submit(&task.id, "bob", "late but done").await.unwrap();
    let outcome = h.ctx.lifecycle.approve(&task.id, "alice").await.unwrap();
    assert_eq!(outcome.task.status, TaskStatus::Completed);

    // Completed tasks drop out of the sweep.
    let summary = scheduler.tick_once().await;
    assert_eq!(summary.marked_overdue, 0);
}

// ─── Combined tick ───────────────────────────────────────────────────────────

#[tokio::test]
async fn one_tick_drives_recurrence_and_overdue_together() {
    let h = harness(utc(2025, 6, 1, 8, 0)).await;
    let scheduler = h.ctx.scheduler();

    let tpl = RecurringTemplate::new(
        "g1",
        "weekly report",
        "alice",
        RecurrenceKind::Weekly,
        RecurrenceParams {
            interval: 1,
            weekdays: vec![1], // Mondays
            ..Default::default()
        },
        utc(2025, 6, 2, 9, 0),
        0,
        BTreeSet::from(["bob".to_string()]),
        None,
        h.clock.now(),
    );
    let tpl = h.ctx.recurrence.create_template(tpl).await.unwrap();

    // Monday 10:00 — the instance materializes, due an hour ago, and the
    // same tick's sweep immediately flags it overdue.
    h.clock.set(utc(2025, 6, 2, 10, 0));
    let summary = scheduler.tick_once().await;
    assert_eq!(summary.instances_generated, 1);
    assert_eq!(summary.marked_overdue, 1);

    let instances = h.ctx.lifecycle.instances_of(&tpl.id).await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].status, TaskStatus::Overdue);

    // A quiet week later, the next Monday instance appears.
    h.clock.set(utc(2025, 6, 9, 10, 0));
    let summary = scheduler.tick_once().await;
    assert_eq!(summary.instances_generated, 1);

    // Re-running with no clock advance is a no-op for generation.
    let summary = scheduler.tick_once().await;
    assert_eq!(summary.instances_generated, 0);
}

#[tokio::test]
async fn completing_an_overdue_instance_scores_late() {
    let h = harness(utc(2025, 6, 2, 9, 0)).await;
    let task = seed_task(&h, utc(2025, 6, 3, 18, 0)).await;
    let scheduler = h.ctx.scheduler();

    h.clock.set(utc(2025, 6, 4, 20, 0));
    scheduler.tick_once().await;

    // 26h past due → late bucket (−1) through the full dispatch path.
    h.ctx.lifecycle.submit(&task.id, "bob", "finally").await.unwrap();
    h.ctx
        .transition(
            &task.id,
            taskhive::lifecycle::TaskAction::Approve {
                by: "alice".to_string(),
            },
        )
        .await
        .unwrap();

    let scores = h.ctx.kpi.leaderboard("g1", TimeWindow::all()).await.unwrap();
    let bob = scores.iter().find(|s| s.user_id == "bob").unwrap();
    assert_eq!(bob.points, -1);
}
