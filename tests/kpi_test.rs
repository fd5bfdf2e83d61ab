//! Integration tests for the KPI scoring engine and leaderboard.

mod common;

use std::collections::BTreeSet;

use chrono::Duration;
use taskhive::events::TaskEvent;
use taskhive::model::{KpiKind, Priority, Task, TimeWindow};
use taskhive::ports::Clock;

use common::{harness, utc};

fn completed_event(
    task_id: &str,
    assignee: &str,
    due: chrono::DateTime<chrono::Utc>,
    completed: chrono::DateTime<chrono::Utc>,
) -> TaskEvent {
    TaskEvent::Completed {
        task_id: task_id.to_string(),
        group_id: "g1".to_string(),
        creator_id: "alice".to_string(),
        assignees: BTreeSet::from([assignee.to_string()]),
        due_time: Some(due),
        completed_at: completed,
    }
}

// ─── Timing buckets ──────────────────────────────────────────────────────────

#[tokio::test]
async fn timing_buckets_award_the_table_points() {
    let h = harness(utc(2025, 6, 10, 18, 0)).await;
    let due = utc(2025, 6, 10, 18, 0);

    // 30h before due → early (+2).
    let written = h
        .ctx
        .kpi
        .on_event(&completed_event("t-early", "bob", due, due - Duration::hours(30)))
        .await
        .unwrap();
    let early = written.iter().find(|r| r.user_id == "bob").unwrap();
    assert_eq!(early.kind, KpiKind::AssigneeEarly);
    assert_eq!(early.points, 2);

    // Exactly on due → on-time (+1).
    let written = h
        .ctx
        .kpi
        .on_event(&completed_event("t-ontime", "bob", due, due))
        .await
        .unwrap();
    let ontime = written.iter().find(|r| r.user_id == "bob").unwrap();
    assert_eq!(ontime.kind, KpiKind::AssigneeOntime);
    assert_eq!(ontime.points, 1);

    // 30h after due → late (−1).
    let written = h
        .ctx
        .kpi
        .on_event(&completed_event("t-late", "bob", due, due + Duration::hours(30)))
        .await
        .unwrap();
    let late = written.iter().find(|r| r.user_id == "bob").unwrap();
    assert_eq!(late.kind, KpiKind::AssigneeLate);
    assert_eq!(late.points, -1);
}

#[tokio::test]
async fn creator_scores_alongside_assignees() {
    let h = harness(utc(2025, 6, 10, 18, 0)).await;
    let due = utc(2025, 6, 10, 18, 0);

    let written = h
        .ctx
        .kpi
        .on_event(&completed_event("t1", "bob", due, due - Duration::hours(30)))
        .await
        .unwrap();

    let creator: Vec<_> = written.iter().filter(|r| r.user_id == "alice").collect();
    assert_eq!(creator.len(), 2);
    assert!(creator.iter().any(|r| r.kind == KpiKind::CreatorCompletion && r.points == 1));
    assert!(creator.iter().any(|r| r.kind == KpiKind::CreatorOntimeBonus && r.points == 1));

    // A late completion earns the creator the completion credit only.
    let written = h
        .ctx
        .kpi
        .on_event(&completed_event("t2", "bob", due, due + Duration::hours(30)))
        .await
        .unwrap();
    let creator: Vec<_> = written.iter().filter(|r| r.user_id == "alice").collect();
    assert_eq!(creator.len(), 1);
    assert_eq!(creator[0].kind, KpiKind::CreatorCompletion);
}

// ─── Dedupe ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn replayed_events_never_double_score() {
    let h = harness(utc(2025, 6, 10, 18, 0)).await;
    let due = utc(2025, 6, 10, 18, 0);
    let event = completed_event("t1", "bob", due, due);

    let first = h.ctx.kpi.on_event(&event).await.unwrap();
    assert!(!first.is_empty());
    let replay = h.ctx.kpi.on_event(&event).await.unwrap();
    assert!(replay.is_empty());

    let scores = h.ctx.kpi.leaderboard("g1", TimeWindow::all()).await.unwrap();
    let bob = scores.iter().find(|s| s.user_id == "bob").unwrap();
    assert_eq!(bob.points, 1);
    assert_eq!(bob.completed_tasks, 1);
}

#[tokio::test]
async fn overdue_penalty_fires_once_past_the_window() {
    let h = harness(utc(2025, 6, 10, 18, 0)).await;
    let due = utc(2025, 6, 10, 18, 0);
    let overdue = |observed: chrono::DateTime<chrono::Utc>| TaskEvent::BecameOverdue {
        task_id: "t1".to_string(),
        group_id: "g1".to_string(),
        assignees: BTreeSet::from(["bob".to_string()]),
        due_time: due,
        observed_at: observed,
    };

    // Within 48h of due: no penalty yet.
    let written = h.ctx.kpi.on_event(&overdue(due + Duration::hours(2))).await.unwrap();
    assert!(written.is_empty());

    // Past 48h: −2, once.
    let written = h.ctx.kpi.on_event(&overdue(due + Duration::hours(49))).await.unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].kind, KpiKind::PenaltyOverdue);
    assert_eq!(written[0].points, -2);

    // Re-observed on later ticks: absorbed.
    let written = h.ctx.kpi.on_event(&overdue(due + Duration::hours(72))).await.unwrap();
    assert!(written.is_empty());
}

// ─── Streaks ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn third_consecutive_punctual_completion_earns_the_streak_bonus() {
    let h = harness(utc(2025, 6, 1, 9, 0)).await;

    for i in 0..3 {
        let due = utc(2025, 6, 2 + i, 18, 0);
        let written = h
            .ctx
            .kpi
            .on_event(&completed_event(&format!("t{i}"), "bob", due, due))
            .await
            .unwrap();
        let has_bonus = written.iter().any(|r| r.kind == KpiKind::StreakBonus);
        // The bonus lands exactly on the third completion.
        assert_eq!(has_bonus, i == 2, "completion {i}");
        if i == 2 {
            let bonus = written.iter().find(|r| r.kind == KpiKind::StreakBonus).unwrap();
            assert_eq!(bonus.points, 3);
            assert_eq!(bonus.user_id, "bob");
        }
    }
}

#[tokio::test]
async fn a_late_completion_resets_the_streak() {
    let h = harness(utc(2025, 6, 1, 9, 0)).await;

    // Two punctual completions…
    for i in 0..2 {
        let due = utc(2025, 6, 2 + i, 18, 0);
        h.ctx
            .kpi
            .on_event(&completed_event(&format!("t{i}"), "bob", due, due))
            .await
            .unwrap();
    }
    // …then a late one breaks the run.
    let due = utc(2025, 6, 4, 18, 0);
    h.ctx
        .kpi
        .on_event(&completed_event("t-late", "bob", due, due + Duration::hours(30)))
        .await
        .unwrap();

    // Third punctual completion after the break: run length is 1, no bonus.
    let due = utc(2025, 6, 5, 18, 0);
    let written = h
        .ctx
        .kpi
        .on_event(&completed_event("t3", "bob", due, due))
        .await
        .unwrap();
    assert!(!written.iter().any(|r| r.kind == KpiKind::StreakBonus));
}

// ─── Leaderboard ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn leaderboard_orders_points_then_completions() {
    let h = harness(utc(2025, 6, 1, 9, 0)).await;

    // bob: one early completion (+2).
    let due = utc(2025, 6, 2, 18, 0);
    h.ctx
        .kpi
        .on_event(&completed_event("t1", "bob", due, due - Duration::hours(30)))
        .await
        .unwrap();

    // carol: two on-time completions (+1 each) — same 2 points, more tasks.
    for (i, day) in [3u32, 4].iter().enumerate() {
        let due = utc(2025, 6, *day, 18, 0);
        h.ctx
            .kpi
            .on_event(&completed_event(&format!("c{i}"), "carol", due, due))
            .await
            .unwrap();
    }

    let scores = h.ctx.kpi.leaderboard("g1", TimeWindow::all()).await.unwrap();
    let bob_pos = scores.iter().position(|s| s.user_id == "bob").unwrap();
    let carol_pos = scores.iter().position(|s| s.user_id == "carol").unwrap();
    assert!(carol_pos < bob_pos, "equal points resolve by completed count");

    // A bounded window hides older records.
    let scores = h
        .ctx
        .kpi
        .leaderboard("g1", TimeWindow::since(utc(2025, 6, 4, 0, 0)))
        .await
        .unwrap();
    assert!(scores.iter().all(|s| s.user_id != "bob"));
}

// ─── Full path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn approving_a_task_scores_through_the_context() {
    let h = harness(utc(2025, 6, 2, 9, 0)).await;
    let task = Task::new(
        "g1",
        "t",
        "alice",
        BTreeSet::from(["bob".to_string()]),
        None,
        Priority::Medium,
        Some(utc(2025, 6, 5, 18, 0)),
        h.clock.now(),
    );
    let task = h.ctx.lifecycle.create(task).await.unwrap();

    h.ctx.lifecycle.start(&task.id, "bob").await.unwrap();
    h.ctx.lifecycle.submit(&task.id, "bob", "done").await.unwrap();
    h.ctx
        .transition(&task.id, taskhive::lifecycle::TaskAction::Approve { by: "alice".to_string() })
        .await
        .unwrap();

    // Completed three days early → bob early (+2), alice completion+bonus (+2).
    let scores = h.ctx.kpi.leaderboard("g1", TimeWindow::all()).await.unwrap();
    assert_eq!(scores.len(), 2);
    let bob = scores.iter().find(|s| s.user_id == "bob").unwrap();
    let alice = scores.iter().find(|s| s.user_id == "alice").unwrap();
    assert_eq!(bob.points, 2);
    assert_eq!(alice.points, 2);
}
