//! Leaderboard ordering.
//!
//! Total points descending; ties broken by completed-task count, then by
//! who reached their current score first, then by user id so the order is
//! a stable total order.

use std::cmp::Ordering;

use crate::model::UserScore;

fn compare(a: &UserScore, b: &UserScore) -> Ordering {
    b.points
        .cmp(&a.points)
        .then(b.completed_tasks.cmp(&a.completed_tasks))
        .then(a.achieved_at.cmp(&b.achieved_at))
        .then(a.user_id.cmp(&b.user_id))
}

pub fn order_scores(scores: &mut [UserScore]) {
    scores.sort_by(compare);
}
