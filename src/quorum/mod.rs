//! Deletion quorum coordinator.
//!
//! One outstanding bulk-deletion request per group. Approvals are
//! idempotent per member; reaching the quorum executes the deletion of
//! exactly the task ids captured at creation time, atomically with the
//! status flip (one sqlite transaction, CAS-ed on the request version), so
//! two approvals racing to the threshold execute at most once. Expiry is
//! lazy: a pending request past its TTL is cancelled when next observed.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::model::{DeletionRequest, DeletionStatus};
use crate::ports::{Clock, DeletionRequestRepository, MemberRoster, NotificationSink};

/// Result of recording one approval.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalTally {
    pub request_id: String,
    pub approvals: u32,
    pub required: u32,
    pub remaining: u32,
    pub executed: bool,
}

impl ApprovalTally {
    fn of(request: &DeletionRequest, executed: bool) -> Self {
        Self {
            request_id: request.id.clone(),
            approvals: request.approvals.len() as u32,
            required: request.required_approvals,
            remaining: request.remaining(),
            executed,
        }
    }
}

pub struct DeletionQuorumCoordinator {
    requests: Arc<dyn DeletionRequestRepository>,
    roster: Arc<dyn MemberRoster>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    ttl: Duration,
}

impl DeletionQuorumCoordinator {
    pub fn new(
        requests: Arc<dyn DeletionRequestRepository>,
        roster: Arc<dyn MemberRoster>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
        ttl: Duration,
    ) -> Self {
        Self {
            requests,
            roster,
            clock,
            notifier,
            ttl,
        }
    }

    fn is_expired(&self, request: &DeletionRequest) -> bool {
        request.status == DeletionStatus::Pending
            && self.clock.now() - request.created_at > self.ttl
    }

    /// Persist the lazy expiry of a stale pending request. A lost write
    /// race here is fine — the winner resolved the request either way.
    async fn expire(&self, mut request: DeletionRequest) {
        let expected = request.version;
        request.status = DeletionStatus::Cancelled;
        request.resolved_at = Some(self.clock.now());
        request.version = expected + 1;
        if let Err(e) = self.requests.save(&request, expected).await {
            warn!(request_id = %request.id, err = %e, "failed to persist request expiry");
        } else {
            info!(request_id = %request.id, "deletion request expired");
        }
    }

    /// Open a bulk-deletion request. Fails with `AlreadyPending` while a
    /// live request exists for the group. The quorum is derived from the
    /// member count at this instant and never recomputed.
    pub async fn create_request(
        &self,
        group_id: &str,
        task_ids: Vec<String>,
        requested_by: &str,
    ) -> CoreResult<DeletionRequest> {
        if task_ids.is_empty() {
            return Err(CoreError::Validation(
                "deletion request needs at least one task id".to_string(),
            ));
        }

        if let Some(pending) = self.requests.get_pending_for_group(group_id).await? {
            if self.is_expired(&pending) {
                self.expire(pending).await;
            } else {
                return Err(CoreError::AlreadyPending {
                    group_id: group_id.to_string(),
                });
            }
        }

        let total_members = self.roster.count_members(group_id).await?;
        let request = DeletionRequest::new(
            group_id,
            task_ids,
            requested_by,
            total_members,
            self.clock.now(),
        );
        self.requests.insert(&request).await?;

        info!(
            request_id = %request.id,
            group_id = %group_id,
            tasks = request.task_ids.len(),
            required = request.required_approvals,
            "bulk-deletion request created"
        );
        self.notifier
            .notify(
                group_id,
                &format!(
                    "{} requested deletion of {} task(s) — {} approval(s) needed",
                    requested_by,
                    request.task_ids.len(),
                    request.required_approvals
                ),
            )
            .await;

        Ok(request)
    }

    /// Record one member's approval. Idempotent: a repeat vote returns the
    /// unchanged tally. Reaching the quorum executes the request.
    pub async fn record_approval(&self, request_id: &str, member_id: &str) -> CoreResult<ApprovalTally> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| CoreError::not_found("deletion request", request_id))?;

        if self.is_expired(&request) {
            self.expire(request).await;
            return Err(CoreError::RequestExpired {
                request_id: request_id.to_string(),
            });
        }
        if request.status != DeletionStatus::Pending {
            return Err(CoreError::RequestExpired {
                request_id: request_id.to_string(),
            });
        }

        if request.approvals.contains(member_id) {
            // No-op, not an error — and no double count.
            return Ok(ApprovalTally::of(&request, false));
        }

        let expected = request.version;
        let mut request = request;
        request.approvals.insert(member_id.to_string());
        request.version = expected + 1;

        if request.approvals.len() as u32 >= request.required_approvals {
            request.status = DeletionStatus::Executed;
            request.resolved_at = Some(self.clock.now());
            // Status flip and task deletion land in one transaction; the
            // version CAS makes the racing loser surface Conflict instead
            // of deleting twice.
            self.requests.execute(&request, expected).await?;

            info!(
                request_id = %request.id,
                group_id = %request.group_id,
                deleted = request.task_ids.len(),
                "quorum reached — bulk deletion executed"
            );
            self.notifier
                .notify(
                    &request.group_id,
                    &format!(
                        "Quorum reached: {} task(s) deleted",
                        request.task_ids.len()
                    ),
                )
                .await;
            return Ok(ApprovalTally::of(&request, true));
        }

        self.requests.save(&request, expected).await?;
        Ok(ApprovalTally::of(&request, false))
    }

    /// Cancel a pending request. Executed/cancelled requests stay final.
    pub async fn cancel_request(&self, request_id: &str, actor_id: &str) -> CoreResult<DeletionRequest> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| CoreError::not_found("deletion request", request_id))?;

        if request.status != DeletionStatus::Pending {
            return Err(CoreError::RequestExpired {
                request_id: request_id.to_string(),
            });
        }

        let expected = request.version;
        let mut request = request;
        request.status = DeletionStatus::Cancelled;
        request.resolved_at = Some(self.clock.now());
        request.version = expected + 1;
        self.requests.save(&request, expected).await?;

        info!(request_id = %request.id, actor = %actor_id, "deletion request cancelled");
        Ok(request)
    }
}
