//! Recurrence engine: materializes due task instances from active
//! templates on each scheduler tick.
//!
//! Cursor discipline: `last_generated_due` / `total_instances_generated`
//! only advance after the instance insert has landed. A failed insert
//! leaves the cursor untouched so the same instance retries next tick; a
//! cursor save that failed after a successful insert is recovered by the
//! duplicate guard below instead of generating twice.

pub mod schedule;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::TaskLifecycle;
use crate::model::{RecurringTemplate, Task};
use crate::ports::{Clock, NotificationSink, TemplateRepository};

pub struct RecurrenceEngine {
    templates: Arc<dyn TemplateRepository>,
    lifecycle: Arc<TaskLifecycle>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
}

impl RecurrenceEngine {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        lifecycle: Arc<TaskLifecycle>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            templates,
            lifecycle,
            clock,
            notifier,
        }
    }

    /// Register a new template after validating its recurrence params.
    pub async fn create_template(&self, template: RecurringTemplate) -> CoreResult<RecurringTemplate> {
        template
            .params
            .validate()
            .map_err(CoreError::Validation)?;
        self.templates.insert(&template).await?;
        info!(template_id = %template.id, kind = template.kind.as_str(), "recurring template created");
        Ok(template)
    }

    /// Templates are deactivated, never deleted.
    pub async fn deactivate(&self, template_id: &str) -> CoreResult<RecurringTemplate> {
        let mut template = self
            .templates
            .get(template_id)
            .await?
            .ok_or_else(|| CoreError::not_found("template", template_id))?;
        let expected = template.version;
        template.is_active = false;
        template.updated_at = self.clock.now();
        template.version = expected + 1;
        self.templates.save(&template, expected).await?;
        info!(template_id = %template.id, "recurring template deactivated");
        Ok(template)
    }

    /// One evaluation cycle over all active templates. Per-template errors
    /// are logged and skipped — the next tick retries cleanly. Returns the
    /// number of instances generated.
    pub async fn tick(&self) -> CoreResult<usize> {
        let now = self.clock.now();
        let templates = self.templates.list_active().await?;
        let mut generated = 0;
        for template in &templates {
            match self.evaluate(template, now).await {
                Ok(true) => generated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        template_id = %template.id,
                        err = %e,
                        "recurrence evaluation failed — will retry next tick"
                    );
                }
            }
        }
        if generated > 0 {
            info!(generated, "recurrence tick generated task instances");
        }
        Ok(generated)
    }

    async fn evaluate(&self, template: &RecurringTemplate, now: DateTime<Utc>) -> CoreResult<bool> {
        let Some(due) = schedule::latest_due_not_after(template, now) else {
            return Ok(false);
        };

        let instance_number = template.total_instances_generated + 1;

        // Recovery guard: a previous tick may have inserted the instance
        // and then lost the cursor write. Never generate the same due
        // point twice.
        let existing = self
            .lifecycle
            .instances_of(&template.id)
            .await?
            .into_iter()
            .any(|t| t.due_time == Some(due));
        if !existing {
            let mut task = Task::new(
                template.group_id.clone(),
                template.title.clone(),
                template.created_by.clone(),
                template.assignees.clone(),
                template.reviewer.clone(),
                template.priority,
                Some(due),
                now,
            );
            task.description = template.description.clone();
            task.recurring_template_id = Some(template.id.clone());
            task.recurring_instance_number = Some(instance_number);
            let task = self.lifecycle.create(task).await?;

            info!(
                template_id = %template.id,
                task_id = %task.id,
                instance = instance_number,
                due = %due,
                "generated recurring task instance"
            );
            self.notifier
                .notify(
                    &template.group_id,
                    &format!("Recurring task \"{}\" is due (#{instance_number})", template.title),
                )
                .await;
        }

        // Cursor moves only after the instance exists.
        let mut updated = template.clone();
        let expected = updated.version;
        updated.last_generated_due = Some(due);
        updated.total_instances_generated = instance_number;
        updated.updated_at = now;
        updated.version = expected + 1;
        self.templates.save(&updated, expected).await?;

        Ok(true)
    }
}
