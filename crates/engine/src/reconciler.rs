//! Instance Reconciler: create-or-update the instance behind an apply
//! request, within one transaction.
//!
//! Persisted apply:
//!
//! 1. begin; load instances of `(template, project, requested name)`
//! 2. keep the oldest, delete the rest
//! 3. update the survivor (version pin + request) or insert a new one
//! 4. execute the template with the instance as context
//! 5. read the generated name, write it back, stamp `template: group/slug`
//! 6. commit, then publish `InstanceUpdated` or `InstanceAdded`
//!
//! A detached apply runs steps 1 and 2 in the same way, then deletes the
//! surviving instance too: the generated workflow is no longer tracked.
//! It executes against an ephemeral instance with a negative id, is never
//! annotated and publishes no event, but still commits its deletions.
//!
//! Any error before commit drops the transaction, which rolls back every
//! write.

use std::sync::Arc;

use sqlx::types::Json;
use stencil_core::execution::{ExecutionContext, ExecutionResult, TemplateExecutor};
use stencil_core::generated_workflow;
use stencil_core::instance::next_detached_id;
use stencil_core::request::TemplateRequest;
use stencil_db::models::project::Project;
use stencil_db::models::template::WorkflowTemplate;
use stencil_db::models::template_instance::{CreateTemplateInstance, TemplateInstance};
use stencil_db::{InstanceTx, TemplateStore};
use stencil_events::{EventBus, TemplateEvent, TemplateEventKind};

use crate::actor::Actor;
use crate::error::EngineError;

/// Result of one apply.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The instance after the apply. Negative id when detached.
    pub instance: TemplateInstance,
    /// State of the instance before it was updated, if it existed.
    pub previous: Option<TemplateInstance>,
    /// Generated artifacts; the workflow text is annotated unless detached.
    pub result: ExecutionResult,
}

pub struct InstanceReconciler<S: TemplateStore> {
    store: Arc<S>,
    executor: Arc<dyn TemplateExecutor>,
    events: Arc<EventBus>,
}

impl<S: TemplateStore> InstanceReconciler<S> {
    pub fn new(store: Arc<S>, executor: Arc<dyn TemplateExecutor>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            executor,
            events,
        }
    }

    /// Generate the workflow for `request` and keep the instance ledger in step.
    pub async fn apply(
        &self,
        actor: &Actor,
        template: &WorkflowTemplate,
        project: &Project,
        request: &TemplateRequest,
    ) -> Result<ApplyOutcome, EngineError> {
        let mut tx = self.store.begin().await?;

        let mut candidates = tx
            .find_instances(template.id, project.id, &request.workflow_name)
            .await?
            .into_iter();
        let existing = candidates.next();
        for duplicate in candidates {
            tracing::warn!(
                template_id = template.id,
                project_id = project.id,
                instance_id = duplicate.id,
                workflow = %request.workflow_name,
                "Deleting duplicate template instance"
            );
            tx.delete_instance(duplicate.id).await?;
        }

        if request.detached {
            if let Some(tracked) = existing {
                tracing::info!(
                    template_id = template.id,
                    project_id = project.id,
                    instance_id = tracked.id,
                    workflow = %request.workflow_name,
                    "Untracking template instance for detached apply"
                );
                tx.delete_instance(tracked.id).await?;
            }
            return self.apply_detached(tx, template, project, request).await;
        }

        let (mut instance, previous) = match existing {
            Some(current) => {
                let previous = current.clone();
                let mut updated = current;
                updated.workflow_template_version = template.version;
                updated.request = Json(request.clone());
                let updated = tx.update_instance(&updated).await?;
                (updated, Some(previous))
            }
            None => {
                let input = CreateTemplateInstance {
                    workflow_template_id: template.id,
                    project_id: project.id,
                    workflow_template_version: template.version,
                    request: request.clone(),
                };
                (tx.insert_instance(&input).await?, None)
            }
        };

        let context = ExecutionContext::new(instance.id, request);
        let mut result = self
            .executor
            .execute(&template.definition(), Some(&context))?;

        let annotated =
            generated_workflow::annotate(&result.workflow, &template.group_name, &template.slug)?;
        instance.workflow_name = Some(annotated.name);
        let instance = tx.update_instance(&instance).await?;
        result.workflow = annotated.text;

        tx.commit().await?;

        self.publish(actor, &instance, previous.as_ref());
        tracing::info!(
            template_id = template.id,
            project_id = project.id,
            instance_id = instance.id,
            workflow = ?instance.workflow_name,
            updated = previous.is_some(),
            "Template applied"
        );

        Ok(ApplyOutcome {
            instance,
            previous,
            result,
        })
    }

    async fn apply_detached(
        &self,
        tx: S::Tx,
        template: &WorkflowTemplate,
        project: &Project,
        request: &TemplateRequest,
    ) -> Result<ApplyOutcome, EngineError> {
        let now = chrono::Utc::now();
        let instance = TemplateInstance {
            id: next_detached_id(),
            workflow_template_id: template.id,
            project_id: project.id,
            workflow_template_version: template.version,
            request: Json(request.clone()),
            workflow_name: None,
            workflow_id: None,
            created_at: now,
            updated_at: now,
        };

        let context = ExecutionContext::new(instance.id, request);
        let result = self
            .executor
            .execute(&template.definition(), Some(&context))?;

        tx.commit().await?;

        tracing::debug!(
            template_id = template.id,
            project_id = project.id,
            instance_id = instance.id,
            "Detached template apply"
        );

        Ok(ApplyOutcome {
            instance,
            previous: None,
            result,
        })
    }

    fn publish(&self, actor: &Actor, instance: &TemplateInstance, previous: Option<&TemplateInstance>) {
        let kind = if previous.is_some() {
            TemplateEventKind::InstanceUpdated
        } else {
            TemplateEventKind::InstanceAdded
        };
        let mut event = TemplateEvent::new(kind, instance.workflow_template_id)
            .with_instance(instance.project_id, instance.id)
            .with_actor(actor.user_id);
        if let Some(previous) = previous {
            event = event.with_payload(serde_json::json!({
                "old_version": previous.workflow_template_version,
                "new_version": instance.workflow_template_version,
                "old_workflow_name": previous.workflow_name,
                "new_workflow_name": instance.workflow_name,
            }));
        }
        self.events.publish(event);
    }
}
