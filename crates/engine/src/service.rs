//! Template lifecycle and the calls built on it.
//!
//! Templates are addressed by `(group name, slug)`. Create and update may
//! replace the submitted content with an archive downloaded from the
//! template's `import_url`; both dry-run the executor before storing.

use std::sync::Arc;

use serde::Serialize;
use stencil_core::archive;
use stencil_core::error::CoreError;
use stencil_core::execution::TemplateExecutor;
use stencil_core::instance::is_outdated;
use stencil_core::request::{check_params, TemplateRequest};
use stencil_core::template::TemplateSpec;
use stencil_core::types::DbId;
use stencil_db::models::group::Group;
use stencil_db::models::template::{CreateWorkflowTemplate, UpdateWorkflowTemplate, WorkflowTemplate};
use stencil_db::models::template_audit::{
    AuditEntry, TemplateAudit, AUDIT_EVENT_CREATED, AUDIT_EVENT_UPDATED,
};
use stencil_db::models::template_instance::TemplateInstance;
use stencil_db::{StoreError, TemplateStore};
use stencil_events::{EventBus, TemplateEvent, TemplateEventKind};

use crate::actor::Actor;
use crate::collaborators::{
    has_access, ArchiveFetcher, ImportOptions, ImportOutcome, ProjectAccess, ProjectLoader,
    WorkflowImporter, WRITE_PERMISSION_REQUIRED,
};
use crate::error::EngineError;
use crate::reconciler::InstanceReconciler;

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Result of pushing a template archive.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub template: WorkflowTemplate,
    pub messages: Vec<String>,
}

/// Result of an apply call.
#[derive(Debug, Clone)]
pub enum ApplyResponse {
    /// The generated bundle, for the caller to download.
    Archive(Vec<u8>),
    /// The bundle was handed to the workflow importer.
    Imported {
        instance: TemplateInstance,
        outcome: ImportOutcome,
    },
}

/// An instance annotated with whether its pinned version is behind.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: TemplateInstance,
    pub outdated: bool,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct TemplateService<S: TemplateStore> {
    store: Arc<S>,
    reconciler: Arc<InstanceReconciler<S>>,
    executor: Arc<dyn TemplateExecutor>,
    events: Arc<EventBus>,
    projects: Arc<dyn ProjectLoader>,
    importer: Arc<dyn WorkflowImporter>,
    fetcher: Arc<dyn ArchiveFetcher>,
}

impl<S: TemplateStore> TemplateService<S> {
    pub fn new(
        store: Arc<S>,
        reconciler: Arc<InstanceReconciler<S>>,
        executor: Arc<dyn TemplateExecutor>,
        events: Arc<EventBus>,
        projects: Arc<dyn ProjectLoader>,
        importer: Arc<dyn WorkflowImporter>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        Self {
            store,
            reconciler,
            executor,
            events,
            projects,
            importer,
            fetcher,
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub async fn get(&self, group_name: &str, slug: &str) -> Result<WorkflowTemplate, EngineError> {
        let group = self.group_by_name(group_name).await?;
        self.store
            .find_template_by_slug(group.id, slug)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Template {group_name}/{slug} not found")))
    }

    pub async fn list_for_groups(
        &self,
        group_ids: &[DbId],
    ) -> Result<Vec<WorkflowTemplate>, EngineError> {
        Ok(self.store.list_templates(group_ids).await?)
    }

    async fn group_by_name(&self, name: &str) -> Result<Group, EngineError> {
        self.store
            .find_group_by_name(name)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Group {name} not found")))
    }

    /// Group named by the spec; a template cannot exist without one.
    async fn owning_group(&self, spec: &TemplateSpec) -> Result<Group, EngineError> {
        match spec.group.as_deref() {
            Some(name) if !name.is_empty() => self.group_by_name(name).await,
            _ => Err(EngineError::validation("Group name is required")),
        }
    }

    // -----------------------------------------------------------------------
    // Create / update / delete
    // -----------------------------------------------------------------------

    /// Create a template at version 0.
    pub async fn create(
        &self,
        actor: &Actor,
        spec: TemplateSpec,
    ) -> Result<WorkflowTemplate, EngineError> {
        let mut spec = self.resolve_import(spec).await?;
        spec.ensure_slug();
        spec.validate()?;
        let group = self.owning_group(&spec).await?;
        self.executor.execute(&spec.definition, None)?;

        let (template, _) = self
            .store
            .insert_template_with_audit(
                &CreateWorkflowTemplate::from_spec(group.id, &spec),
                &audit_entry(actor, AUDIT_EVENT_CREATED, None, None)?,
            )
            .await
            .map_err(|e| duplicate_slug(e, &group.name, &spec.slug))?;

        self.events.publish(
            TemplateEvent::new(TemplateEventKind::TemplateAdded, template.id)
                .with_actor(actor.user_id),
        );
        tracing::info!(
            template_id = template.id,
            template = %template.path(),
            "Template created"
        );
        Ok(template)
    }

    /// Replace the content of `group_name/slug` and bump its version.
    pub async fn update(
        &self,
        actor: &Actor,
        group_name: &str,
        slug: &str,
        spec: TemplateSpec,
        change_message: Option<String>,
    ) -> Result<WorkflowTemplate, EngineError> {
        let stored = self.get(group_name, slug).await?;
        let spec = self.resolve_import(spec).await?;
        self.update_stored(actor, stored, spec, change_message).await
    }

    async fn update_stored(
        &self,
        actor: &Actor,
        stored: WorkflowTemplate,
        spec: TemplateSpec,
        change_message: Option<String>,
    ) -> Result<WorkflowTemplate, EngineError> {
        let before = stored.to_spec();
        let mut merged = before.clone();
        merged.merge_from(spec);
        merged.ensure_slug();
        merged.validate()?;
        let group = self.owning_group(&merged).await?;
        self.executor.execute(&merged.definition, None)?;

        let audit = audit_entry(
            actor,
            AUDIT_EVENT_UPDATED,
            Some(&before),
            change_message.clone(),
        )?;
        let (updated, _) = self
            .store
            .update_template_with_audit(
                stored.id,
                stored.version,
                &UpdateWorkflowTemplate::from_spec(group.id, &merged),
                &audit,
            )
            .await
            .map_err(|e| duplicate_slug(e, &group.name, &merged.slug))?
            .ok_or_else(|| {
                EngineError::Core(CoreError::Conflict(format!(
                    "Template {} was modified concurrently, reload and retry",
                    stored.path()
                )))
            })?;

        self.events.publish(
            TemplateEvent::new(TemplateEventKind::TemplateUpdated, updated.id)
                .with_actor(actor.user_id)
                .with_change_message(change_message)
                .with_payload(serde_json::json!({
                    "old_version": stored.version,
                    "new_version": updated.version,
                })),
        );
        tracing::info!(
            template_id = updated.id,
            template = %updated.path(),
            version = updated.version,
            "Template updated"
        );
        Ok(updated)
    }

    pub async fn delete(&self, actor: &Actor, group_name: &str, slug: &str) -> Result<(), EngineError> {
        let template = self.get(group_name, slug).await?;
        if !self.store.delete_template(template.id).await? {
            return Err(EngineError::not_found(format!(
                "Template {group_name}/{slug} not found"
            )));
        }
        self.events.publish(
            TemplateEvent::new(TemplateEventKind::TemplateDeleted, template.id)
                .with_actor(actor.user_id),
        );
        tracing::info!(template_id = template.id, template = %template.path(), "Template deleted");
        Ok(())
    }

    /// Swap the submitted content for the archive at `import_url`, if set.
    async fn resolve_import(&self, spec: TemplateSpec) -> Result<TemplateSpec, EngineError> {
        let Some(url) = spec.import_url.clone().filter(|u| !u.is_empty()) else {
            return Ok(spec);
        };
        let bytes = self.fetcher.fetch(&url).await?;
        let mut imported = archive::decode_bytes(&bytes)?;
        if imported.group.as_deref().map_or(true, str::is_empty) {
            return Err(EngineError::validation(format!(
                "Template downloaded from {url} does not name its group"
            )));
        }
        imported.import_url = Some(url);
        Ok(imported)
    }

    /// Audit entries for versions after `since_version`, newest first.
    pub async fn audits_since(
        &self,
        group_name: &str,
        slug: &str,
        since_version: i64,
    ) -> Result<Vec<TemplateAudit>, EngineError> {
        let template = self.get(group_name, slug).await?;
        Ok(self.store.list_audits_since(template.id, since_version).await?)
    }

    // -----------------------------------------------------------------------
    // Archive transport
    // -----------------------------------------------------------------------

    /// The template as an archive.
    pub async fn pull(&self, group_name: &str, slug: &str) -> Result<Vec<u8>, EngineError> {
        let template = self.get(group_name, slug).await?;
        Ok(archive::encode_to_vec(&template.to_spec(), None)?)
    }

    /// Create or update a template from an archive.
    pub async fn push(&self, actor: &Actor, bytes: &[u8]) -> Result<PushOutcome, EngineError> {
        let mut spec = archive::decode_bytes(bytes)?;
        spec.ensure_slug();
        let group = self.owning_group(&spec).await?;

        let existing = self.store.find_template_by_slug(group.id, &spec.slug).await?;
        let (template, verb) = match existing {
            Some(stored) => (self.update_stored(actor, stored, spec, None).await?, "updated"),
            None => (self.create(actor, spec).await?, "created"),
        };
        let messages = vec![format!("Template {} has been {verb}", template.path())];
        Ok(PushOutcome { template, messages })
    }

    // -----------------------------------------------------------------------
    // Apply
    // -----------------------------------------------------------------------

    /// Generate a workflow for one project. With `import`, the bundle goes
    /// to the workflow importer with those options; otherwise it is returned
    /// as an archive.
    ///
    /// Non-admins need read access on the project, or write access to import.
    pub async fn apply(
        &self,
        actor: &Actor,
        group_name: &str,
        slug: &str,
        request: TemplateRequest,
        import: Option<ImportOptions>,
    ) -> Result<ApplyResponse, EngineError> {
        let template = self.get(group_name, slug).await?;
        check_params(&template.parameters.0, &request)?;

        let key = &request.project_key;
        let required = if import.is_some() {
            ProjectAccess::ReadWrite
        } else {
            ProjectAccess::Read
        };
        if !has_access(self.projects.as_ref(), actor, key, required).await? {
            return Err(match required {
                ProjectAccess::ReadWrite => EngineError::forbidden(WRITE_PERMISSION_REQUIRED),
                _ => EngineError::not_found(format!("Project {key} not found")),
            });
        }
        let project = self.projects.load(key).await?;

        let applied = self
            .reconciler
            .apply(actor, &template, &project, &request)
            .await?;
        let bundle = archive::encode_to_vec(&template.to_spec(), Some(&applied.result))?;

        let Some(options) = import else {
            return Ok(ApplyResponse::Archive(bundle));
        };
        let outcome = self.importer.import(&project, &bundle, &options).await?;
        let mut instance = applied.instance;
        if !instance.is_detached() {
            instance.workflow_id = Some(outcome.workflow_id);
        }
        Ok(ApplyResponse::Imported { instance, outcome })
    }

    // -----------------------------------------------------------------------
    // Instances
    // -----------------------------------------------------------------------

    /// Instances of a template in the given projects.
    pub async fn list_instances(
        &self,
        group_name: &str,
        slug: &str,
        project_keys: &[String],
    ) -> Result<Vec<InstanceView>, EngineError> {
        let template = self.get(group_name, slug).await?;
        let mut project_ids = Vec::with_capacity(project_keys.len());
        for key in project_keys {
            project_ids.push(self.projects.load(key).await?.id);
        }

        let instances = self.store.list_instances(template.id, &project_ids).await?;
        Ok(instances
            .into_iter()
            .map(|instance| InstanceView {
                outdated: is_outdated(instance.workflow_template_version, template.version),
                instance,
            })
            .collect())
    }

    pub async fn delete_instance(
        &self,
        group_name: &str,
        slug: &str,
        instance_id: DbId,
    ) -> Result<(), EngineError> {
        let template = self.get(group_name, slug).await?;
        if !self
            .store
            .delete_template_instance(template.id, instance_id)
            .await?
        {
            return Err(EngineError::Core(CoreError::NotFound {
                entity: "template instance",
                id: instance_id,
            }));
        }
        tracing::info!(template_id = template.id, instance_id, "Template instance deleted");
        Ok(())
    }

    /// The instance that generated an imported workflow.
    pub async fn instance_for_workflow(
        &self,
        workflow_id: DbId,
    ) -> Result<TemplateInstance, EngineError> {
        self.store
            .find_instance_by_workflow(workflow_id)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!("No template instance for workflow {workflow_id}"))
            })
    }
}

/// Audit fields for a template write; the store fills in the written row.
fn audit_entry(
    actor: &Actor,
    event_type: &str,
    before: Option<&TemplateSpec>,
    change_message: Option<String>,
) -> Result<AuditEntry, EngineError> {
    let data_before = before
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| CoreError::Internal(format!("cannot serialize template: {e}")))?;
    Ok(AuditEntry {
        event_type: event_type.to_string(),
        actor_id: Some(actor.user_id),
        change_message,
        data_before,
    })
}

fn duplicate_slug(err: StoreError, group: &str, slug: &str) -> EngineError {
    match err {
        StoreError::Conflict(_) => EngineError::Core(CoreError::Conflict(format!(
            "Template {group}/{slug} already exists"
        ))),
        other => EngineError::Store(other),
    }
}
