//! Postgres-backed project loading and workflow import.

use async_trait::async_trait;
use stencil_core::archive;
use stencil_core::generated_workflow;
use stencil_core::types::DbId;
use stencil_db::models::project::{Project, MEMBER_ROLE_READ, MEMBER_ROLE_WRITE};
use stencil_db::models::workflow::UpsertWorkflow;
use stencil_db::repositories::{ProjectRepo, TemplateInstanceRepo, WorkflowRepo};
use stencil_db::{DbPool, StoreError};

use super::{ImportOptions, ImportOutcome, ProjectAccess, ProjectLoader, WorkflowImporter};
use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

pub struct PgProjectLoader {
    pool: DbPool,
}

impl PgProjectLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectLoader for PgProjectLoader {
    async fn load(&self, key: &str) -> Result<Project, EngineError> {
        ProjectRepo::find_by_key(&self.pool, key)
            .await
            .map_err(StoreError::from)?
            .ok_or_else(|| EngineError::not_found(format!("Project {key} not found")))
    }

    async fn access(&self, user_id: DbId, key: &str) -> Result<ProjectAccess, EngineError> {
        let role = ProjectRepo::find_member_role(&self.pool, key, user_id)
            .await
            .map_err(StoreError::from)?;
        Ok(match role.as_deref() {
            Some(MEMBER_ROLE_WRITE) => ProjectAccess::ReadWrite,
            Some(MEMBER_ROLE_READ) => ProjectAccess::Read,
            _ => ProjectAccess::None,
        })
    }
}

// ---------------------------------------------------------------------------
// Workflow import
// ---------------------------------------------------------------------------

/// Stores the workflow of a generated bundle in `workflows` and links the
/// instances that produced it.
pub struct PgWorkflowImporter {
    pool: DbPool,
}

impl PgWorkflowImporter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowImporter for PgWorkflowImporter {
    async fn import(
        &self,
        project: &Project,
        bundle: &[u8],
        options: &ImportOptions,
    ) -> Result<ImportOutcome, EngineError> {
        let generated = archive::decode_bytes(bundle)?;
        let definition = generated.definition;
        if definition.workflow.is_empty() {
            return Err(EngineError::Import(
                "bundle does not contain a workflow".to_string(),
            ));
        }
        let name = generated_workflow::workflow_name(&definition.workflow)?;
        let template_ref = generated_workflow::template_ref(&definition.workflow);

        let existing = WorkflowRepo::find_by_project_and_name(&self.pool, project.id, &name)
            .await
            .map_err(StoreError::from)?;
        if let Some(existing) = &existing {
            if !options.force && existing.template_ref != template_ref {
                return Err(EngineError::Import(format!(
                    "Workflow {name} already exists in project {} and was not generated from this template",
                    project.key
                )));
            }
        }

        let input = UpsertWorkflow {
            project_id: project.id,
            name: name.clone(),
            definition: definition.workflow,
            pipelines: definition.pipelines,
            applications: definition.applications,
            environments: definition.environments,
            template_ref,
        };
        let workflow = WorkflowRepo::upsert(&self.pool, &input)
            .await
            .map_err(StoreError::from)?;
        let linked = match input.template_ref.as_deref() {
            Some(path) => {
                TemplateInstanceRepo::link_workflow(&self.pool, project.id, &name, path, workflow.id)
                    .await
                    .map_err(StoreError::from)?
            }
            None => 0,
        };

        tracing::info!(
            project = %project.key,
            workflow_id = workflow.id,
            workflow = %name,
            linked_instances = linked,
            "Workflow imported"
        );

        let mut messages = vec![if existing.is_some() {
            format!("Workflow {name} has been updated")
        } else {
            format!("Workflow {name} has been created")
        }];
        for (kind, count) in [
            ("pipeline", input.pipelines.len()),
            ("application", input.applications.len()),
            ("environment", input.environments.len()),
        ] {
            if count > 0 {
                messages.push(format!("{count} {kind} definition(s) imported"));
            }
        }

        Ok(ImportOutcome {
            messages,
            workflow_id: workflow.id,
            workflow_name: name,
        })
    }
}
