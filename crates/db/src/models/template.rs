//! Workflow template rows and DTOs.
//!
//! Sub-templates and parameters are stored as ordered JSONB arrays so their
//! order survives storage round trips.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use stencil_core::template::{TemplateDefinition, TemplateParameter, TemplateSpec};
use stencil_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from `workflow_templates`, joined with its group name.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct WorkflowTemplate {
    pub id: DbId,
    pub group_id: DbId,
    pub group_name: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub parameters: Json<Vec<TemplateParameter>>,
    pub workflow: String,
    pub pipelines: Json<Vec<String>>,
    pub applications: Json<Vec<String>>,
    pub environments: Json<Vec<String>>,
    pub import_url: Option<String>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkflowTemplate {
    pub fn definition(&self) -> TemplateDefinition {
        TemplateDefinition {
            workflow: self.workflow.clone(),
            pipelines: self.pipelines.0.clone(),
            applications: self.applications.0.clone(),
            environments: self.environments.0.clone(),
        }
    }

    /// Portable form, as carried by archives and audits.
    pub fn to_spec(&self) -> TemplateSpec {
        TemplateSpec {
            group: Some(self.group_name.clone()),
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            parameters: self.parameters.0.clone(),
            definition: self.definition(),
            import_url: self.import_url.clone(),
        }
    }

    /// `group/slug` path used in back-references.
    pub fn path(&self) -> String {
        stencil_core::generated_workflow::template_path(&self.group_name, &self.slug)
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for inserting a new template. Version always starts at 0.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowTemplate {
    pub group_id: DbId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub parameters: Vec<TemplateParameter>,
    pub definition: TemplateDefinition,
    pub import_url: Option<String>,
}

impl CreateWorkflowTemplate {
    pub fn from_spec(group_id: DbId, spec: &TemplateSpec) -> Self {
        Self {
            group_id,
            name: spec.name.clone(),
            slug: spec.slug.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
            definition: spec.definition.clone(),
            import_url: spec.import_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Update DTO
// ---------------------------------------------------------------------------

/// Full replacement of a template's content.
///
/// Applied with an optimistic version check; the stored version is bumped
/// by exactly one.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateWorkflowTemplate {
    pub group_id: DbId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub parameters: Vec<TemplateParameter>,
    pub definition: TemplateDefinition,
    pub import_url: Option<String>,
}

impl UpdateWorkflowTemplate {
    pub fn from_spec(group_id: DbId, spec: &TemplateSpec) -> Self {
        Self {
            group_id,
            name: spec.name.clone(),
            slug: spec.slug.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
            definition: spec.definition.clone(),
            import_url: spec.import_url.clone(),
        }
    }
}
