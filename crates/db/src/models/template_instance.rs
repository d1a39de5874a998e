//! The instance ledger: which template version produced which workflow.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use stencil_core::request::TemplateRequest;
use stencil_core::types::{DbId, Timestamp};

/// A row from `workflow_template_instances`.
///
/// Detached instances use the same struct but are never written; their id
/// is negative.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct TemplateInstance {
    pub id: DbId,
    pub workflow_template_id: DbId,
    pub project_id: DbId,
    /// Template version this instance was generated from.
    pub workflow_template_version: i64,
    pub request: Json<TemplateRequest>,
    /// Resolved name of the generated workflow, once known.
    pub workflow_name: Option<String>,
    /// Identity of the imported workflow, once imported.
    pub workflow_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TemplateInstance {
    pub fn is_detached(&self) -> bool {
        stencil_core::instance::is_detached_id(self.id)
    }
}

/// DTO for inserting a new instance.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateInstance {
    pub workflow_template_id: DbId,
    pub project_id: DbId,
    pub workflow_template_version: i64,
    pub request: TemplateRequest,
}
