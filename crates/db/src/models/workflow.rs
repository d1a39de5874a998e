//! Workflows imported from generated bundles.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use stencil_core::types::{DbId, Timestamp};

/// A row from the `workflows` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Workflow {
    pub id: DbId,
    pub project_id: DbId,
    pub name: String,
    pub definition: String,
    pub pipelines: Json<Vec<String>>,
    pub applications: Json<Vec<String>>,
    pub environments: Json<Vec<String>>,
    /// `group/slug` of the template that generated it.
    pub template_ref: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert-or-replace by `(project_id, name)`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertWorkflow {
    pub project_id: DbId,
    pub name: String,
    pub definition: String,
    pub pipelines: Vec<String>,
    pub applications: Vec<String>,
    pub environments: Vec<String>,
    pub template_ref: Option<String>,
}
