//! Bulk jobs. Operations live in one ordered JSONB array; the job's
//! status is derived from them on read.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use stencil_core::bulk::{BulkOperation, BulkSummary};
use stencil_core::types::{DbId, Timestamp};

/// A row from `workflow_template_bulks`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct TemplateBulk {
    pub id: DbId,
    pub workflow_template_id: DbId,
    /// Owner of the job.
    pub user_id: DbId,
    pub operations: Json<Vec<BulkOperation>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TemplateBulk {
    pub fn summary(&self) -> BulkSummary {
        BulkSummary::from_operations(&self.operations.0)
    }

    pub fn is_finished(&self) -> bool {
        stencil_core::bulk::is_finished(&self.operations.0)
    }
}

/// DTO for inserting a new bulk job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateBulk {
    pub workflow_template_id: DbId,
    pub user_id: DbId,
    pub operations: Vec<BulkOperation>,
}
