//! Projects that templates are applied to.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stencil_core::types::{DbId, Timestamp};

/// A row from the `projects` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub key: String,
    pub name: String,
    pub created_at: Timestamp,
}

/// DTO for inserting a new project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub key: String,
    pub name: String,
}

/// Member role allowing reads only.
pub const MEMBER_ROLE_READ: &str = "read";

/// Member role allowing reads and workflow imports.
pub const MEMBER_ROLE_WRITE: &str = "write";

/// DTO for granting a user a role on a project.
#[derive(Debug, Clone, Deserialize)]
pub struct AddProjectMember {
    pub project_id: DbId,
    pub user_id: DbId,
    pub role: String,
}
