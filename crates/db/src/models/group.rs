//! Template-owning groups.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stencil_core::types::{DbId, Timestamp};

/// A row from the `groups` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Group {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}

/// DTO for inserting a new group.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroup {
    pub name: String,
}
