//! External collaborators, specified only at their interface.
//!
//! Each trait has one production implementation here; tests supply their
//! own in-memory versions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stencil_core::types::DbId;
use stencil_db::models::project::Project;

use crate::actor::Actor;
use crate::error::EngineError;

mod http;
mod pg;

pub use http::HttpArchiveFetcher;
pub use http::DEFAULT_FETCH_TIMEOUT;
pub use pg::{PgProjectLoader, PgWorkflowImporter};

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// What a non-admin user may do in a project. Ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProjectAccess {
    None,
    Read,
    ReadWrite,
}

/// Resolves a project key to a project, and a user to their access on it.
#[async_trait]
pub trait ProjectLoader: Send + Sync {
    /// Fails with a not-found error for unknown keys.
    async fn load(&self, key: &str) -> Result<Project, EngineError>;

    /// `ProjectAccess::None` for unknown keys and for non-members.
    async fn access(&self, user_id: DbId, key: &str) -> Result<ProjectAccess, EngineError>;
}

/// Cause of the `Forbidden` error when a non-admin cannot import into a
/// target project.
pub const WRITE_PERMISSION_REQUIRED: &str =
    "write permission on project required to import generated workflow.";

/// Whether `actor` has at least `required` access on project `key`.
/// Admins always do.
pub(crate) async fn has_access(
    projects: &dyn ProjectLoader,
    actor: &Actor,
    key: &str,
    required: ProjectAccess,
) -> Result<bool, EngineError> {
    if actor.is_admin {
        return Ok(true);
    }
    Ok(projects.access(actor.user_id, key).await? >= required)
}

// ---------------------------------------------------------------------------
// Workflow import
// ---------------------------------------------------------------------------

/// Options forwarded to the workflow importer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Replace an existing workflow even if it was not generated from the
    /// same template.
    #[serde(default)]
    pub force: bool,
}

/// What the importer reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub messages: Vec<String>,
    pub workflow_id: DbId,
    pub workflow_name: String,
}

/// Turns a generated bundle archive into a stored workflow.
#[async_trait]
pub trait WorkflowImporter: Send + Sync {
    async fn import(
        &self,
        project: &Project,
        bundle: &[u8],
        options: &ImportOptions,
    ) -> Result<ImportOutcome, EngineError>;
}

// ---------------------------------------------------------------------------
// Template download
// ---------------------------------------------------------------------------

/// Downloads a template archive from its import URL.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError>;
}
