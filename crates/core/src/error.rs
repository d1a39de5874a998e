use std::fmt;

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Not-found for lookups keyed by something other than an id
    /// (group name, template slug, project key).
    #[error("Not found: {0}")]
    NotFoundMessage(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid archive: {0}")]
    InvalidArchive(ArchiveErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The message without the category prefix, suitable for showing to the
    /// user who submitted the request.
    pub fn cause(&self) -> String {
        match self {
            CoreError::NotFound { entity, id } => format!("{entity} with id {id} not found"),
            CoreError::NotFoundMessage(msg)
            | CoreError::Validation(msg)
            | CoreError::Conflict(msg)
            | CoreError::Forbidden(msg)
            | CoreError::Internal(msg) => msg.clone(),
            CoreError::InvalidArchive(errors) => errors.to_string(),
        }
    }
}

/// Every structural problem found while scanning an archive.
///
/// Decoding keeps reading after the first bad entry so that a single
/// submission reports all of its problems at once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveErrors {
    causes: Vec<String>,
}

impl ArchiveErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cause: impl Into<String>) {
        self.causes.push(cause.into());
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// `Ok(())` when nothing was recorded, otherwise the aggregate as a
    /// [`CoreError::InvalidArchive`].
    pub fn into_result(self) -> Result<(), CoreError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidArchive(self))
        }
    }
}

impl fmt::Display for ArchiveErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.causes.join(", "))
    }
}
