use stencil_core::error::CoreError;
use stencil_db::StoreError;

/// Failures surfaced by engine operations.
///
/// `Core` carries request-validation, not-found and generation failures.
/// `Store` is infrastructure. `Import` and `Fetch` come from collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Workflow import failed: {0}")]
    Import(String),

    #[error("Template download failed: {0}")]
    Fetch(String),
}

impl EngineError {
    /// Text recorded on a failed bulk operation.
    ///
    /// User errors keep their message; infrastructure failures are reduced
    /// to a generic cause so that internal details stay in the logs.
    pub fn cause(&self) -> String {
        match self {
            EngineError::Core(e) => e.cause(),
            EngineError::Store(StoreError::Conflict(msg)) => msg.clone(),
            EngineError::Store(_) => "internal server error".to_string(),
            EngineError::Import(msg) | EngineError::Fetch(msg) => msg.clone(),
        }
    }

    /// `true` when the caller can fix the request; `false` for infrastructure.
    pub fn is_user_error(&self) -> bool {
        match self {
            EngineError::Core(CoreError::Internal(_)) => false,
            EngineError::Core(_) => true,
            EngineError::Store(StoreError::Conflict(_)) => true,
            EngineError::Store(_) => false,
            EngineError::Import(_) | EngineError::Fetch(_) => true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::Core(CoreError::NotFoundMessage(message.into()))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Core(CoreError::Validation(message.into()))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        EngineError::Core(CoreError::Forbidden(message.into()))
    }
}
