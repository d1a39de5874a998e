use stencil_core::types::DbId;

/// The authenticated user on whose behalf an engine call runs.
///
/// Authentication happens before the engine is called. The engine checks
/// project access and bulk job ownership against the actor, and attributes
/// events to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: DbId,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: DbId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: DbId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Admins see everything; others only what they own.
    pub fn can_see(&self, owner_id: DbId) -> bool {
        self.is_admin || self.user_id == owner_id
    }
}
