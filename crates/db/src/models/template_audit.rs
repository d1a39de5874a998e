//! Append-only audit trail of template versions.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stencil_core::types::{DbId, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::models::template::WorkflowTemplate;

/// Audit event written when a template is created.
pub const AUDIT_EVENT_CREATED: &str = "created";

/// Audit event written on each successful update.
pub const AUDIT_EVENT_UPDATED: &str = "updated";

/// A row from `workflow_template_audits`. Immutable once created.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct TemplateAudit {
    pub id: DbId,
    pub workflow_template_id: DbId,
    pub event_type: String,
    pub actor_id: Option<DbId>,
    /// Template version after the change.
    pub version: i64,
    pub change_message: Option<String>,
    pub data_before: Option<serde_json::Value>,
    pub data_after: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for inserting an audit entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateAudit {
    pub workflow_template_id: DbId,
    pub event_type: String,
    pub actor_id: Option<DbId>,
    pub version: i64,
    pub change_message: Option<String>,
    pub data_before: Option<serde_json::Value>,
    pub data_after: serde_json::Value,
}

/// Audit fields known before the template row is written.
///
/// The store completes it against the written row, inside the same
/// transaction as the template write.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub event_type: String,
    pub actor_id: Option<DbId>,
    pub change_message: Option<String>,
    pub data_before: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn for_template(&self, template: &WorkflowTemplate) -> StoreResult<CreateTemplateAudit> {
        let data_after = serde_json::to_value(template.to_spec())
            .map_err(|e| StoreError::Database(sqlx::Error::Encode(Box::new(e))))?;
        Ok(CreateTemplateAudit {
            workflow_template_id: template.id,
            event_type: self.event_type.clone(),
            actor_id: self.actor_id,
            version: template.version,
            change_message: self.change_message.clone(),
            data_before: self.data_before.clone(),
            data_after,
        })
    }
}
