//! Repository for the `workflow_template_audits` table.

use sqlx::PgPool;
use stencil_core::types::DbId;

use crate::models::template_audit::{CreateTemplateAudit, TemplateAudit};

const COLUMNS: &str = "id, workflow_template_id, event_type, actor_id, version, \
    change_message, data_before, data_after, created_at";

pub struct TemplateAuditRepo;

impl TemplateAuditRepo {
    /// Written in the transaction that wrote the template version.
    pub async fn create(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &CreateTemplateAudit,
    ) -> Result<TemplateAudit, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_template_audits \
                (workflow_template_id, event_type, actor_id, version, change_message, \
                 data_before, data_after) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateAudit>(&query)
            .bind(input.workflow_template_id)
            .bind(&input.event_type)
            .bind(input.actor_id)
            .bind(input.version)
            .bind(&input.change_message)
            .bind(&input.data_before)
            .bind(&input.data_after)
            .fetch_one(&mut **tx)
            .await
    }

    /// Entries for versions strictly greater than `since_version`, newest first.
    pub async fn list_since(
        pool: &PgPool,
        workflow_template_id: DbId,
        since_version: i64,
    ) -> Result<Vec<TemplateAudit>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_template_audits \
             WHERE workflow_template_id = $1 AND version > $2 \
             ORDER BY version DESC, id DESC"
        );
        sqlx::query_as::<_, TemplateAudit>(&query)
            .bind(workflow_template_id)
            .bind(since_version)
            .fetch_all(pool)
            .await
    }
}
