//! Repository for the `workflow_template_bulks` table.

use sqlx::types::Json;
use sqlx::PgPool;
use stencil_core::bulk::BulkOperation;
use stencil_core::types::DbId;

use crate::models::template_bulk::{CreateTemplateBulk, TemplateBulk};

const COLUMNS: &str = "id, workflow_template_id, user_id, operations, created_at, updated_at";

pub struct TemplateBulkRepo;

impl TemplateBulkRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateTemplateBulk,
    ) -> Result<TemplateBulk, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_template_bulks (workflow_template_id, user_id, operations) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateBulk>(&query)
            .bind(input.workflow_template_id)
            .bind(input.user_id)
            .bind(Json(&input.operations))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TemplateBulk>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_template_bulks WHERE id = $1");
        sqlx::query_as::<_, TemplateBulk>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite the whole operations array. Returns `false` if the job is gone.
    pub async fn update_operations(
        pool: &PgPool,
        id: DbId,
        operations: &[BulkOperation],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_template_bulks SET operations = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(Json(operations))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Jobs holding at least one `pending` or `processing` operation, oldest first.
    pub async fn list_unfinished(pool: &PgPool) -> Result<Vec<TemplateBulk>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_template_bulks \
             WHERE operations @> '[{{\"status\":\"pending\"}}]'::jsonb \
                OR operations @> '[{{\"status\":\"processing\"}}]'::jsonb \
             ORDER BY id"
        );
        sqlx::query_as::<_, TemplateBulk>(&query)
            .fetch_all(pool)
            .await
    }
}
