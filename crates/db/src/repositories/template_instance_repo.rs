//! Repository for the `workflow_template_instances` table.
//!
//! Writes made while reconciling an apply request take the caller's
//! transaction; read-side queries take the pool.

use sqlx::types::Json;
use sqlx::PgPool;
use stencil_core::types::DbId;

use crate::models::template_instance::{CreateTemplateInstance, TemplateInstance};

const COLUMNS: &str = "id, workflow_template_id, project_id, workflow_template_version, \
    request, workflow_name, workflow_id, created_at, updated_at";

pub struct TemplateInstanceRepo;

impl TemplateInstanceRepo {
    // -----------------------------------------------------------------------
    // Transactional
    // -----------------------------------------------------------------------

    /// Instances whose stored request targets `workflow_name`, oldest first.
    ///
    /// Rows are locked until the transaction ends.
    pub async fn find_for_request(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        workflow_template_id: DbId,
        project_id: DbId,
        workflow_name: &str,
    ) -> Result<Vec<TemplateInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_template_instances \
             WHERE workflow_template_id = $1 AND project_id = $2 \
               AND request->>'workflow_name' = $3 \
             ORDER BY id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, TemplateInstance>(&query)
            .bind(workflow_template_id)
            .bind(project_id)
            .bind(workflow_name)
            .fetch_all(&mut **tx)
            .await
    }

    pub async fn create(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &CreateTemplateInstance,
    ) -> Result<TemplateInstance, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_template_instances \
                (workflow_template_id, project_id, workflow_template_version, request) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateInstance>(&query)
            .bind(input.workflow_template_id)
            .bind(input.project_id)
            .bind(input.workflow_template_version)
            .bind(Json(&input.request))
            .fetch_one(&mut **tx)
            .await
    }

    /// Persist version, request and resolved workflow name.
    pub async fn update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        instance: &TemplateInstance,
    ) -> Result<TemplateInstance, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_template_instances SET \
                workflow_template_version = $2, request = $3, workflow_name = $4, \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateInstance>(&query)
            .bind(instance.id)
            .bind(instance.workflow_template_version)
            .bind(&instance.request)
            .bind(&instance.workflow_name)
            .fetch_one(&mut **tx)
            .await
    }

    pub async fn delete(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM workflow_template_instances WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pool
    // -----------------------------------------------------------------------

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<TemplateInstance>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_template_instances WHERE id = $1");
        sqlx::query_as::<_, TemplateInstance>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_projects(
        pool: &PgPool,
        workflow_template_id: DbId,
        project_ids: &[DbId],
    ) -> Result<Vec<TemplateInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_template_instances \
             WHERE workflow_template_id = $1 AND project_id = ANY($2) \
             ORDER BY id"
        );
        sqlx::query_as::<_, TemplateInstance>(&query)
            .bind(workflow_template_id)
            .bind(project_ids)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_workflow(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Option<TemplateInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_template_instances \
             WHERE workflow_id = $1 \
             ORDER BY id LIMIT 1"
        );
        sqlx::query_as::<_, TemplateInstance>(&query)
            .bind(workflow_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete an instance only if it belongs to the given template.
    pub async fn delete_for_template(
        pool: &PgPool,
        workflow_template_id: DbId,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM workflow_template_instances WHERE id = $1 AND workflow_template_id = $2",
        )
        .bind(id)
        .bind(workflow_template_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Point the instances of template `template_path` (`group/slug`) that
    /// generated `workflow_name` in the project at the imported workflow.
    /// Returns the number of rows linked.
    pub async fn link_workflow(
        pool: &PgPool,
        project_id: DbId,
        workflow_name: &str,
        template_path: &str,
        workflow_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_template_instances i SET workflow_id = $4, updated_at = now() \
             FROM workflow_templates t JOIN groups g ON g.id = t.group_id \
             WHERE i.workflow_template_id = t.id \
               AND i.project_id = $1 AND i.workflow_name = $2 \
               AND g.name || '/' || t.slug = $3",
        )
        .bind(project_id)
        .bind(workflow_name)
        .bind(template_path)
        .bind(workflow_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
