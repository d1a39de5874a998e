//! Repository for the `workflow_templates` table.
//!
//! Every read joins `groups` so rows carry their group name.

use sqlx::types::Json;
use sqlx::PgPool;
use stencil_core::types::DbId;

use crate::models::template::{CreateWorkflowTemplate, UpdateWorkflowTemplate, WorkflowTemplate};

/// Column list over `workflow_templates t JOIN groups g`.
const COLUMNS: &str = "t.id, t.group_id, g.name AS group_name, t.name, t.slug, t.description, \
    t.parameters, t.workflow, t.pipelines, t.applications, t.environments, t.import_url, \
    t.version, t.created_at, t.updated_at";

pub struct TemplateRepo;

impl TemplateRepo {
    /// Insert a template at version 0.
    ///
    /// A duplicate `(group_id, slug)` fails on `uq_workflow_templates_group_slug`.
    pub async fn create(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &CreateWorkflowTemplate,
    ) -> Result<WorkflowTemplate, sqlx::Error> {
        let query = format!(
            "WITH t AS ( \
                INSERT INTO workflow_templates \
                    (group_id, name, slug, description, parameters, workflow, \
                     pipelines, applications, environments, import_url, version) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0) \
                RETURNING * \
             ) \
             SELECT {COLUMNS} FROM t JOIN groups g ON g.id = t.group_id"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(input.group_id)
            .bind(&input.name)
            .bind(&input.slug)
            .bind(&input.description)
            .bind(Json(&input.parameters))
            .bind(&input.definition.workflow)
            .bind(Json(&input.definition.pipelines))
            .bind(Json(&input.definition.applications))
            .bind(Json(&input.definition.environments))
            .bind(&input.import_url)
            .fetch_one(&mut **tx)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_templates t JOIN groups g ON g.id = t.group_id \
             WHERE t.id = $1"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_group_and_slug(
        pool: &PgPool,
        group_id: DbId,
        slug: &str,
    ) -> Result<Option<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_templates t JOIN groups g ON g.id = t.group_id \
             WHERE t.group_id = $1 AND t.slug = $2"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(group_id)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_groups(
        pool: &PgPool,
        group_ids: &[DbId],
    ) -> Result<Vec<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_templates t JOIN groups g ON g.id = t.group_id \
             WHERE t.group_id = ANY($1) \
             ORDER BY g.name, t.slug"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(group_ids)
            .fetch_all(pool)
            .await
    }

    /// Replace the content and bump the version, only if the stored version
    /// still equals `expected_version`. Returns `None` when it does not.
    pub async fn update_versioned(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        expected_version: i64,
        input: &UpdateWorkflowTemplate,
    ) -> Result<Option<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "WITH t AS ( \
                UPDATE workflow_templates SET \
                    group_id = $3, name = $4, slug = $5, description = $6, parameters = $7, \
                    workflow = $8, pipelines = $9, applications = $10, environments = $11, \
                    import_url = $12, version = version + 1, updated_at = now() \
                WHERE id = $1 AND version = $2 \
                RETURNING * \
             ) \
             SELECT {COLUMNS} FROM t JOIN groups g ON g.id = t.group_id"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(id)
            .bind(expected_version)
            .bind(input.group_id)
            .bind(&input.name)
            .bind(&input.slug)
            .bind(&input.description)
            .bind(Json(&input.parameters))
            .bind(&input.definition.workflow)
            .bind(Json(&input.definition.pipelines))
            .bind(Json(&input.definition.applications))
            .bind(Json(&input.definition.environments))
            .bind(&input.import_url)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workflow_templates WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
