//! Repository for the `workflows` table.

use sqlx::types::Json;
use sqlx::PgPool;
use stencil_core::types::DbId;

use crate::models::workflow::{UpsertWorkflow, Workflow};

const COLUMNS: &str = "id, project_id, name, definition, pipelines, applications, \
    environments, template_ref, created_at, updated_at";

pub struct WorkflowRepo;

impl WorkflowRepo {
    /// Insert a workflow, or replace the one with the same project and name.
    pub async fn upsert(pool: &PgPool, input: &UpsertWorkflow) -> Result<Workflow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflows \
                (project_id, name, definition, pipelines, applications, environments, template_ref) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT ON CONSTRAINT uq_workflows_project_name DO UPDATE SET \
                definition = EXCLUDED.definition, \
                pipelines = EXCLUDED.pipelines, \
                applications = EXCLUDED.applications, \
                environments = EXCLUDED.environments, \
                template_ref = EXCLUDED.template_ref, \
                updated_at = now() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(input.project_id)
            .bind(&input.name)
            .bind(&input.definition)
            .bind(Json(&input.pipelines))
            .bind(Json(&input.applications))
            .bind(Json(&input.environments))
            .bind(&input.template_ref)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_project_and_name(
        pool: &PgPool,
        project_id: DbId,
        name: &str,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE project_id = $1 AND name = $2");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(project_id)
            .bind(name)
            .fetch_optional(pool)
            .await
    }
}
