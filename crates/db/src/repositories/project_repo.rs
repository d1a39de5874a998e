//! Repository for the `projects` table.

use sqlx::PgPool;
use stencil_core::types::DbId;

use crate::models::project::{AddProjectMember, CreateProject, Project};

const COLUMNS: &str = "id, key, name, created_at";

pub struct ProjectRepo;

impl ProjectRepo {
    pub async fn create(pool: &PgPool, input: &CreateProject) -> Result<Project, sqlx::Error> {
        let query =
            format!("INSERT INTO projects (key, name) VALUES ($1, $2) RETURNING {COLUMNS}");
        sqlx::query_as::<_, Project>(&query)
            .bind(&input.key)
            .bind(&input.name)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_key(pool: &PgPool, key: &str) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE key = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_keys(pool: &PgPool, keys: &[String]) -> Result<Vec<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE key = ANY($1) ORDER BY key");
        sqlx::query_as::<_, Project>(&query)
            .bind(keys)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    /// Grant `role`, replacing any role the user already has on the project.
    pub async fn upsert_member(pool: &PgPool, input: &AddProjectMember) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO project_members (project_id, user_id, role) VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_project_members_project_user \
             DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(input.project_id)
        .bind(input.user_id)
        .bind(&input.role)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Role of `user_id` on the project with `key`, if any.
    pub async fn find_member_role(
        pool: &PgPool,
        key: &str,
        user_id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT m.role FROM project_members m JOIN projects p ON p.id = m.project_id \
             WHERE p.key = $1 AND m.user_id = $2",
        )
        .bind(key)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}
