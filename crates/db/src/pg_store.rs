//! [`TemplateStore`] backed by Postgres through the repositories.

use async_trait::async_trait;
use stencil_core::bulk::BulkOperation;
use stencil_core::types::DbId;

use crate::error::{StoreError, StoreResult};
use crate::models::group::Group;
use crate::models::template::{CreateWorkflowTemplate, UpdateWorkflowTemplate, WorkflowTemplate};
use crate::models::template_audit::{AuditEntry, TemplateAudit};
use crate::models::template_bulk::{CreateTemplateBulk, TemplateBulk};
use crate::models::template_instance::{CreateTemplateInstance, TemplateInstance};
use crate::repositories::{
    GroupRepo, TemplateAuditRepo, TemplateBulkRepo, TemplateInstanceRepo, TemplateRepo,
};
use crate::store::{InstanceTx, TemplateStore};
use crate::DbPool;

#[derive(Debug, Clone)]
pub struct PgTemplateStore {
    pool: DbPool,
}

impl PgTemplateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// An open Postgres transaction. Rolled back on drop unless committed.
pub struct PgInstanceTx {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl InstanceTx for PgInstanceTx {
    async fn find_instances(
        &mut self,
        workflow_template_id: DbId,
        project_id: DbId,
        workflow_name: &str,
    ) -> StoreResult<Vec<TemplateInstance>> {
        Ok(TemplateInstanceRepo::find_for_request(
            &mut self.tx,
            workflow_template_id,
            project_id,
            workflow_name,
        )
        .await?)
    }

    async fn insert_instance(
        &mut self,
        input: &CreateTemplateInstance,
    ) -> StoreResult<TemplateInstance> {
        Ok(TemplateInstanceRepo::create(&mut self.tx, input).await?)
    }

    async fn update_instance(
        &mut self,
        instance: &TemplateInstance,
    ) -> StoreResult<TemplateInstance> {
        Ok(TemplateInstanceRepo::update(&mut self.tx, instance).await?)
    }

    async fn delete_instance(&mut self, id: DbId) -> StoreResult<()> {
        Ok(TemplateInstanceRepo::delete(&mut self.tx, id).await?)
    }

    async fn commit(self) -> StoreResult<()> {
        Ok(self.tx.commit().await?)
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    type Tx = PgInstanceTx;

    async fn begin(&self) -> StoreResult<PgInstanceTx> {
        let tx = self.pool.begin().await?;
        Ok(PgInstanceTx { tx })
    }

    async fn find_group(&self, id: DbId) -> StoreResult<Option<Group>> {
        Ok(GroupRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_group_by_name(&self, name: &str) -> StoreResult<Option<Group>> {
        Ok(GroupRepo::find_by_name(&self.pool, name).await?)
    }

    async fn insert_template_with_audit(
        &self,
        input: &CreateWorkflowTemplate,
        audit: &AuditEntry,
    ) -> StoreResult<(WorkflowTemplate, TemplateAudit)> {
        let mut tx = self.pool.begin().await?;
        let template = TemplateRepo::create(&mut tx, input).await?;
        let audit = TemplateAuditRepo::create(&mut tx, &audit.for_template(&template)?).await?;
        tx.commit().await?;
        Ok((template, audit))
    }

    async fn update_template_with_audit(
        &self,
        id: DbId,
        expected_version: i64,
        input: &UpdateWorkflowTemplate,
        audit: &AuditEntry,
    ) -> StoreResult<Option<(WorkflowTemplate, TemplateAudit)>> {
        let mut tx = self.pool.begin().await?;
        let updated = TemplateRepo::update_versioned(&mut tx, id, expected_version, input).await?;
        let Some(template) = updated else {
            return Ok(None);
        };
        let audit = TemplateAuditRepo::create(&mut tx, &audit.for_template(&template)?).await?;
        tx.commit().await?;
        Ok(Some((template, audit)))
    }

    async fn find_template(&self, id: DbId) -> StoreResult<Option<WorkflowTemplate>> {
        Ok(TemplateRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_template_by_slug(
        &self,
        group_id: DbId,
        slug: &str,
    ) -> StoreResult<Option<WorkflowTemplate>> {
        Ok(TemplateRepo::find_by_group_and_slug(&self.pool, group_id, slug).await?)
    }

    async fn list_templates(&self, group_ids: &[DbId]) -> StoreResult<Vec<WorkflowTemplate>> {
        Ok(TemplateRepo::list_for_groups(&self.pool, group_ids).await?)
    }

    async fn delete_template(&self, id: DbId) -> StoreResult<bool> {
        Ok(TemplateRepo::delete(&self.pool, id).await?)
    }

    async fn list_audits_since(
        &self,
        workflow_template_id: DbId,
        since_version: i64,
    ) -> StoreResult<Vec<TemplateAudit>> {
        Ok(TemplateAuditRepo::list_since(&self.pool, workflow_template_id, since_version).await?)
    }

    async fn list_instances(
        &self,
        workflow_template_id: DbId,
        project_ids: &[DbId],
    ) -> StoreResult<Vec<TemplateInstance>> {
        Ok(
            TemplateInstanceRepo::list_for_projects(&self.pool, workflow_template_id, project_ids)
                .await?,
        )
    }

    async fn find_instance_by_workflow(
        &self,
        workflow_id: DbId,
    ) -> StoreResult<Option<TemplateInstance>> {
        Ok(TemplateInstanceRepo::find_by_workflow(&self.pool, workflow_id).await?)
    }

    async fn delete_template_instance(
        &self,
        workflow_template_id: DbId,
        id: DbId,
    ) -> StoreResult<bool> {
        Ok(TemplateInstanceRepo::delete_for_template(&self.pool, workflow_template_id, id).await?)
    }

    async fn insert_bulk(&self, input: &CreateTemplateBulk) -> StoreResult<TemplateBulk> {
        Ok(TemplateBulkRepo::create(&self.pool, input).await?)
    }

    async fn find_bulk(&self, id: DbId) -> StoreResult<Option<TemplateBulk>> {
        Ok(TemplateBulkRepo::find_by_id(&self.pool, id).await?)
    }

    async fn update_bulk_operations(
        &self,
        id: DbId,
        operations: &[BulkOperation],
    ) -> StoreResult<()> {
        if TemplateBulkRepo::update_operations(&self.pool, id, operations).await? {
            Ok(())
        } else {
            Err(StoreError::Database(sqlx::Error::RowNotFound))
        }
    }

    async fn list_unfinished_bulks(&self) -> StoreResult<Vec<TemplateBulk>> {
        Ok(TemplateBulkRepo::list_unfinished(&self.pool).await?)
    }
}
