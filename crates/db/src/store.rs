//! Storage seam used by the engine.
//!
//! [`TemplateStore`] groups every durable read and write the engine needs.
//! Instance writes during reconciliation go through an [`InstanceTx`]:
//! nothing it does is visible until [`InstanceTx::commit`], and dropping it
//! uncommitted discards every write.

use async_trait::async_trait;
use stencil_core::bulk::BulkOperation;
use stencil_core::types::DbId;

use crate::error::StoreResult;
use crate::models::group::Group;
use crate::models::template::{CreateWorkflowTemplate, UpdateWorkflowTemplate, WorkflowTemplate};
use crate::models::template_audit::{AuditEntry, TemplateAudit};
use crate::models::template_bulk::{CreateTemplateBulk, TemplateBulk};
use crate::models::template_instance::{CreateTemplateInstance, TemplateInstance};

/// A transaction over the instance ledger.
#[async_trait]
pub trait InstanceTx: Send + Sized {
    /// Instances of `(template, project)` whose request targets `workflow_name`,
    /// oldest first.
    async fn find_instances(
        &mut self,
        workflow_template_id: DbId,
        project_id: DbId,
        workflow_name: &str,
    ) -> StoreResult<Vec<TemplateInstance>>;

    async fn insert_instance(
        &mut self,
        input: &CreateTemplateInstance,
    ) -> StoreResult<TemplateInstance>;

    async fn update_instance(&mut self, instance: &TemplateInstance)
        -> StoreResult<TemplateInstance>;

    async fn delete_instance(&mut self, id: DbId) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
}

/// Durable records for templates, instances and bulk jobs.
#[async_trait]
pub trait TemplateStore: Send + Sync + 'static {
    type Tx: InstanceTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    async fn find_group(&self, id: DbId) -> StoreResult<Option<Group>>;

    async fn find_group_by_name(&self, name: &str) -> StoreResult<Option<Group>>;

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    /// Insert at version 0 together with its audit entry, atomically.
    /// A duplicate `(group, slug)` is a `Conflict`.
    async fn insert_template_with_audit(
        &self,
        input: &CreateWorkflowTemplate,
        audit: &AuditEntry,
    ) -> StoreResult<(WorkflowTemplate, TemplateAudit)>;

    /// Replace content and bump the version by one if the stored version is
    /// still `expected_version`; `None` otherwise. The audit entry for the new
    /// version is written in the same transaction.
    async fn update_template_with_audit(
        &self,
        id: DbId,
        expected_version: i64,
        input: &UpdateWorkflowTemplate,
        audit: &AuditEntry,
    ) -> StoreResult<Option<(WorkflowTemplate, TemplateAudit)>>;

    async fn find_template(&self, id: DbId) -> StoreResult<Option<WorkflowTemplate>>;

    async fn find_template_by_slug(
        &self,
        group_id: DbId,
        slug: &str,
    ) -> StoreResult<Option<WorkflowTemplate>>;

    async fn list_templates(&self, group_ids: &[DbId]) -> StoreResult<Vec<WorkflowTemplate>>;

    async fn delete_template(&self, id: DbId) -> StoreResult<bool>;

    // -----------------------------------------------------------------------
    // Audits
    // -----------------------------------------------------------------------

    async fn list_audits_since(
        &self,
        workflow_template_id: DbId,
        since_version: i64,
    ) -> StoreResult<Vec<TemplateAudit>>;

    // -----------------------------------------------------------------------
    // Instances (read side)
    // -----------------------------------------------------------------------

    async fn list_instances(
        &self,
        workflow_template_id: DbId,
        project_ids: &[DbId],
    ) -> StoreResult<Vec<TemplateInstance>>;

    async fn find_instance_by_workflow(
        &self,
        workflow_id: DbId,
    ) -> StoreResult<Option<TemplateInstance>>;

    /// Returns `false` if no instance with that id belongs to the template.
    async fn delete_template_instance(
        &self,
        workflow_template_id: DbId,
        id: DbId,
    ) -> StoreResult<bool>;

    // -----------------------------------------------------------------------
    // Bulk jobs
    // -----------------------------------------------------------------------

    async fn insert_bulk(&self, input: &CreateTemplateBulk) -> StoreResult<TemplateBulk>;

    async fn find_bulk(&self, id: DbId) -> StoreResult<Option<TemplateBulk>>;

    /// Persist the full operations array of a job.
    async fn update_bulk_operations(
        &self,
        id: DbId,
        operations: &[BulkOperation],
    ) -> StoreResult<()>;

    /// Jobs with any `Pending` or `Processing` operation.
    async fn list_unfinished_bulks(&self) -> StoreResult<Vec<TemplateBulk>>;
}
