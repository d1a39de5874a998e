//! Bulk Orchestrator.
//!
//! A job is validated and stored with every operation `Pending` before
//! [`BulkOrchestrator::submit`] returns. A background runner then walks the
//! operations in order, one at a time, persisting the full operation list
//! after every status change. A failed operation is recorded and skipped;
//! only a failure to persist stops the runner.
//!
//! Each runner owns a child of the orchestrator's cancellation token and
//! checks it between operations. After a restart, [`recover_interrupted`]
//! fails operations left in `Processing` and [`resume_pending`] restarts
//! runners for jobs that still have `Pending` work.
//!
//! [`recover_interrupted`]: BulkOrchestrator::recover_interrupted
//! [`resume_pending`]: BulkOrchestrator::resume_pending

use std::sync::Arc;

use stencil_core::archive;
use stencil_core::bulk::{self, pending_operations, OperationStatus};
use stencil_core::error::CoreError;
use stencil_core::request::TemplateRequest;
use stencil_core::types::DbId;
use stencil_db::models::template::WorkflowTemplate;
use stencil_db::models::template_bulk::{CreateTemplateBulk, TemplateBulk};
use stencil_db::TemplateStore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::actor::Actor;
use crate::collaborators::{
    has_access, ImportOptions, ImportOutcome, ProjectAccess, ProjectLoader, WorkflowImporter,
    WRITE_PERMISSION_REQUIRED,
};
use crate::error::EngineError;
use crate::reconciler::InstanceReconciler;

pub struct BulkOrchestrator<S: TemplateStore> {
    runner: Arc<BulkRunner<S>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Shared state of every runner task.
struct BulkRunner<S: TemplateStore> {
    store: Arc<S>,
    reconciler: Arc<InstanceReconciler<S>>,
    projects: Arc<dyn ProjectLoader>,
    importer: Arc<dyn WorkflowImporter>,
}

impl<S: TemplateStore> BulkOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        reconciler: Arc<InstanceReconciler<S>>,
        projects: Arc<dyn ProjectLoader>,
        importer: Arc<dyn WorkflowImporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runner: Arc::new(BulkRunner {
                store,
                reconciler,
                projects,
                importer,
            }),
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate, persist and start a job. Returns once the job is stored.
    ///
    /// Any duplicate `(project key, workflow name)` or invalid request
    /// rejects the whole batch and nothing is stored. So does a non-admin
    /// actor without write access on any target project.
    pub async fn submit(
        &self,
        actor: &Actor,
        template: &WorkflowTemplate,
        requests: Vec<TemplateRequest>,
    ) -> Result<TemplateBulk, EngineError> {
        bulk::validate_bulk_requests(&template.parameters.0, &requests)?;
        for request in &requests {
            let key = &request.project_key;
            let projects = self.runner.projects.as_ref();
            if !has_access(projects, actor, key, ProjectAccess::ReadWrite).await? {
                tracing::warn!(
                    template_id = template.id,
                    user_id = actor.user_id,
                    project = %key,
                    "Bulk job rejected, no write access"
                );
                return Err(EngineError::forbidden(WRITE_PERMISSION_REQUIRED));
            }
        }

        let input = CreateTemplateBulk {
            workflow_template_id: template.id,
            user_id: actor.user_id,
            operations: pending_operations(requests),
        };
        let stored = self.runner.store.insert_bulk(&input).await?;

        tracing::info!(
            bulk_id = stored.id,
            template_id = template.id,
            user_id = actor.user_id,
            operations = stored.operations.0.len(),
            "Bulk job created"
        );

        self.spawn(*actor, template.clone(), stored.clone());
        Ok(stored)
    }

    fn spawn(&self, actor: Actor, template: WorkflowTemplate, job: TemplateBulk) {
        let runner = Arc::clone(&self.runner);
        let cancel = self.cancel.child_token();
        self.tracker
            .spawn(async move { runner.run(actor, template, job, cancel).await });
    }

    // -----------------------------------------------------------------------
    // Read model
    // -----------------------------------------------------------------------

    /// A job of `template`, visible to its owner and to admins only.
    pub async fn get_bulk(
        &self,
        actor: &Actor,
        template: &WorkflowTemplate,
        bulk_id: DbId,
    ) -> Result<TemplateBulk, EngineError> {
        let not_found = || {
            EngineError::Core(CoreError::NotFound {
                entity: "template bulk",
                id: bulk_id,
            })
        };
        let job = self
            .runner
            .store
            .find_bulk(bulk_id)
            .await?
            .ok_or_else(not_found)?;
        if job.workflow_template_id != template.id || !actor.can_see(job.user_id) {
            return Err(not_found());
        }
        Ok(job)
    }

    /// Start a new job from the failed operations of a finished one.
    pub async fn retry_failed(
        &self,
        actor: &Actor,
        template: &WorkflowTemplate,
        bulk_id: DbId,
    ) -> Result<TemplateBulk, EngineError> {
        let job = self.get_bulk(actor, template, bulk_id).await?;
        if !job.is_finished() {
            return Err(EngineError::Core(CoreError::Conflict(format!(
                "Bulk job {bulk_id} is still running"
            ))));
        }
        let requests = bulk::failed_requests(&job.operations.0);
        if requests.is_empty() {
            return Err(EngineError::validation(format!(
                "Bulk job {bulk_id} has no failed operation to retry"
            )));
        }
        tracing::info!(bulk_id, retried = requests.len(), "Retrying failed bulk operations");
        self.submit(actor, template, requests).await
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Fail every operation left in `Processing` by a previous process.
    ///
    /// Must run before any runner is started. Returns the number of
    /// operations moved to `Error`.
    pub async fn recover_interrupted(&self) -> Result<usize, EngineError> {
        let store = &self.runner.store;
        let mut total = 0;
        for job in store.list_unfinished_bulks().await? {
            let mut operations = job.operations.0;
            let recovered = bulk::recover_interrupted(&mut operations);
            if recovered == 0 {
                continue;
            }
            store.update_bulk_operations(job.id, &operations).await?;
            tracing::warn!(bulk_id = job.id, recovered, "Recovered interrupted bulk operations");
            total += recovered;
        }
        Ok(total)
    }

    /// Restart runners for jobs that still hold `Pending` operations.
    ///
    /// Resumed runners act on behalf of the job owner. Returns the number
    /// of runners started.
    pub async fn resume_pending(&self) -> Result<usize, EngineError> {
        let store = &self.runner.store;
        let mut resumed = 0;
        for job in store.list_unfinished_bulks().await? {
            if !bulk::has_pending(&job.operations.0) {
                continue;
            }
            let Some(template) = store.find_template(job.workflow_template_id).await? else {
                tracing::warn!(
                    bulk_id = job.id,
                    template_id = job.workflow_template_id,
                    "Template of pending bulk job is gone, skipping"
                );
                continue;
            };
            tracing::info!(bulk_id = job.id, template_id = template.id, "Resuming bulk job");
            self.spawn(Actor::user(job.user_id), template, job);
            resumed += 1;
        }
        Ok(resumed)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Wait until every runner started so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel all runners and wait for them to stop.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl<S: TemplateStore> BulkRunner<S> {
    async fn run(
        &self,
        actor: Actor,
        template: WorkflowTemplate,
        job: TemplateBulk,
        cancel: CancellationToken,
    ) {
        let bulk_id = job.id;
        let mut operations = job.operations.0;
        tracing::info!(bulk_id, template_id = template.id, "Bulk runner started");

        for index in 0..operations.len() {
            if operations[index].status != OperationStatus::Pending {
                continue;
            }
            if cancel.is_cancelled() {
                tracing::info!(bulk_id, "Bulk runner cancelled");
                return;
            }

            if let Err(e) = operations[index].start() {
                tracing::error!(bulk_id, index, error = %e, "Invalid bulk operation state");
                return;
            }
            if let Err(e) = self.store.update_bulk_operations(bulk_id, &operations).await {
                tracing::error!(bulk_id, error = %e, "Cannot persist bulk job, aborting");
                return;
            }

            let request = operations[index].request.clone();
            let step = match self.process(&actor, &template, &request).await {
                Ok(outcome) => {
                    tracing::info!(
                        bulk_id,
                        project = %request.project_key,
                        workflow = %outcome.workflow_name,
                        "Bulk operation done"
                    );
                    operations[index].complete()
                }
                Err(e) => {
                    tracing::warn!(
                        bulk_id,
                        project = %request.project_key,
                        workflow = %request.workflow_name,
                        error = %e,
                        "Bulk operation failed"
                    );
                    operations[index].fail(e.cause())
                }
            };
            if let Err(e) = step {
                tracing::error!(bulk_id, index, error = %e, "Invalid bulk operation state");
                return;
            }

            if let Err(e) = self.store.update_bulk_operations(bulk_id, &operations).await {
                tracing::error!(bulk_id, error = %e, "Cannot persist bulk job, aborting");
                return;
            }
        }

        let summary = bulk::BulkSummary::from_operations(&operations);
        tracing::info!(
            bulk_id,
            done = summary.done,
            error = summary.error,
            "Bulk runner finished"
        );
    }

    /// Reload the project, apply, package and import one request.
    async fn process(
        &self,
        actor: &Actor,
        template: &WorkflowTemplate,
        request: &TemplateRequest,
    ) -> Result<ImportOutcome, EngineError> {
        let project = self.projects.load(&request.project_key).await?;

        let mut request = request.clone();
        request.detached = false;
        let outcome = self
            .reconciler
            .apply(actor, template, &project, &request)
            .await?;

        let bundle = archive::encode_to_vec(&template.to_spec(), Some(&outcome.result))?;
        self.importer
            .import(&project, &bundle, &ImportOptions::default())
            .await
    }
}

