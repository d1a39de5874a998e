//! Template instantiation engine.
//!
//! - [`InstanceReconciler`]: transactional create-or-update of instances.
//! - [`BulkOrchestrator`]: validated batches of apply requests, driven in
//!   the background with per-operation failure isolation.
//! - [`TemplateService`]: template lifecycle, archive push/pull, apply and
//!   instance queries.
//! - [`collaborators`]: project loading, workflow import and template
//!   download, with Postgres/HTTP implementations.

use std::sync::Arc;

use stencil_core::execution::TemplateExecutor;
use stencil_db::TemplateStore;
use stencil_events::EventBus;
use tokio_util::sync::CancellationToken;

pub mod actor;
pub mod bulk;
pub mod collaborators;
pub mod error;
pub mod reconciler;
pub mod service;

pub use actor::Actor;
pub use bulk::BulkOrchestrator;
pub use error::EngineError;
pub use reconciler::{ApplyOutcome, InstanceReconciler};
pub use service::TemplateService;

use collaborators::{ArchiveFetcher, ProjectLoader, WorkflowImporter};

/// Everything the engine needs from the outside.
pub struct EngineDeps<S: TemplateStore> {
    pub store: Arc<S>,
    pub executor: Arc<dyn TemplateExecutor>,
    pub events: Arc<EventBus>,
    pub projects: Arc<dyn ProjectLoader>,
    pub importer: Arc<dyn WorkflowImporter>,
    pub fetcher: Arc<dyn ArchiveFetcher>,
    /// Root token; every bulk runner gets a child of it.
    pub cancel: CancellationToken,
}

/// The wired-up engine components sharing one store and event bus.
pub struct Engine<S: TemplateStore> {
    pub templates: TemplateService<S>,
    pub bulks: BulkOrchestrator<S>,
    pub reconciler: Arc<InstanceReconciler<S>>,
}

impl<S: TemplateStore> Engine<S> {
    pub fn new(deps: EngineDeps<S>) -> Self {
        let reconciler = Arc::new(InstanceReconciler::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.executor),
            Arc::clone(&deps.events),
        ));
        let bulks = BulkOrchestrator::new(
            Arc::clone(&deps.store),
            Arc::clone(&reconciler),
            Arc::clone(&deps.projects),
            Arc::clone(&deps.importer),
            deps.cancel,
        );
        let templates = TemplateService::new(
            deps.store,
            Arc::clone(&reconciler),
            deps.executor,
            deps.events,
            deps.projects,
            deps.importer,
            deps.fetcher,
        );
        Self {
            templates,
            bulks,
            reconciler,
        }
    }
}
