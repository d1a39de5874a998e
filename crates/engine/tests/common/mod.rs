#![allow(dead_code)]

//! Shared fixtures for engine tests: an in-memory store with real rollback,
//! in-memory collaborators and a wired-up engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::types::Json;
use stencil_core::archive;
use stencil_core::bulk::{BulkOperation, OperationStatus};
use stencil_core::error::CoreError;
use stencil_core::execution::{
    ExecutionContext, ExecutionResult, PlaceholderExecutor, TemplateExecutor,
};
use stencil_core::generated_workflow;
use stencil_core::request::TemplateRequest;
use stencil_core::template::{
    ParameterType, TemplateDefinition, TemplateParameter, TemplateSpec,
};
use stencil_core::types::DbId;
use stencil_db::models::group::Group;
use stencil_db::models::project::Project;
use stencil_db::models::template::{
    CreateWorkflowTemplate, UpdateWorkflowTemplate, WorkflowTemplate,
};
use stencil_db::models::template_audit::{AuditEntry, CreateTemplateAudit, TemplateAudit};
use stencil_db::models::template_bulk::{CreateTemplateBulk, TemplateBulk};
use stencil_db::models::template_instance::{CreateTemplateInstance, TemplateInstance};
use stencil_db::{InstanceTx, StoreError, StoreResult, TemplateStore};
use stencil_engine::collaborators::{
    ArchiveFetcher, ImportOptions, ImportOutcome, ProjectAccess, ProjectLoader, WorkflowImporter,
};
use stencil_engine::{Actor, Engine, EngineDeps, EngineError};
use stencil_events::{EventBus, TemplateEvent};
use tokio::sync::{broadcast, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct State {
    next_id: DbId,
    groups: BTreeMap<DbId, Group>,
    templates: BTreeMap<DbId, WorkflowTemplate>,
    audits: Vec<TemplateAudit>,
    instances: BTreeMap<DbId, TemplateInstance>,
    bulks: BTreeMap<DbId, TemplateBulk>,
}

impl State {
    fn allocate_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn insert_template(
        &mut self,
        input: &CreateWorkflowTemplate,
    ) -> StoreResult<WorkflowTemplate> {
        if self
            .templates
            .values()
            .any(|t| t.group_id == input.group_id && t.slug == input.slug)
        {
            return Err(StoreError::Conflict(
                "Duplicate value violates unique constraint: uq_workflow_templates_group_slug"
                    .to_string(),
            ));
        }
        let group_name = self
            .groups
            .get(&input.group_id)
            .map(|g| g.name.clone())
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        let now = chrono::Utc::now();
        let template = WorkflowTemplate {
            id: self.allocate_id(),
            group_id: input.group_id,
            group_name,
            name: input.name.clone(),
            slug: input.slug.clone(),
            description: input.description.clone(),
            parameters: Json(input.parameters.clone()),
            workflow: input.definition.workflow.clone(),
            pipelines: Json(input.definition.pipelines.clone()),
            applications: Json(input.definition.applications.clone()),
            environments: Json(input.definition.environments.clone()),
            import_url: input.import_url.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.templates.insert(template.id, template.clone());
        Ok(template)
    }

    fn update_template(
        &mut self,
        id: DbId,
        expected_version: i64,
        input: &UpdateWorkflowTemplate,
    ) -> StoreResult<Option<WorkflowTemplate>> {
        if self
            .templates
            .values()
            .any(|t| t.id != id && t.group_id == input.group_id && t.slug == input.slug)
        {
            return Err(StoreError::Conflict(
                "Duplicate value violates unique constraint: uq_workflow_templates_group_slug"
                    .to_string(),
            ));
        }
        let group_name = match self.groups.get(&input.group_id) {
            Some(g) => g.name.clone(),
            None => return Err(StoreError::Database(sqlx::Error::RowNotFound)),
        };
        let Some(stored) = self.templates.get_mut(&id) else {
            return Ok(None);
        };
        if stored.version != expected_version {
            return Ok(None);
        }
        stored.group_id = input.group_id;
        stored.group_name = group_name;
        stored.name = input.name.clone();
        stored.slug = input.slug.clone();
        stored.description = input.description.clone();
        stored.parameters = Json(input.parameters.clone());
        stored.workflow = input.definition.workflow.clone();
        stored.pipelines = Json(input.definition.pipelines.clone());
        stored.applications = Json(input.definition.applications.clone());
        stored.environments = Json(input.definition.environments.clone());
        stored.import_url = input.import_url.clone();
        stored.version += 1;
        stored.updated_at = chrono::Utc::now();
        Ok(Some(stored.clone()))
    }
}

/// A [`TemplateStore`] over a mutex-guarded snapshot.
///
/// A transaction holds the lock and works on a copy of the state; commit
/// swaps the copy in, drop throws it away.
#[derive(Default)]
pub struct MemoryStore {
    state: Arc<tokio::sync::Mutex<State>>,
    /// When set, every bulk persist fails.
    pub fail_bulk_updates: AtomicBool,
    /// When set, every audit write fails and rolls back its template write.
    pub fail_audits: AtomicBool,
    /// Every persisted operation list, in persist order.
    pub bulk_history: Mutex<Vec<(DbId, Vec<BulkOperation>)>>,
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

impl MemoryStore {
    pub async fn add_group(&self, name: &str) -> Group {
        let mut state = self.state.lock().await;
        let group = Group {
            id: state.allocate_id(),
            name: name.to_string(),
            created_at: chrono::Utc::now(),
        };
        state.groups.insert(group.id, group.clone());
        group
    }

    pub async fn instances(&self) -> Vec<TemplateInstance> {
        self.state.lock().await.instances.values().cloned().collect()
    }

    /// Store an instance directly, bypassing the reconciler.
    pub async fn seed_instance(
        &self,
        template: &WorkflowTemplate,
        project_id: DbId,
        request: TemplateRequest,
    ) -> TemplateInstance {
        let mut state = self.state.lock().await;
        let now = chrono::Utc::now();
        let instance = TemplateInstance {
            id: state.allocate_id(),
            workflow_template_id: template.id,
            project_id,
            workflow_template_version: template.version,
            request: Json(request),
            workflow_name: None,
            workflow_id: None,
            created_at: now,
            updated_at: now,
        };
        state.instances.insert(instance.id, instance.clone());
        instance
    }

    pub async fn link_workflow(&self, instance_id: DbId, workflow_id: DbId) {
        if let Some(instance) = self.state.lock().await.instances.get_mut(&instance_id) {
            instance.workflow_id = Some(workflow_id);
        }
    }

    fn write_audit(
        &self,
        state: &mut State,
        input: &CreateTemplateAudit,
    ) -> StoreResult<TemplateAudit> {
        if self.fail_audits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        let audit = TemplateAudit {
            id: state.allocate_id(),
            workflow_template_id: input.workflow_template_id,
            event_type: input.event_type.clone(),
            actor_id: input.actor_id,
            version: input.version,
            change_message: input.change_message.clone(),
            data_before: input.data_before.clone(),
            data_after: input.data_after.clone(),
            created_at: chrono::Utc::now(),
        };
        state.audits.push(audit.clone());
        Ok(audit)
    }

    pub async fn bulk_count(&self) -> usize {
        self.state.lock().await.bulks.len()
    }

    pub async fn template_count(&self) -> usize {
        self.state.lock().await.templates.len()
    }

    /// Persisted statuses of one operation, in persist order.
    pub fn status_history(&self, bulk_id: DbId, index: usize) -> Vec<OperationStatus> {
        let history = self.bulk_history.lock().unwrap();
        let mut statuses: Vec<OperationStatus> = Vec::new();
        for (id, ops) in history.iter() {
            if *id != bulk_id {
                continue;
            }
            let status = ops[index].status;
            if statuses.last() != Some(&status) {
                statuses.push(status);
            }
        }
        statuses
    }
}

#[async_trait]
impl InstanceTx for MemoryTx {
    async fn find_instances(
        &mut self,
        workflow_template_id: DbId,
        project_id: DbId,
        workflow_name: &str,
    ) -> StoreResult<Vec<TemplateInstance>> {
        Ok(self
            .working
            .instances
            .values()
            .filter(|i| {
                i.workflow_template_id == workflow_template_id
                    && i.project_id == project_id
                    && i.request.0.workflow_name == workflow_name
            })
            .cloned()
            .collect())
    }

    async fn insert_instance(
        &mut self,
        input: &CreateTemplateInstance,
    ) -> StoreResult<TemplateInstance> {
        let now = chrono::Utc::now();
        let instance = TemplateInstance {
            id: self.working.allocate_id(),
            workflow_template_id: input.workflow_template_id,
            project_id: input.project_id,
            workflow_template_version: input.workflow_template_version,
            request: Json(input.request.clone()),
            workflow_name: None,
            workflow_id: None,
            created_at: now,
            updated_at: now,
        };
        self.working.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn update_instance(
        &mut self,
        instance: &TemplateInstance,
    ) -> StoreResult<TemplateInstance> {
        let stored = self
            .working
            .instances
            .get_mut(&instance.id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        stored.workflow_template_version = instance.workflow_template_version;
        stored.request = instance.request.clone();
        stored.workflow_name = instance.workflow_name.clone();
        stored.updated_at = chrono::Utc::now();
        Ok(stored.clone())
    }

    async fn delete_instance(&mut self, id: DbId) -> StoreResult<()> {
        self.working.instances.remove(&id);
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }

    async fn find_group(&self, id: DbId) -> StoreResult<Option<Group>> {
        Ok(self.state.lock().await.groups.get(&id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> StoreResult<Option<Group>> {
        Ok(self
            .state
            .lock()
            .await
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    async fn insert_template_with_audit(
        &self,
        input: &CreateWorkflowTemplate,
        audit: &AuditEntry,
    ) -> StoreResult<(WorkflowTemplate, TemplateAudit)> {
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        let template = working.insert_template(input)?;
        let audit = self.write_audit(&mut working, &audit.for_template(&template)?)?;
        *state = working;
        Ok((template, audit))
    }

    async fn update_template_with_audit(
        &self,
        id: DbId,
        expected_version: i64,
        input: &UpdateWorkflowTemplate,
        audit: &AuditEntry,
    ) -> StoreResult<Option<(WorkflowTemplate, TemplateAudit)>> {
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        let Some(template) = working.update_template(id, expected_version, input)? else {
            return Ok(None);
        };
        let audit = self.write_audit(&mut working, &audit.for_template(&template)?)?;
        *state = working;
        Ok(Some((template, audit)))
    }

    async fn find_template(&self, id: DbId) -> StoreResult<Option<WorkflowTemplate>> {
        Ok(self.state.lock().await.templates.get(&id).cloned())
    }

    async fn find_template_by_slug(
        &self,
        group_id: DbId,
        slug: &str,
    ) -> StoreResult<Option<WorkflowTemplate>> {
        Ok(self
            .state
            .lock()
            .await
            .templates
            .values()
            .find(|t| t.group_id == group_id && t.slug == slug)
            .cloned())
    }

    async fn list_templates(&self, group_ids: &[DbId]) -> StoreResult<Vec<WorkflowTemplate>> {
        Ok(self
            .state
            .lock()
            .await
            .templates
            .values()
            .filter(|t| group_ids.contains(&t.group_id))
            .cloned()
            .collect())
    }

    async fn delete_template(&self, id: DbId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let removed = state.templates.remove(&id).is_some();
        if removed {
            state.instances.retain(|_, i| i.workflow_template_id != id);
            state.bulks.retain(|_, b| b.workflow_template_id != id);
            state.audits.retain(|a| a.workflow_template_id != id);
        }
        Ok(removed)
    }

    async fn list_audits_since(
        &self,
        workflow_template_id: DbId,
        since_version: i64,
    ) -> StoreResult<Vec<TemplateAudit>> {
        let state = self.state.lock().await;
        let mut audits: Vec<TemplateAudit> = state
            .audits
            .iter()
            .filter(|a| a.workflow_template_id == workflow_template_id && a.version > since_version)
            .cloned()
            .collect();
        audits.sort_by(|a, b| b.version.cmp(&a.version).then(b.id.cmp(&a.id)));
        Ok(audits)
    }

    async fn list_instances(
        &self,
        workflow_template_id: DbId,
        project_ids: &[DbId],
    ) -> StoreResult<Vec<TemplateInstance>> {
        Ok(self
            .state
            .lock()
            .await
            .instances
            .values()
            .filter(|i| {
                i.workflow_template_id == workflow_template_id && project_ids.contains(&i.project_id)
            })
            .cloned()
            .collect())
    }

    async fn find_instance_by_workflow(
        &self,
        workflow_id: DbId,
    ) -> StoreResult<Option<TemplateInstance>> {
        Ok(self
            .state
            .lock()
            .await
            .instances
            .values()
            .find(|i| i.workflow_id == Some(workflow_id))
            .cloned())
    }

    async fn delete_template_instance(
        &self,
        workflow_template_id: DbId,
        id: DbId,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.instances.get(&id) {
            Some(i) if i.workflow_template_id == workflow_template_id => {
                state.instances.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_bulk(&self, input: &CreateTemplateBulk) -> StoreResult<TemplateBulk> {
        let mut state = self.state.lock().await;
        let now = chrono::Utc::now();
        let bulk = TemplateBulk {
            id: state.allocate_id(),
            workflow_template_id: input.workflow_template_id,
            user_id: input.user_id,
            operations: Json(input.operations.clone()),
            created_at: now,
            updated_at: now,
        };
        state.bulks.insert(bulk.id, bulk.clone());
        Ok(bulk)
    }

    async fn find_bulk(&self, id: DbId) -> StoreResult<Option<TemplateBulk>> {
        Ok(self.state.lock().await.bulks.get(&id).cloned())
    }

    async fn update_bulk_operations(
        &self,
        id: DbId,
        operations: &[BulkOperation],
    ) -> StoreResult<()> {
        if self.fail_bulk_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        let mut state = self.state.lock().await;
        let bulk = state
            .bulks
            .get_mut(&id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        bulk.operations = Json(operations.to_vec());
        bulk.updated_at = chrono::Utc::now();
        self.bulk_history
            .lock()
            .unwrap()
            .push((id, operations.to_vec()));
        Ok(())
    }

    async fn list_unfinished_bulks(&self) -> StoreResult<Vec<TemplateBulk>> {
        Ok(self
            .state
            .lock()
            .await
            .bulks
            .values()
            .filter(|b| !b.is_finished())
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Projects known by key; more can be added while a test runs.
///
/// Access is tracked per `(key, user)`, independently of whether the
/// project exists.
#[derive(Default)]
pub struct FakeProjects {
    projects: Mutex<HashMap<String, Project>>,
    access: Mutex<HashMap<(String, DbId), ProjectAccess>>,
    next_id: AtomicI64,
}

impl FakeProjects {
    /// Add a project the [`owner`] can write to.
    pub fn add(&self, key: &str) -> Project {
        self.set_access(key, owner().user_id, ProjectAccess::ReadWrite);
        let project = Project {
            id: 1000 + self.next_id.fetch_add(1, Ordering::SeqCst),
            key: key.to_string(),
            name: format!("Project {key}"),
            created_at: chrono::Utc::now(),
        };
        self.projects
            .lock()
            .unwrap()
            .insert(key.to_string(), project.clone());
        project
    }

    pub fn get(&self, key: &str) -> Option<Project> {
        self.projects.lock().unwrap().get(key).cloned()
    }

    pub fn set_access(&self, key: &str, user_id: DbId, access: ProjectAccess) {
        self.access
            .lock()
            .unwrap()
            .insert((key.to_string(), user_id), access);
    }
}

#[async_trait]
impl ProjectLoader for FakeProjects {
    async fn load(&self, key: &str) -> Result<Project, EngineError> {
        self.get(key)
            .ok_or_else(|| EngineError::not_found(format!("Project {key} not found")))
    }

    async fn access(&self, user_id: DbId, key: &str) -> Result<ProjectAccess, EngineError> {
        Ok(self
            .access
            .lock()
            .unwrap()
            .get(&(key.to_string(), user_id))
            .copied()
            .unwrap_or(ProjectAccess::None))
    }
}

/// One bundle handed to the importer.
#[derive(Debug, Clone)]
pub struct ImportedBundle {
    pub project_key: String,
    pub spec: TemplateSpec,
    pub options: ImportOptions,
}

/// Decodes and records every bundle it receives.
#[derive(Default)]
pub struct RecordingImporter {
    pub imports: Mutex<Vec<ImportedBundle>>,
    next_id: AtomicI64,
}

impl RecordingImporter {
    pub fn imported(&self) -> Vec<ImportedBundle> {
        self.imports.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowImporter for RecordingImporter {
    async fn import(
        &self,
        project: &Project,
        bundle: &[u8],
        options: &ImportOptions,
    ) -> Result<ImportOutcome, EngineError> {
        let spec = archive::decode_bytes(bundle)?;
        let workflow_name = generated_workflow::workflow_name(&spec.definition.workflow)?;
        self.imports.lock().unwrap().push(ImportedBundle {
            project_key: project.key.clone(),
            spec,
            options: options.clone(),
        });
        Ok(ImportOutcome {
            messages: vec![format!("Workflow {workflow_name} has been created")],
            workflow_id: 5000 + self.next_id.fetch_add(1, Ordering::SeqCst),
            workflow_name,
        })
    }
}

/// Serves archives registered per URL.
#[derive(Default)]
pub struct StaticFetcher {
    archives: Mutex<HashMap<String, Vec<u8>>>,
}

impl StaticFetcher {
    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.archives.lock().unwrap().insert(url.to_string(), bytes);
    }
}

#[async_trait]
impl ArchiveFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        self.archives
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| EngineError::Fetch(format!("{url} returned HTTP 404")))
    }
}

/// Validates like the placeholder executor but fails every real execution.
pub struct FailingExecutor;

impl TemplateExecutor for FailingExecutor {
    fn execute(
        &self,
        definition: &TemplateDefinition,
        context: Option<&ExecutionContext>,
    ) -> Result<ExecutionResult, CoreError> {
        match context {
            None => PlaceholderExecutor.execute(definition, None),
            Some(_) => Err(CoreError::Validation(
                "Invalid template workflow: execution failed".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub const GROUP: &str = "shared";
pub const SLUG: &str = "go-build";

pub struct Harness {
    pub engine: Engine<MemoryStore>,
    pub store: Arc<MemoryStore>,
    pub projects: Arc<FakeProjects>,
    pub importer: Arc<RecordingImporter>,
    pub fetcher: Arc<StaticFetcher>,
    pub events: broadcast::Receiver<TemplateEvent>,
    pub cancel: CancellationToken,
    pub group: Group,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_executor(Arc::new(PlaceholderExecutor)).await
    }

    pub async fn with_executor(executor: Arc<dyn TemplateExecutor>) -> Self {
        let store = Arc::new(MemoryStore::default());
        let group = store.add_group(GROUP).await;
        let projects = Arc::new(FakeProjects::default());
        let importer = Arc::new(RecordingImporter::default());
        let fetcher = Arc::new(StaticFetcher::default());
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();
        let cancel = CancellationToken::new();

        let engine = Engine::new(EngineDeps {
            store: Arc::clone(&store),
            executor,
            events: bus,
            projects: Arc::clone(&projects) as Arc<dyn ProjectLoader>,
            importer: Arc::clone(&importer) as Arc<dyn WorkflowImporter>,
            fetcher: Arc::clone(&fetcher) as Arc<dyn ArchiveFetcher>,
            cancel: cancel.clone(),
        });

        Self {
            engine,
            store,
            projects,
            importer,
            fetcher,
            events,
            cancel,
            group,
        }
    }

    pub async fn create_template(&self) -> WorkflowTemplate {
        self.engine
            .templates
            .create(&owner(), sample_spec())
            .await
            .expect("sample template is valid")
    }

    /// Events published so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<TemplateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn owner() -> Actor {
    Actor::user(7)
}

pub fn sample_spec() -> TemplateSpec {
    TemplateSpec {
        group: Some(GROUP.to_string()),
        name: "Go build".to_string(),
        slug: SLUG.to_string(),
        description: "Build and test a Go service".to_string(),
        parameters: vec![TemplateParameter {
            key: "repo".to_string(),
            param_type: ParameterType::Repository,
            required: false,
        }],
        definition: TemplateDefinition {
            workflow: "name: {{ .name }}\nversion: v1.0\nworkflow:\n  build:\n    pipeline: build\n"
                .to_string(),
            pipelines: vec!["name: build\nstages: [compile, test]\n".to_string()],
            applications: vec!["name: {{ .name }}-app\nrepo: '{{ .params.repo }}'\n".to_string()],
            environments: vec![],
        },
        import_url: None,
    }
}

pub fn request(project: &str, workflow: &str) -> TemplateRequest {
    TemplateRequest {
        project_key: project.to_string(),
        workflow_name: workflow.to_string(),
        parameters: [("repo".to_string(), "github/acme/api".to_string())]
            .into_iter()
            .collect(),
        detached: false,
    }
}
