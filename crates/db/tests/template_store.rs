//! Repository and store tests against a real database.
//!
//! Run with `DATABASE_URL=... cargo test -p stencil-db -- --ignored`.

use assert_matches::assert_matches;
use sqlx::PgPool;
use stencil_core::bulk::{pending_operations, OperationStatus};
use stencil_core::request::TemplateRequest;
use stencil_core::template::{TemplateDefinition, TemplateSpec};
use stencil_db::models::group::CreateGroup;
use stencil_db::models::project::CreateProject;
use stencil_db::models::template::{CreateWorkflowTemplate, UpdateWorkflowTemplate, WorkflowTemplate};
use stencil_db::models::template_audit::{AuditEntry, AUDIT_EVENT_CREATED, AUDIT_EVENT_UPDATED};
use stencil_db::models::template_bulk::CreateTemplateBulk;
use stencil_db::models::template_instance::CreateTemplateInstance;
use stencil_db::repositories::{GroupRepo, ProjectRepo};
use stencil_db::{InstanceTx, PgTemplateStore, StoreError, TemplateStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn spec(slug: &str) -> TemplateSpec {
    TemplateSpec {
        name: format!("Template {slug}"),
        slug: slug.to_string(),
        definition: TemplateDefinition {
            workflow: "name: {{ .name }}\n".into(),
            pipelines: vec!["name: build\n".into(), "name: test\n".into()],
            ..Default::default()
        },
        ..Default::default()
    }
}

fn request(project: &str, workflow: &str) -> TemplateRequest {
    TemplateRequest {
        project_key: project.into(),
        workflow_name: workflow.into(),
        ..Default::default()
    }
}

fn entry(event_type: &str) -> AuditEntry {
    AuditEntry {
        event_type: event_type.into(),
        actor_id: Some(7),
        change_message: None,
        data_before: None,
    }
}

async fn insert(store: &PgTemplateStore, group_id: i64, slug: &str) -> WorkflowTemplate {
    let (template, _) = store
        .insert_template_with_audit(
            &CreateWorkflowTemplate::from_spec(group_id, &spec(slug)),
            &entry(AUDIT_EVENT_CREATED),
        )
        .await
        .unwrap();
    template
}

async fn seed(pool: &PgPool) -> (i64, i64) {
    let group = GroupRepo::create(pool, &CreateGroup { name: "shared".into() })
        .await
        .unwrap();
    let project = ProjectRepo::create(
        pool,
        &CreateProject {
            key: "PROJ".into(),
            name: "Project".into(),
        },
    )
    .await
    .unwrap();
    (group.id, project.id)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_duplicate_group_slug_is_conflict(pool: PgPool) {
    let (group_id, _) = seed(&pool).await;
    let store = PgTemplateStore::new(pool);

    let created = insert(&store, group_id, "go").await;
    assert_eq!(created.version, 0);
    assert_eq!(created.group_name, "shared");
    assert_eq!(created.pipelines.0.len(), 2);

    let dup = store
        .insert_template_with_audit(
            &CreateWorkflowTemplate::from_spec(group_id, &spec("go")),
            &entry(AUDIT_EVENT_CREATED),
        )
        .await;
    assert_matches!(dup, Err(StoreError::Conflict(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_versioned_update_bumps_once(pool: PgPool) {
    let (group_id, _) = seed(&pool).await;
    let store = PgTemplateStore::new(pool);
    let created = insert(&store, group_id, "go").await;

    let update = UpdateWorkflowTemplate::from_spec(group_id, &spec("go"));
    let (updated, audit) = store
        .update_template_with_audit(created.id, 0, &update, &entry(AUDIT_EVENT_UPDATED))
        .await
        .unwrap()
        .expect("version matched");
    assert_eq!(updated.version, 1);
    assert_eq!(audit.version, 1);
    assert_eq!(audit.workflow_template_id, created.id);

    let stale = store
        .update_template_with_audit(created.id, 0, &update, &entry(AUDIT_EVENT_UPDATED))
        .await
        .unwrap();
    assert!(stale.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_rejected_audit_rolls_back_template_write(pool: PgPool) {
    let (group_id, _) = seed(&pool).await;
    let store = PgTemplateStore::new(pool);

    let failed = store
        .insert_template_with_audit(
            &CreateWorkflowTemplate::from_spec(group_id, &spec("go")),
            &entry("renamed"),
        )
        .await;
    assert_matches!(failed, Err(StoreError::Database(_)));
    assert!(store.find_template_by_slug(group_id, "go").await.unwrap().is_none());

    let created = insert(&store, group_id, "go").await;
    let failed = store
        .update_template_with_audit(
            created.id,
            0,
            &UpdateWorkflowTemplate::from_spec(group_id, &spec("go")),
            &entry("renamed"),
        )
        .await;
    assert_matches!(failed, Err(StoreError::Database(_)));
    let stored = store.find_template(created.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 0);
    assert_eq!(store.list_audits_since(created.id, -1).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_uncommitted_instance_rolls_back(pool: PgPool) {
    let (group_id, project_id) = seed(&pool).await;
    let store = PgTemplateStore::new(pool);
    let template = insert(&store, group_id, "go").await;

    let input = CreateTemplateInstance {
        workflow_template_id: template.id,
        project_id,
        workflow_template_version: 0,
        request: request("PROJ", "build"),
    };

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_instance(&input).await.unwrap();
    }
    assert!(store
        .list_instances(template.id, &[project_id])
        .await
        .unwrap()
        .is_empty());

    let mut tx = store.begin().await.unwrap();
    tx.insert_instance(&input).await.unwrap();
    let found = tx.find_instances(template.id, project_id, "build").await.unwrap();
    assert_eq!(found.len(), 1);
    tx.commit().await.unwrap();

    assert_eq!(
        store.list_instances(template.id, &[project_id]).await.unwrap().len(),
        1
    );
}

// ---------------------------------------------------------------------------
// Bulk jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_unfinished_bulks_follow_operation_status(pool: PgPool) {
    let (group_id, _) = seed(&pool).await;
    let store = PgTemplateStore::new(pool);
    let template = insert(&store, group_id, "go").await;

    let bulk = store
        .insert_bulk(&CreateTemplateBulk {
            workflow_template_id: template.id,
            user_id: 7,
            operations: pending_operations(vec![request("PROJ", "a"), request("PROJ", "b")]),
        })
        .await
        .unwrap();
    assert_eq!(store.list_unfinished_bulks().await.unwrap().len(), 1);

    let mut ops = bulk.operations.0.clone();
    for op in &mut ops {
        op.start().unwrap();
        op.complete().unwrap();
    }
    store.update_bulk_operations(bulk.id, &ops).await.unwrap();

    let reloaded = store.find_bulk(bulk.id).await.unwrap().unwrap();
    assert!(reloaded
        .operations
        .0
        .iter()
        .all(|op| op.status == OperationStatus::Done));
    assert!(store.list_unfinished_bulks().await.unwrap().is_empty());
}
