//! Zero-sized repository structs, one per table.

mod group_repo;
mod project_repo;
mod template_audit_repo;
mod template_bulk_repo;
mod template_instance_repo;
mod template_repo;
mod workflow_repo;

pub use group_repo::GroupRepo;
pub use project_repo::ProjectRepo;
pub use template_audit_repo::TemplateAuditRepo;
pub use template_bulk_repo::TemplateBulkRepo;
pub use template_instance_repo::TemplateInstanceRepo;
pub use template_repo::TemplateRepo;
pub use workflow_repo::WorkflowRepo;
