//! Row structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - An update DTO where rows are mutable

pub mod group;
pub mod project;
pub mod template;
pub mod template_audit;
pub mod template_bulk;
pub mod template_instance;
pub mod workflow;
