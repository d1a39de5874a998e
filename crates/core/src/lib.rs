//! Domain logic for workflow templates.
//!
//! Everything in this crate is pure: no database, no network. The archive
//! codec works on any `std::io::Read` / `std::io::Write`.

pub mod archive;
pub mod bulk;
pub mod error;
pub mod execution;
pub mod generated_workflow;
pub mod instance;
pub mod request;
pub mod template;
pub mod types;
