//! Template lifecycle events.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TemplateEvent`]: the event envelope for template and instance changes.
//! - [`EventLog`]: background subscriber writing every event to the log.

pub mod bus;
pub mod log;

pub use bus::{EventBus, TemplateEvent, TemplateEventKind};
pub use log::EventLog;
