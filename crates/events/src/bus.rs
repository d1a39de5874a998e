//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the template service
//! and the reconciler. Events are published only after the change they
//! describe has been committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stencil_core::types::DbId;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// TemplateEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateEventKind {
    TemplateAdded,
    TemplateUpdated,
    TemplateDeleted,
    InstanceAdded,
    InstanceUpdated,
}

impl TemplateEventKind {
    /// Dot-separated name, e.g. `"template.added"`.
    pub fn name(self) -> &'static str {
        match self {
            TemplateEventKind::TemplateAdded => "template.added",
            TemplateEventKind::TemplateUpdated => "template.updated",
            TemplateEventKind::TemplateDeleted => "template.deleted",
            TemplateEventKind::InstanceAdded => "template_instance.added",
            TemplateEventKind::InstanceUpdated => "template_instance.updated",
        }
    }
}

/// A committed change to a template or one of its instances.
///
/// Built with [`TemplateEvent::new`] and the `with_*` builder methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEvent {
    pub kind: TemplateEventKind,
    pub template_id: DbId,
    pub project_id: Option<DbId>,
    pub instance_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    /// Free text supplied with template updates.
    pub change_message: Option<String>,
    /// Event-specific data, e.g. the previous state of an updated instance.
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl TemplateEvent {
    pub fn new(kind: TemplateEventKind, template_id: DbId) -> Self {
        Self {
            kind,
            template_id,
            project_id: None,
            instance_id: None,
            actor_user_id: None,
            change_message: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_instance(mut self, project_id: DbId, instance_id: DbId) -> Self {
        self.project_id = Some(project_id);
        self.instance_id = Some(instance_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_change_message(mut self, message: Option<String>) -> Self {
        self.change_message = message;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use stencil_events::bus::{EventBus, TemplateEvent, TemplateEventKind};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(TemplateEvent::new(TemplateEventKind::TemplateAdded, 1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<TemplateEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if there are none.
    pub fn publish(&self, event: TemplateEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TemplateEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
