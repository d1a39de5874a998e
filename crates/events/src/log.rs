//! Structured-log sink for template events.

use tokio::sync::broadcast;

use crate::bus::TemplateEvent;

/// Background subscriber that logs every event it receives.
pub struct EventLog;

impl EventLog {
    /// Run until the bus is dropped.
    pub async fn run(mut receiver: broadcast::Receiver<TemplateEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        event_type = event.kind.name(),
                        template_id = event.template_id,
                        project_id = ?event.project_id,
                        instance_id = ?event.instance_id,
                        actor_user_id = ?event.actor_user_id,
                        "Template event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event log lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event log shutting down");
                    break;
                }
            }
        }
    }
}
