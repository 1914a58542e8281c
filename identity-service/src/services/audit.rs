//! Best-effort audit channel. Emitting never blocks and never fails the
//! caller; a detached worker drains the queue into the sink.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::store::AuditSink;
use crate::models::AuditEvent;

#[derive(Clone)]
pub struct AuditDispatcher {
    sender: Option<mpsc::UnboundedSender<AuditEvent>>,
}

impl AuditDispatcher {
    /// Start the worker on the current runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuditEvent>();

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = sink.append(&event).await {
                    tracing::warn!(
                        error = %e,
                        action = event.action.as_str(),
                        event_id = %event.event_id,
                        "Failed to write audit event"
                    );
                }
            }
            tracing::debug!("Audit worker stopped");
        });

        Self {
            sender: Some(sender),
        }
    }

    /// Dispatcher that drops every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: AuditEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(event).is_err() {
            tracing::debug!("Audit worker is gone, event dropped");
        }
    }
}
