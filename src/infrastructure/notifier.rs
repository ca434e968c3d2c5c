use crate::domain::history::TransitionEvent;
use crate::domain::ports::Notifier;
use crate::error::NotifyError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Writes each transition to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        tracing::info!(
            aggregate = ?event.aggregate,
            aggregate_id = %event.aggregate_id,
            owner = %event.owner,
            reference = %event.reference,
            from = %event.from,
            to = %event.to,
            "transition"
        );
        Ok(())
    }
}

/// Keeps every event in memory, for assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<TransitionEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
