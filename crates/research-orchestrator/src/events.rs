use research_core::{ChatMessage, SourcePayload};
use tokio::sync::mpsc;

use crate::batch::{BatchId, LoadingState};

/// Everything a front end needs to redraw as the orchestrator makes progress.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    BatchStarted { batch: BatchId, symbol: String },
    /// One source settled successfully; its panel can be shown right away.
    SourceReady { batch: BatchId, payload: SourcePayload },
    /// No source of the batch is pending any more.
    BatchSettled { batch: BatchId, loading: LoadingState },
    FollowUpStarted { symbol: String },
    MessageAppended(ChatMessage),
    /// The single user-facing error for a failed submission.
    Notification { message: String },
    Reset,
}

/// Fire-and-forget sender; a missing or closed receiver is not an error.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    pub(crate) fn emit(&self, event: OrchestratorEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                tracing::debug!("Event receiver dropped; event discarded");
            }
        }
    }
}
