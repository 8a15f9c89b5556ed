//! Multi-source analysis orchestrator.
//!
//! One submission either fans out to the four prediction sources or, once the
//! transcript already holds a finished exchange, asks a single follow-up question.
//! Source completions are applied one at a time by the submitting future.

use research_core::{
    AnalysisRequest, ChatMessage, Company, ResearchBackend, ResearchError, Source, SourcePayload,
    SourceState, TranscriptStore,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod batch;
pub mod events;

pub use batch::{BatchId, ConversationMode, LoadingState, Panels};
pub use events::OrchestratorEvent;

use events::EventSink;

#[cfg(test)]
mod tests;

/// How a submission ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// All four sources arrived; carries the synthesized assistant entry.
    Analyzed(ChatMessage),
    /// Follow-up reply appended to the transcript.
    FollowedUp(ChatMessage),
    /// A request failed and the rest of the batch was cancelled.
    /// `source` is `None` for follow-up failures.
    Failed {
        source: Option<Source>,
        error: ResearchError,
    },
    /// Cancelled from outside (shutdown or interrupt) before it settled.
    Abandoned,
}

pub struct ResearchOrchestrator {
    backend: Arc<dyn ResearchBackend>,
    store: Arc<dyn TranscriptStore>,
    events: EventSink,
    shutdown: CancellationToken,
    transcript: Vec<ChatMessage>,
    loading: LoadingState,
    panels: Panels,
    batch: Option<BatchId>,
    next_batch: u64,
    in_flight: Option<CancellationToken>,
}

impl ResearchOrchestrator {
    /// Start with an empty transcript.
    pub fn new(backend: Arc<dyn ResearchBackend>, store: Arc<dyn TranscriptStore>) -> Self {
        Self {
            backend,
            store,
            events: EventSink::default(),
            shutdown: CancellationToken::new(),
            transcript: Vec::new(),
            loading: LoadingState::default(),
            panels: Panels::default(),
            batch: None,
            next_batch: 1,
            in_flight: None,
        }
    }

    /// Start from whatever transcript the store holds.
    pub async fn restore(
        backend: Arc<dyn ResearchBackend>,
        store: Arc<dyn TranscriptStore>,
    ) -> Result<Self, ResearchError> {
        let transcript = store.load().await?;
        info!(entries = transcript.len(), "Restored chat transcript");
        let mut orchestrator = Self::new(backend, store);
        orchestrator.transcript = transcript;
        Ok(orchestrator)
    }

    pub fn with_events(mut self, sender: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    /// Every batch token is a child of `token`; cancelling it abandons any running batch.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn loading(&self) -> LoadingState {
        self.loading
    }

    pub fn panels(&self) -> &Panels {
        &self.panels
    }

    pub fn current_batch(&self) -> Option<BatchId> {
        self.batch
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Request pattern the next `submit` will use.
    pub fn mode(&self) -> ConversationMode {
        ConversationMode::for_transcript(&self.transcript)
    }

    /// True while a submission is running and has not been abandoned.
    pub fn is_busy(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|token| !token.is_cancelled())
    }

    /// Cancel the running submission, if any, and settle its pending sources.
    ///
    /// Meant for callers that dropped a `submit` future and want the
    /// indicators cleared right away rather than on the next submission.
    pub fn interrupt(&mut self) {
        if let Some(token) = &self.in_flight {
            token.cancel();
        }
        self.settle_abandoned();
    }

    pub async fn submit(&mut self, subject: &Company, query: &str) -> Result<SubmitOutcome, ResearchError> {
        let symbol = subject.symbol.trim();
        let query = query.trim();
        if symbol.is_empty() {
            return Err(ResearchError::InvalidInput("no company selected".to_string()));
        }
        if query.is_empty() {
            return Err(ResearchError::InvalidInput("query is empty".to_string()));
        }
        if self.is_busy() {
            return Err(ResearchError::BatchInFlight);
        }
        self.settle_abandoned();

        let mode = self.mode();
        let request = AnalysisRequest::new(symbol, query);
        self.append(ChatMessage::user(query)).await;

        match mode {
            ConversationMode::FanOut => self.run_batch(request).await,
            ConversationMode::FollowUp => self.run_follow_up(request).await,
        }
    }

    /// Clear the transcript, its persisted copy, every indicator and panel.
    pub async fn reset(&mut self) -> Result<(), ResearchError> {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.transcript.clear();
        self.loading = LoadingState::default();
        self.panels = Panels::default();
        self.batch = None;
        self.store.clear().await?;

        info!("Conversation reset");
        self.events.emit(OrchestratorEvent::Reset);
        Ok(())
    }

    async fn run_batch(&mut self, request: AnalysisRequest) -> Result<SubmitOutcome, ResearchError> {
        let batch = BatchId(self.next_batch);
        self.next_batch += 1;

        let token = self.shutdown.child_token();
        // Dropping this future mid-batch cancels the token, which stops every task.
        let _guard = token.clone().drop_guard();
        self.in_flight = Some(token.clone());
        self.batch = Some(batch);
        self.loading = LoadingState::all(SourceState::Pending);
        self.panels = Panels::default();

        info!(
            batch = %batch,
            symbol = %request.symbol,
            backend = self.backend.backend_name(),
            "Starting analysis batch"
        );
        self.events.emit(OrchestratorEvent::BatchStarted {
            batch,
            symbol: request.symbol.clone(),
        });

        let mut tasks = JoinSet::new();
        for source in Source::ALL {
            let backend = Arc::clone(&self.backend);
            let request = request.clone();
            let token = token.clone();
            tasks.spawn(async move {
                let result = tokio::select! {
                    _ = token.cancelled() => Err(ResearchError::Cancelled),
                    result = fetch_source(backend.as_ref(), source, &request) => result,
                };
                (source, result)
            });
        }

        let mut assistant = None;
        loop {
            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                joined = tasks.join_next() => Some(joined),
            };
            let Some(joined) = joined else {
                // Remaining tasks are aborted when `tasks` drops.
                info!(batch = %batch, "Analysis batch abandoned");
                self.settle_abandoned();
                return Ok(SubmitOutcome::Abandoned);
            };

            match joined {
                None => break,
                Some(Ok((_source, Ok(payload)))) => {
                    if let Some(message) = self.apply(batch, payload).await {
                        assistant = Some(message);
                    }
                }
                Some(Ok((source, Err(error)))) => {
                    return Ok(self.fail_batch(batch, Some(source), error, &token));
                }
                Some(Err(join_error)) => {
                    let error = ResearchError::Transport(format!("request task failed: {}", join_error));
                    return Ok(self.fail_batch(batch, None, error, &token));
                }
            }
        }

        self.in_flight = None;
        info!(batch = %batch, "Analysis batch complete");
        self.events.emit(OrchestratorEvent::BatchSettled {
            batch,
            loading: self.loading,
        });

        assistant
            .map(SubmitOutcome::Analyzed)
            .ok_or_else(|| ResearchError::MalformedResponse("batch finished without a prediction".to_string()))
    }

    async fn run_follow_up(&mut self, request: AnalysisRequest) -> Result<SubmitOutcome, ResearchError> {
        let token = self.shutdown.child_token();
        let _guard = token.clone().drop_guard();
        self.in_flight = Some(token.clone());

        info!(symbol = %request.symbol, "Sending follow-up question");
        self.events.emit(OrchestratorEvent::FollowUpStarted {
            symbol: request.symbol.clone(),
        });

        let backend = Arc::clone(&self.backend);
        let reply = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            reply = backend.follow_up(&request) => Some(reply),
        };
        self.in_flight = None;

        match reply {
            None => Ok(SubmitOutcome::Abandoned),
            Some(Ok(text)) => {
                let message = ChatMessage::assistant(text, None);
                self.append(message.clone()).await;
                Ok(SubmitOutcome::FollowedUp(message))
            }
            Some(Err(error)) => {
                warn!(error = %error, "Follow-up request failed");
                self.events.emit(OrchestratorEvent::Notification {
                    message: notification_text(None, &error),
                });
                Ok(SubmitOutcome::Failed { source: None, error })
            }
        }
    }

    /// Record one successful source. Returns the assistant entry when the
    /// source was `result`.
    async fn apply(&mut self, batch: BatchId, payload: SourcePayload) -> Option<ChatMessage> {
        let source = payload.source();
        self.loading.set(source, SourceState::Done);
        debug!(batch = %batch, source = %source, "Source ready");

        let assistant = match &payload {
            SourcePayload::Historical(points) => {
                self.panels.historical = Some(points.clone());
                None
            }
            SourcePayload::News(items) => {
                self.panels.news = Some(items.clone());
                None
            }
            SourcePayload::Social(posts) => {
                self.panels.social = Some(posts.clone());
                None
            }
            SourcePayload::Result(prediction) => {
                self.panels.prediction = Some(prediction.clone());
                Some(ChatMessage::assistant(
                    prediction.analysis.clone(),
                    Some(prediction.payload.clone()),
                ))
            }
        };

        self.events.emit(OrchestratorEvent::SourceReady { batch, payload });
        if let Some(message) = &assistant {
            self.append(message.clone()).await;
        }
        assistant
    }

    fn fail_batch(
        &mut self,
        batch: BatchId,
        source: Option<Source>,
        error: ResearchError,
        token: &CancellationToken,
    ) -> SubmitOutcome {
        token.cancel();
        if let Some(source) = source {
            self.loading.set(source, SourceState::Failed);
        }
        self.loading.settle_pending(SourceState::Cancelled);
        self.in_flight = None;

        warn!(
            batch = %batch,
            source = source.map(|s| s.name()).unwrap_or("task"),
            error = %error,
            "Analysis batch failed"
        );
        self.events.emit(OrchestratorEvent::Notification {
            message: notification_text(source, &error),
        });
        self.events.emit(OrchestratorEvent::BatchSettled {
            batch,
            loading: self.loading,
        });

        SubmitOutcome::Failed { source, error }
    }

    /// Clear leftovers of a submission whose token was cancelled.
    fn settle_abandoned(&mut self) {
        if self.is_busy() {
            return;
        }
        self.in_flight = None;
        if self.loading.any_pending() {
            self.loading.settle_pending(SourceState::Cancelled);
            if let Some(batch) = self.batch {
                self.events.emit(OrchestratorEvent::BatchSettled {
                    batch,
                    loading: self.loading,
                });
            }
        }
    }

    async fn append(&mut self, message: ChatMessage) {
        self.transcript.push(message.clone());
        if let Err(e) = self.store.save(&self.transcript).await {
            warn!(error = %e, "Failed to persist chat transcript");
        }
        self.events.emit(OrchestratorEvent::MessageAppended(message));
    }
}

async fn fetch_source(
    backend: &dyn ResearchBackend,
    source: Source,
    request: &AnalysisRequest,
) -> Result<SourcePayload, ResearchError> {
    match source {
        Source::Historical => backend.historical_prices(request).await.map(SourcePayload::Historical),
        Source::News => backend.news(request).await.map(SourcePayload::News),
        Source::Social => backend.social_posts(request).await.map(SourcePayload::Social),
        Source::Result => backend.prediction(request).await.map(SourcePayload::Result),
    }
}

fn notification_text(source: Option<Source>, error: &ResearchError) -> String {
    if error.requires_login() {
        return "Your session has expired. Please log in again.".to_string();
    }
    match source {
        Some(source) => format!("Failed to load {}: {}", source.title(), error),
        None => format!("Request failed: {}", error),
    }
}
