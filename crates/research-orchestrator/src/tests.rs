#[cfg(test)]
mod orchestrator_tests {
    use crate::{ConversationMode, OrchestratorEvent, ResearchOrchestrator, SubmitOutcome};
    use async_trait::async_trait;
    use research_core::{
        AnalysisPayload, AnalysisRequest, ChatMessage, ChatRole, Company, NewsItem, Prediction, PricePoint,
        Recommendation, ResearchBackend, ResearchError, SocialPost, Source, SourcePayload, SourceState,
        TranscriptStore,
    };
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};
    use tokio_util::sync::CancellationToken;

    type Reply = Result<SourcePayload, ResearchError>;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    /// Backend whose four sources only complete when the test releases them.
    #[derive(Default)]
    struct GatedBackend {
        gates: Mutex<HashMap<Source, oneshot::Receiver<Reply>>>,
        fetches: AtomicUsize,
        follow_ups: Mutex<VecDeque<Result<String, ResearchError>>>,
        follow_up_calls: AtomicUsize,
    }

    struct Gates {
        senders: HashMap<Source, oneshot::Sender<Reply>>,
    }

    impl Gates {
        fn release(&mut self, source: Source, reply: Reply) {
            if let Some(sender) = self.senders.remove(&source) {
                let _ = sender.send(reply);
            }
        }
    }

    impl GatedBackend {
        /// Install a fresh gate per source for the next batch.
        fn arm(&self) -> Gates {
            let mut senders = HashMap::new();
            let mut gates = self.gates.lock().unwrap();
            for source in Source::ALL {
                let (tx, rx) = oneshot::channel();
                senders.insert(source, tx);
                gates.insert(source, rx);
            }
            Gates { senders }
        }

        fn queue_follow_up(&self, reply: Result<String, ResearchError>) {
            self.follow_ups.lock().unwrap().push_back(reply);
        }

        async fn wait(&self, source: Source) -> Reply {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let receiver = self.gates.lock().unwrap().remove(&source);
            match receiver {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(ResearchError::Transport("gate dropped".to_string()))),
                None => Err(ResearchError::Transport(format!("no gate armed for {}", source))),
            }
        }
    }

    fn wrong_payload(source: Source) -> ResearchError {
        ResearchError::MalformedResponse(format!("unexpected payload for {}", source))
    }

    #[async_trait]
    impl ResearchBackend for GatedBackend {
        async fn historical_prices(&self, _request: &AnalysisRequest) -> Result<Vec<PricePoint>, ResearchError> {
            match self.wait(Source::Historical).await? {
                SourcePayload::Historical(points) => Ok(points),
                _ => Err(wrong_payload(Source::Historical)),
            }
        }

        async fn news(&self, _request: &AnalysisRequest) -> Result<Vec<NewsItem>, ResearchError> {
            match self.wait(Source::News).await? {
                SourcePayload::News(items) => Ok(items),
                _ => Err(wrong_payload(Source::News)),
            }
        }

        async fn social_posts(&self, _request: &AnalysisRequest) -> Result<Vec<SocialPost>, ResearchError> {
            match self.wait(Source::Social).await? {
                SourcePayload::Social(posts) => Ok(posts),
                _ => Err(wrong_payload(Source::Social)),
            }
        }

        async fn prediction(&self, _request: &AnalysisRequest) -> Result<Prediction, ResearchError> {
            match self.wait(Source::Result).await? {
                SourcePayload::Result(prediction) => Ok(prediction),
                _ => Err(wrong_payload(Source::Result)),
            }
        }

        async fn follow_up(&self, _request: &AnalysisRequest) -> Result<String, ResearchError> {
            self.follow_up_calls.fetch_add(1, Ordering::SeqCst);
            self.follow_ups
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ResearchError::Transport("no follow-up queued".to_string())))
        }

        fn backend_name(&self) -> &'static str {
            "gated"
        }
    }

    /// Keeps the serialized transcript, like the real key/value store.
    #[derive(Default)]
    struct MemoryStore {
        value: Mutex<Option<String>>,
    }

    #[async_trait]
    impl TranscriptStore for MemoryStore {
        async fn load(&self) -> Result<Vec<ChatMessage>, ResearchError> {
            let value = self.value.lock().unwrap().clone();
            match value {
                Some(json) => serde_json::from_str(&json).map_err(|e| ResearchError::Storage(e.to_string())),
                None => Ok(Vec::new()),
            }
        }

        async fn save(&self, messages: &[ChatMessage]) -> Result<(), ResearchError> {
            let json = serde_json::to_string(messages).map_err(|e| ResearchError::Storage(e.to_string()))?;
            *self.value.lock().unwrap() = Some(json);
            Ok(())
        }

        async fn clear(&self) -> Result<(), ResearchError> {
            *self.value.lock().unwrap() = None;
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    struct Harness {
        backend: Arc<GatedBackend>,
        store: Arc<MemoryStore>,
        orchestrator: ResearchOrchestrator,
        events: mpsc::UnboundedReceiver<OrchestratorEvent>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(GatedBackend::default());
        let store = Arc::new(MemoryStore::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = ResearchOrchestrator::new(backend.clone(), store.clone()).with_events(tx);
        Harness {
            backend,
            store,
            orchestrator,
            events: rx,
        }
    }

    fn apple() -> Company {
        Company {
            symbol: "AAPL".to_string(),
            name: "Apple Inc.".to_string(),
            description: None,
        }
    }

    fn payload(source: Source) -> SourcePayload {
        match source {
            Source::Historical => SourcePayload::Historical(vec![PricePoint {
                date: "Mar 1".to_string(),
                price: 100.0,
            }]),
            Source::News => SourcePayload::News(vec![NewsItem {
                title: "Apple beats estimates".to_string(),
                source: "Reuters".to_string(),
                date: "14 May 2024 20:10:12".to_string(),
                link: "https://example.com/a".to_string(),
            }]),
            Source::Social => SourcePayload::Social(vec![SocialPost {
                platform: "Reddit".to_string(),
                author: "bull".to_string(),
                content: "To the moon".to_string(),
                sentiment: 0.8,
                date: "14 May 2024 08:00:00".to_string(),
            }]),
            Source::Result => SourcePayload::Result(Prediction {
                analysis: "Upside looks likely.".to_string(),
                payload: AnalysisPayload {
                    sentiment: Some(4.2),
                    recommendation: Some(Recommendation::Buy),
                    pros: vec!["Margins".to_string()],
                    cons: vec![],
                    target_price: Some(190.0),
                },
            }),
        }
    }

    fn is_ready(event: &OrchestratorEvent, source: Source) -> bool {
        matches!(event, OrchestratorEvent::SourceReady { payload, .. } if payload.source() == source)
    }

    /// Release sources successfully in `order`, waiting for each to be applied.
    async fn release_in_order(
        gates: &mut Gates,
        order: &[Source],
        events: &mut mpsc::UnboundedReceiver<OrchestratorEvent>,
        log: &mut Vec<OrchestratorEvent>,
    ) {
        for source in order {
            gates.release(*source, Ok(payload(*source)));
            while let Some(event) = events.recv().await {
                let done = is_ready(&event, *source);
                log.push(event);
                if done {
                    break;
                }
            }
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<OrchestratorEvent>, log: &mut Vec<OrchestratorEvent>) {
        while let Ok(event) = events.try_recv() {
            log.push(event);
        }
    }

    fn notifications(log: &[OrchestratorEvent]) -> Vec<String> {
        log.iter()
            .filter_map(|event| match event {
                OrchestratorEvent::Notification { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn permutations(items: &[Source]) -> Vec<Vec<Source>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for (i, first) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, *first);
                out.push(tail);
            }
        }
        out
    }

    /// Run one complete fan-out batch.
    async fn complete_batch(h: &mut Harness, query: &str) -> SubmitOutcome {
        let mut gates = h.backend.arm();
        let mut log = Vec::new();
        let subject = apple();
        let (outcome, _) = tokio::join!(
            h.orchestrator.submit(&subject, query),
            release_in_order(&mut gates, &Source::ALL, &mut h.events, &mut log),
        );
        drain(&mut h.events, &mut log);
        outcome.unwrap()
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_assistant_entry_follows_result_for_every_arrival_order() {
        let orders = permutations(&Source::ALL);
        assert_eq!(orders.len(), 24);

        for order in orders {
            let mut h = harness();
            let mut gates = h.backend.arm();
            let mut log = Vec::new();
            let subject = apple();

            let (outcome, _) = tokio::join!(
                h.orchestrator.submit(&subject, "Should I buy?"),
                release_in_order(&mut gates, &order, &mut h.events, &mut log),
            );
            drain(&mut h.events, &mut log);

            let outcome = outcome.unwrap();
            assert!(matches!(outcome, SubmitOutcome::Analyzed(_)), "order {:?}: {:?}", order, outcome);

            let assistant_positions: Vec<usize> = log
                .iter()
                .enumerate()
                .filter(|(_, e)| matches!(e, OrchestratorEvent::MessageAppended(m) if m.is_assistant()))
                .map(|(i, _)| i)
                .collect();
            let result_position = log.iter().position(|e| is_ready(e, Source::Result)).unwrap();

            assert_eq!(assistant_positions, vec![result_position + 1], "order {:?}", order);

            let transcript = h.orchestrator.transcript();
            assert_eq!(transcript.len(), 2);
            assert_eq!(transcript[0].role, ChatRole::User);
            assert_eq!(transcript[1].content, "Upside looks likely.");
            assert_eq!(
                transcript[1].data.as_ref().and_then(|d| d.recommendation),
                Some(Recommendation::Buy)
            );
            assert!(!h.orchestrator.loading().any_pending());
            assert!(!h.orchestrator.is_busy());
        }
    }

    #[tokio::test]
    async fn test_completed_batch_fills_panels_and_persists() {
        let mut h = harness();
        complete_batch(&mut h, "How is Apple doing?").await;

        let panels = h.orchestrator.panels();
        assert!(panels.historical.is_some());
        assert!(panels.news.is_some());
        assert_eq!(panels.social.as_ref().map(|p| p.len()), Some(1));
        assert!(panels.prediction.is_some());

        for (_, state) in h.orchestrator.loading().iter() {
            assert_eq!(state, SourceState::Done);
        }

        let persisted = h.store.load().await.unwrap();
        assert_eq!(persisted, h.orchestrator.transcript());
        assert_eq!(h.backend.fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_one_failure_yields_single_notification_and_no_pending() {
        let Harness {
            backend,
            mut orchestrator,
            mut events,
            ..
        } = harness();
        let mut gates = backend.arm();
        let mut log = Vec::new();
        let subject = apple();

        let driver = async {
            release_in_order(&mut gates, &[Source::Historical], &mut events, &mut log).await;
            gates.release(
                Source::News,
                Err(ResearchError::Status {
                    status: 502,
                    message: "bad gateway".to_string(),
                }),
            );
        };
        let (outcome, _) = tokio::join!(orchestrator.submit(&subject, "Should I buy?"), driver);
        drain(&mut events, &mut log);

        assert_eq!(
            outcome.unwrap(),
            SubmitOutcome::Failed {
                source: Some(Source::News),
                error: ResearchError::Status {
                    status: 502,
                    message: "bad gateway".to_string()
                },
            }
        );
        assert_eq!(notifications(&log).len(), 1);

        let loading = orchestrator.loading();
        assert!(!loading.any_pending());
        assert_eq!(loading.historical, SourceState::Done);
        assert_eq!(loading.news, SourceState::Failed);
        assert_eq!(loading.social, SourceState::Cancelled);
        assert_eq!(loading.result, SourceState::Cancelled);

        // Only the user entry survives, so the next submission fans out again.
        assert_eq!(orchestrator.transcript().len(), 1);
        assert_eq!(orchestrator.mode(), ConversationMode::FanOut);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried_as_fan_out() {
        let mut h = harness();
        let mut gates = h.backend.arm();
        let subject = apple();

        gates.release(Source::Social, Err(ResearchError::Transport("connection reset".to_string())));
        let outcome = h.orchestrator.submit(&subject, "Should I buy?").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Failed { source: Some(Source::Social), .. }));
        drop(gates);

        let outcome = complete_batch(&mut h, "Should I buy?").await;
        assert!(matches!(outcome, SubmitOutcome::Analyzed(_)));
        assert_eq!(h.backend.follow_up_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.transcript().len(), 3);
    }

    #[tokio::test]
    async fn test_repeated_failures_never_switch_to_follow_up() {
        let mut h = harness();
        let subject = apple();

        for _ in 0..2 {
            let mut gates = h.backend.arm();
            gates.release(Source::News, Err(ResearchError::Transport("connection reset".to_string())));
            let outcome = h.orchestrator.submit(&subject, "Should I buy?").await.unwrap();
            assert!(matches!(outcome, SubmitOutcome::Failed { source: Some(Source::News), .. }));
        }

        assert_eq!(h.orchestrator.transcript().len(), 2);
        assert!(!h.orchestrator.transcript().iter().any(ChatMessage::is_assistant));
        assert_eq!(h.orchestrator.mode(), ConversationMode::FanOut);

        let outcome = complete_batch(&mut h, "Should I buy?").await;
        assert!(matches!(outcome, SubmitOutcome::Analyzed(_)));
        assert_eq!(h.backend.follow_up_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.transcript().len(), 4);
        assert_eq!(h.orchestrator.mode(), ConversationMode::FollowUp);
    }

    #[tokio::test]
    async fn test_result_before_sibling_failure_keeps_assistant_entry() {
        let Harness {
            backend,
            mut orchestrator,
            mut events,
            ..
        } = harness();
        let mut gates = backend.arm();
        let mut log = Vec::new();
        let subject = apple();

        let driver = async {
            release_in_order(&mut gates, &[Source::Result], &mut events, &mut log).await;
            gates.release(Source::Social, Err(ResearchError::MalformedResponse("missing posts".to_string())));
        };
        let (outcome, _) = tokio::join!(orchestrator.submit(&subject, "Should I buy?"), driver);
        drain(&mut events, &mut log);

        assert!(matches!(
            outcome.unwrap(),
            SubmitOutcome::Failed { source: Some(Source::Social), .. }
        ));
        assert_eq!(notifications(&log).len(), 1);
        assert_eq!(orchestrator.transcript().len(), 2);
        assert_eq!(orchestrator.loading().result, SourceState::Done);
        assert!(!orchestrator.loading().any_pending());
    }

    #[tokio::test]
    async fn test_unauthorized_failure_asks_for_login() {
        let mut h = harness();
        let mut gates = h.backend.arm();
        let mut log = Vec::new();

        gates.release(Source::Historical, Err(ResearchError::Unauthorized(401)));
        h.orchestrator.submit(&apple(), "Should I buy?").await.unwrap();
        drain(&mut h.events, &mut log);

        let messages = notifications(&log);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("log in"));
    }

    // -----------------------------------------------------------------------
    // Follow-up mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_follow_up_after_full_exchange() {
        let mut h = harness();
        assert_eq!(h.orchestrator.mode(), ConversationMode::FanOut);
        complete_batch(&mut h, "Should I buy?").await;
        assert_eq!(h.orchestrator.mode(), ConversationMode::FollowUp);

        h.backend.queue_follow_up(Ok("Dividends are stable.".to_string()));
        let outcome = h.orchestrator.submit(&apple(), "What about dividends?").await.unwrap();

        let SubmitOutcome::FollowedUp(message) = outcome else {
            panic!("expected a follow-up reply, got {:?}", outcome);
        };
        assert_eq!(message.content, "Dividends are stable.");
        assert!(message.data.is_none());

        assert_eq!(h.backend.follow_up_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.backend.fetches.load(Ordering::SeqCst), 4);
        assert_eq!(h.orchestrator.transcript().len(), 4);
        assert_eq!(h.store.load().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_follow_up_failure_notifies_once() {
        let mut h = harness();
        complete_batch(&mut h, "Should I buy?").await;

        h.backend.queue_follow_up(Err(ResearchError::Transport("timed out".to_string())));
        let outcome = h.orchestrator.submit(&apple(), "And now?").await.unwrap();
        let mut log = Vec::new();
        drain(&mut h.events, &mut log);

        assert!(matches!(outcome, SubmitOutcome::Failed { source: None, .. }));
        assert_eq!(notifications(&log).len(), 1);
        assert_eq!(h.orchestrator.transcript().len(), 3);
        assert!(!h.orchestrator.is_busy());
    }

    // -----------------------------------------------------------------------
    // Single flight and cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_second_submit_rejected_while_batch_pending() {
        let mut h = harness();
        let _gates = h.backend.arm();
        let subject = apple();

        let mut first = tokio_test::task::spawn(h.orchestrator.submit(&subject, "first"));
        assert!(first.poll().is_pending());
        // Leak the pending future so its batch stays in flight.
        std::mem::forget(first);

        assert!(h.orchestrator.is_busy());
        let err = h.orchestrator.submit(&subject, "second").await.unwrap_err();
        assert_eq!(err, ResearchError::BatchInFlight);
        assert_eq!(h.orchestrator.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_submit_is_abandoned_and_allows_new_batch() {
        let mut h = harness();
        let _stale = h.backend.arm();
        let subject = apple();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            h.orchestrator.submit(&subject, "first"),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!h.orchestrator.is_busy());
        assert!(h.orchestrator.loading().any_pending());

        h.orchestrator.interrupt();
        assert!(!h.orchestrator.loading().any_pending());
        assert_eq!(h.orchestrator.loading().news, SourceState::Cancelled);

        let outcome = complete_batch(&mut h, "second").await;
        assert!(matches!(outcome, SubmitOutcome::Analyzed(_)));
    }

    #[tokio::test]
    async fn test_shutdown_abandons_batch_without_notification() {
        let backend = Arc::new(GatedBackend::default());
        let store = Arc::new(MemoryStore::default());
        let (tx, mut events) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let mut orchestrator = ResearchOrchestrator::new(backend.clone(), store)
            .with_events(tx)
            .with_shutdown(shutdown.clone());

        let mut gates = backend.arm();
        let mut log = Vec::new();
        let subject = apple();

        let driver = async {
            release_in_order(&mut gates, &[Source::Historical], &mut events, &mut log).await;
            shutdown.cancel();
        };
        let (outcome, _) = tokio::join!(orchestrator.submit(&subject, "Should I buy?"), driver);
        drain(&mut events, &mut log);

        assert_eq!(outcome.unwrap(), SubmitOutcome::Abandoned);
        assert!(notifications(&log).is_empty());
        assert!(log.iter().any(|e| matches!(e, OrchestratorEvent::BatchSettled { .. })));

        let loading = orchestrator.loading();
        assert_eq!(loading.historical, SourceState::Done);
        assert_eq!(loading.news, SourceState::Cancelled);
        assert_eq!(loading.result, SourceState::Cancelled);
        assert_eq!(orchestrator.transcript().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Input, reset and restore
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_blank_inputs_are_rejected_before_any_request() {
        let mut h = harness();

        let err = h.orchestrator.submit(&apple(), "   ").await.unwrap_err();
        assert!(matches!(err, ResearchError::InvalidInput(_)));

        let mut nobody = apple();
        nobody.symbol = " ".to_string();
        let err = h.orchestrator.submit(&nobody, "Should I buy?").await.unwrap_err();
        assert!(matches!(err, ResearchError::InvalidInput(_)));

        assert!(h.orchestrator.transcript().is_empty());
        assert_eq!(h.backend.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restore_then_reset_clears_everything() {
        let mut h = harness();
        complete_batch(&mut h, "Should I buy?").await;

        let restored = ResearchOrchestrator::restore(h.backend.clone(), h.store.clone())
            .await
            .unwrap();
        assert_eq!(restored.transcript(), h.orchestrator.transcript());
        assert_eq!(restored.mode(), ConversationMode::FollowUp);

        h.orchestrator.reset().await.unwrap();
        let mut log = Vec::new();
        drain(&mut h.events, &mut log);

        assert!(h.orchestrator.transcript().is_empty());
        assert_eq!(h.orchestrator.panels(), &crate::Panels::default());
        assert_eq!(h.orchestrator.current_batch(), None);
        for (_, state) in h.orchestrator.loading().iter() {
            assert_eq!(state, SourceState::Idle);
        }
        assert!(matches!(log.last(), Some(OrchestratorEvent::Reset)));

        let reloaded = ResearchOrchestrator::restore(h.backend.clone(), h.store.clone())
            .await
            .unwrap();
        assert!(reloaded.transcript().is_empty());
        assert_eq!(reloaded.mode(), ConversationMode::FanOut);
    }
}
