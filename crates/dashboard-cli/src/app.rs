use anyhow::{anyhow, bail, Context, Result};
use dashboard_store::{DashboardStore, PortfolioItem};
use research_client::{HttpResearchProvider, ResearchClient, TradeAction, TransactionRequest};
use research_core::{Company, ResearchBackend, ResearchError, SessionRecord, TranscriptStore};
use research_orchestrator::{OrchestratorEvent, ResearchOrchestrator, SubmitOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::{Command, Panel, HELP};
use crate::config::DashboardConfig;
use crate::render;

pub enum Flow {
    Continue,
    Quit,
}

/// Everything that exists only while a user is logged in.
struct Connected {
    client: ResearchClient,
    orchestrator: ResearchOrchestrator,
}

pub struct App {
    config: DashboardConfig,
    store: DashboardStore,
    connected: Option<Connected>,
    subject: Option<Company>,
    events: mpsc::UnboundedSender<OrchestratorEvent>,
    shutdown: CancellationToken,
}

impl App {
    pub fn new(
        config: DashboardConfig,
        store: DashboardStore,
        events: mpsc::UnboundedSender<OrchestratorEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            connected: None,
            subject: None,
            events,
            shutdown,
        }
    }

    /// Reconnect with the stored session, if there is one.
    pub async fn resume(&mut self) -> Result<()> {
        match self.store.sessions.require().await {
            Ok(record) => {
                info!(username = %record.username, "Resuming stored session");
                self.connect(record).await?;
                println!("Welcome back. Select a company with `select <symbol>`.");
            }
            Err(ResearchError::NotAuthenticated) => {
                println!("Not logged in. Use `login <username> <token>` to start.");
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to read the stored session")),
        }
        Ok(())
    }

    pub fn prompt(&self) -> String {
        match &self.subject {
            Some(company) => format!("{}> ", company.symbol),
            None => "> ".to_string(),
        }
    }

    pub async fn handle(&mut self, command: Command) -> Result<Flow> {
        if command.needs_session() && self.connected.is_none() {
            println!("Please log in first: login <username> <token>");
            return Ok(Flow::Continue);
        }

        match command {
            Command::Empty => {}
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
            Command::Login {
                username,
                token,
                user_id,
            } => self.login(username, token, user_id).await?,
            Command::Logout => self.logout().await?,
            Command::Whoami => match self.store.sessions.load().await? {
                Some(record) => println!("{} (id {})", record.username, record.user_id),
                None => println!("Not logged in."),
            },
            Command::Companies => {
                let companies = self.client()?.market.companies().await?;
                println!("{}", render::companies(&companies));
            }
            Command::Select(symbol) => {
                let company = self.find_company(&symbol).await?;
                println!("Selected {} ({})", company.name, company.symbol);
                if let Some(description) = &company.description {
                    println!("{}", description);
                }
                self.subject = Some(company);
            }
            Command::Ask(query) => self.ask(&query).await?,
            Command::Status => self.status(),
            Command::Show(panel) => self.show(panel),
            Command::Transcript => match &self.connected {
                Some(connected) => println!("{}", render::transcript(connected.orchestrator.transcript())),
                None => {
                    let stored = self.store.transcript.load().await?;
                    println!("{}", render::transcript(&stored));
                }
            },
            Command::History => {
                let entries = self.store.history.list(self.config.history_limit).await?;
                println!("{}", render::history(&entries));
            }
            Command::Rerun(position) => {
                let entry = self
                    .store
                    .history
                    .nth(position)
                    .await?
                    .ok_or_else(|| anyhow!("No history entry {}", position))?;
                let company = self.find_company(&entry.symbol).await?;
                println!("Re-asking {}: {}", company.symbol, entry.query);
                self.subject = Some(company);
                self.ask(&entry.query).await?;
            }
            Command::New => match &mut self.connected {
                Some(connected) => connected.orchestrator.reset().await?,
                None => {
                    self.store.transcript.clear().await?;
                    println!("Started a new conversation.");
                }
            },
            Command::Price(symbol) => {
                let symbol = self.symbol_or_subject(symbol)?;
                let quote = self.client()?.market.current_price(&symbol).await?;
                println!("{} ${}", quote.ticker, quote.current_price.round_dp(2));
            }
            Command::Overview(symbol) => {
                let symbol = self.symbol_or_subject(symbol)?;
                let overview = self.client()?.market.market_overview(&symbol).await?;
                println!("{}", render::overview(&overview));
            }
            Command::Trade {
                action,
                quantity,
                symbol,
            } => self.trade(action, quantity, symbol).await?,
            Command::Portfolio { refresh } => self.portfolio(refresh).await?,
            Command::Bookmark => self.bookmark().await?,
            Command::Remove(symbol) => {
                if self.store.portfolio.remove(&symbol).await? {
                    println!("Removed {} from the portfolio.", symbol.to_uppercase());
                } else {
                    println!("{} is not in the portfolio.", symbol.to_uppercase());
                }
            }
        }

        Ok(Flow::Continue)
    }

    async fn login(&mut self, username: String, token: String, user_id: Option<String>) -> Result<()> {
        let record = SessionRecord {
            user_id: user_id.unwrap_or_else(|| username.clone()),
            username,
            access_token: token,
        };
        self.store.sessions.save(&record).await?;
        let username = record.username.clone();
        self.connect(record).await?;
        println!("Logged in as {}.", username);
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        if let Some(connected) = self.connected.take() {
            if let Err(e) = connected.client.prediction.logout().await {
                warn!(error = %e, "Logout request failed; clearing the local session anyway");
            }
        }
        self.store.sessions.clear().await?;
        self.subject = None;
        println!("Logged out.");
        Ok(())
    }

    async fn connect(&mut self, record: SessionRecord) -> Result<()> {
        let client = ResearchClient::new(self.config.client.clone(), record).context("Failed to build HTTP client")?;
        let backend: Arc<dyn ResearchBackend> = Arc::new(HttpResearchProvider::new(client.clone()));
        let transcript: Arc<dyn TranscriptStore> = Arc::new(self.store.transcript.clone());

        let orchestrator = match ResearchOrchestrator::restore(backend.clone(), transcript.clone()).await {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                warn!(error = %e, "Stored transcript unreadable; starting a new conversation");
                ResearchOrchestrator::new(backend, transcript)
            }
        };
        let orchestrator = orchestrator
            .with_events(self.events.clone())
            .with_shutdown(self.shutdown.child_token());

        self.connected = Some(Connected { client, orchestrator });
        Ok(())
    }

    fn client(&self) -> Result<&ResearchClient> {
        self.connected
            .as_ref()
            .map(|c| &c.client)
            .ok_or_else(|| anyhow!(ResearchError::NotAuthenticated))
    }

    fn symbol_or_subject(&self, symbol: Option<String>) -> Result<String> {
        match (symbol, &self.subject) {
            (Some(symbol), _) => Ok(symbol),
            (None, Some(company)) => Ok(company.symbol.clone()),
            (None, None) => bail!("Select a company first or pass a symbol"),
        }
    }

    /// Case-insensitive lookup in the company catalog.
    async fn find_company(&self, symbol: &str) -> Result<Company> {
        let companies = self.client()?.market.companies().await?;
        let wanted = symbol.trim();
        companies
            .into_iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| anyhow!("Unknown company '{}'. Use `companies` to list them.", wanted))
    }

    async fn ask(&mut self, query: &str) -> Result<()> {
        let Some(subject) = self.subject.clone() else {
            println!("Select a company first: select <symbol>");
            return Ok(());
        };
        let Some(connected) = self.connected.as_mut() else {
            bail!(ResearchError::NotAuthenticated);
        };

        let outcome = tokio::select! {
            outcome = connected.orchestrator.submit(&subject, query) => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };

        if outcome.as_ref().map_or(true, accepted) {
            if let Err(e) = self.store.history.record(&subject.symbol, query).await {
                warn!(error = %e, "Failed to record query history");
            }
        }

        match outcome {
            None => {
                // The dropped submit future already cancelled its batch.
                connected.orchestrator.interrupt();
                println!("Analysis cancelled.");
            }
            Some(Ok(SubmitOutcome::Abandoned)) => println!("Analysis cancelled."),
            Some(Ok(outcome)) => tracing::debug!(?outcome, "Submission finished"),
            Some(Err(e @ (ResearchError::InvalidInput(_) | ResearchError::BatchInFlight))) => println!("{}", e),
            Some(Err(e)) => return Err(e.into()),
        }
        Ok(())
    }

    fn status(&self) {
        match &self.subject {
            Some(company) => println!("Subject: {} ({})", company.name, company.symbol),
            None => println!("Subject: none"),
        }
        match &self.connected {
            Some(connected) => {
                let orchestrator = &connected.orchestrator;
                match orchestrator.current_batch() {
                    Some(batch) => println!("Batch {}: {}", batch, render::loading_line(&orchestrator.loading())),
                    None => println!("No analysis yet."),
                }
                println!(
                    "Messages: {}  next question: {:?}",
                    orchestrator.transcript().len(),
                    orchestrator.mode()
                );
            }
            None => println!("Not logged in."),
        }
    }

    fn show(&self, panel: Panel) {
        let Some(connected) = &self.connected else {
            println!("Nothing to show yet.");
            return;
        };
        let panels = connected.orchestrator.panels();
        let text = match panel {
            Panel::Historical => panels.historical.as_deref().map(render::historical),
            Panel::News => panels.news.as_deref().map(render::news),
            Panel::Social => panels.social.as_deref().map(render::social),
        };
        println!("{}", text.unwrap_or_else(|| "Nothing to show yet.".to_string()));
    }

    async fn trade(&self, action: TradeAction, quantity: u32, symbol: Option<String>) -> Result<()> {
        let symbol = self.symbol_or_subject(symbol)?;
        let market = &self.client()?.market;
        let quote = market.current_price(&symbol).await?;
        let request = TransactionRequest::new(&quote.ticker, quantity, action, quote.current_price, chrono::Utc::now());
        let outcome = market.execute_transaction(&request).await?;
        println!("{}", render::transaction(&outcome));
        Ok(())
    }

    async fn portfolio(&self, refresh: bool) -> Result<()> {
        if refresh {
            let market = &self.client()?.market;
            for item in self.store.portfolio.list().await? {
                match market.current_price(&item.symbol).await {
                    Ok(quote) => {
                        self.store.portfolio.update_price(&item.symbol, quote.current_price).await?;
                    }
                    Err(e) => warn!(symbol = %item.symbol, error = %e, "Price refresh failed"),
                }
            }
        }

        let items = self.store.portfolio.list().await?;
        if items.is_empty() {
            println!("The portfolio is empty. Use `bookmark` after an analysis.");
            return Ok(());
        }
        let summary = self.store.portfolio.summary().await?;
        println!("{}", render::portfolio(&items, &summary));
        Ok(())
    }

    async fn bookmark(&self) -> Result<()> {
        let Some(subject) = &self.subject else {
            bail!("Select a company first: select <symbol>");
        };
        let Some(connected) = &self.connected else {
            bail!(ResearchError::NotAuthenticated);
        };

        let quote = connected.client.market.current_price(&subject.symbol).await?;
        let analysis = connected
            .orchestrator
            .transcript()
            .iter()
            .rev()
            .find_map(|m| m.data.as_ref());

        let item = PortfolioItem::from_analysis(subject, quote.current_price, analysis);
        self.store.portfolio.add(&item).await?;
        println!(
            "Bookmarked {} at ${} ({}).",
            item.symbol,
            item.price.round_dp(2),
            item.recommendation
        );
        Ok(())
    }
}

/// Whether the orchestrator took the submission, as opposed to rejecting it
/// before any request went out.
fn accepted(result: &Result<SubmitOutcome, ResearchError>) -> bool {
    !matches!(result, Err(ResearchError::InvalidInput(_) | ResearchError::BatchInFlight))
}
