//! Plain-text rendering of orchestrator state for the terminal.

use dashboard_store::{PortfolioItem, PortfolioSummary};
use research_client::{MarketOverview, TransactionOutcome};
use research_core::{
    ChatMessage, ChatRole, Company, NewsItem, PricePoint, QueryRecord, SentimentLabel, SocialPost, Source,
    SourcePayload, SourceState,
};
use research_orchestrator::{LoadingState, OrchestratorEvent};
use rust_decimal::Decimal;
use std::fmt::Write;

/// Text for one orchestrator event, or `None` for events with nothing to show.
pub fn event(event: &OrchestratorEvent) -> Option<String> {
    match event {
        OrchestratorEvent::BatchStarted { symbol, .. } => Some(format!(
            "Analyzing {}: {}",
            symbol,
            Source::ALL
                .iter()
                .map(|s| format!("{} ...", s.title()))
                .collect::<Vec<_>>()
                .join(" | ")
        )),
        OrchestratorEvent::SourceReady { payload, .. } => Some(source_ready(payload)),
        OrchestratorEvent::BatchSettled { loading, .. } => Some(loading_line(loading)),
        OrchestratorEvent::FollowUpStarted { symbol } => Some(format!("Asking a follow-up about {} ...", symbol)),
        OrchestratorEvent::MessageAppended(message) if message.is_assistant() => Some(message_block(message)),
        OrchestratorEvent::MessageAppended(_) => None,
        OrchestratorEvent::Notification { message } => Some(format!("! {}", message)),
        OrchestratorEvent::Reset => Some("Started a new conversation.".to_string()),
    }
}

fn source_ready(payload: &SourcePayload) -> String {
    let summary = match payload {
        SourcePayload::Historical(points) => match (points.first(), points.last()) {
            (Some(first), Some(last)) => format!(
                "{} points, {} {:.2} -> {} {:.2}",
                points.len(),
                first.date,
                first.price,
                last.date,
                last.price
            ),
            _ => "no prices".to_string(),
        },
        SourcePayload::News(items) => format!("{} articles", items.len()),
        SourcePayload::Social(posts) => {
            let count = |label: SentimentLabel| posts.iter().filter(|p| p.sentiment_label() == label).count();
            let positive = count(SentimentLabel::Positive);
            let negative = count(SentimentLabel::Negative);
            format!("{} posts ({} positive, {} negative)", posts.len(), positive, negative)
        }
        SourcePayload::Result(prediction) => match prediction.payload.recommendation {
            Some(recommendation) => format!("recommendation {}", recommendation),
            None => "ready".to_string(),
        },
    };
    format!("[done] {}: {}", payload.source().title(), summary)
}

fn state_label(state: SourceState) -> &'static str {
    match state {
        SourceState::Idle => "idle",
        SourceState::Pending => "loading",
        SourceState::Done => "done",
        SourceState::Failed => "failed",
        SourceState::Cancelled => "cancelled",
    }
}

pub fn loading_line(loading: &LoadingState) -> String {
    loading
        .iter()
        .map(|(source, state)| format!("{}: {}", source.title(), state_label(state)))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn message_block(message: &ChatMessage) -> String {
    let who = match message.role {
        ChatRole::User => "You",
        ChatRole::Assistant => "Analyst",
    };
    let mut out = format!("[{}] {}: {}", message.timestamp.format("%H:%M:%S"), who, message.content);

    if let Some(data) = &message.data {
        if let Some(sentiment) = data.sentiment {
            let _ = write!(out, "\n  Sentiment: {:+.2}%", sentiment);
        }
        if let Some(recommendation) = data.recommendation {
            let _ = write!(out, "\n  Recommendation: {}", recommendation);
        }
        if let Some(target) = data.target_price {
            let _ = write!(out, "\n  Target price: ${:.2}", target);
        }
        for pro in &data.pros {
            let _ = write!(out, "\n  + {}", pro);
        }
        for con in &data.cons {
            let _ = write!(out, "\n  - {}", con);
        }
    }
    out
}

pub fn transcript(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "No messages yet.".to_string();
    }
    messages.iter().map(message_block).collect::<Vec<_>>().join("\n")
}

pub fn historical(points: &[PricePoint]) -> String {
    if points.is_empty() {
        return "No price history.".to_string();
    }
    points
        .iter()
        .map(|p| format!("{:>8}  {:>10.2}", p.date, p.price))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn news(items: &[NewsItem]) -> String {
    if items.is_empty() {
        return "No news.".to_string();
    }
    items
        .iter()
        .map(|n| format!("{} ({}, {})\n  {}", n.title, n.source, n.date, n.link))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn social(posts: &[SocialPost]) -> String {
    if posts.is_empty() {
        return "No posts.".to_string();
    }
    posts
        .iter()
        .map(|p| {
            format!(
                "[{}] {} on {} ({}): {}",
                p.sentiment_label().as_str(),
                p.author,
                p.platform,
                p.date,
                p.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn companies(companies: &[Company]) -> String {
    companies
        .iter()
        .map(|c| format!("{:<6} {}", c.symbol, c.name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn history(entries: &[QueryRecord]) -> String {
    if entries.is_empty() {
        return "No past questions.".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "{:>3}. {} {:<6} {}",
                i + 1,
                e.timestamp.format("%Y-%m-%d %H:%M"),
                e.symbol,
                e.query
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn overview(overview: &MarketOverview) -> String {
    let field = |label: &str, value: &Option<research_client::Figure>| {
        format!(
            "  {:<15} {}",
            label,
            value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
        )
    };
    [
        format!("{} market overview", overview.ticker),
        field("Market cap", &overview.market_cap),
        field("Volume", &overview.volume),
        field("Avg volume", &overview.avg_volume),
        field("Beta", &overview.beta),
        field("Dividend yield", &overview.dividend_yield),
        field("P/E ratio", &overview.pe_ratio),
        field("52w high", &overview.high_52w),
        field("52w low", &overview.low_52w),
    ]
    .join("\n")
}

pub fn transaction(outcome: &TransactionOutcome) -> String {
    match outcome {
        TransactionOutcome::Recorded => "Transaction recorded.".to_string(),
        TransactionOutcome::InsufficientShares => "Not enough shares to sell.".to_string(),
        TransactionOutcome::Rejected(message) => format!("Transaction rejected: {}", message),
    }
}

fn signed(value: Decimal) -> String {
    let value = value.round_dp(2);
    if value.is_sign_negative() {
        format!("-${}", value.abs())
    } else {
        format!("+${}", value)
    }
}

pub fn portfolio(items: &[PortfolioItem], summary: &PortfolioSummary) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(
            out,
            "{:<6} {:<24} ${:>10} {} ({:+.2}%)  {}",
            item.symbol,
            item.name,
            item.price.round_dp(2),
            signed(item.gain()),
            item.change_percent().round_dp(2),
            item.recommendation
        );
    }
    let _ = write!(
        out,
        "Total value ${}  gain {} ({:+.2}%)  across {} items",
        summary.total_value.round_dp(2),
        signed(summary.total_gain),
        summary.gain_percent.round_dp(2),
        summary.total_items
    );
    out
}
