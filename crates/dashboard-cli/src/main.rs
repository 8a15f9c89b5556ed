mod app;
mod commands;
mod config;
mod render;

use anyhow::Result;
use app::{App, Flow};
use commands::Command;
use config::DashboardConfig;
use dashboard_store::DashboardStore;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dashboard_cli=info,research_orchestrator=info".into());

    // stderr keeps log lines out of the dashboard output
    if json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_prompt(prompt: &str) {
    print!("{}", prompt);
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DashboardConfig::from_env()?;
    tracing::info!(
        api = %config.client.api_base_url,
        market = %config.client.market_base_url,
        database = %config.database_url,
        "Starting research dashboard"
    );

    let store = DashboardStore::open(&config.database_url).await?;
    let shutdown = CancellationToken::new();

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Some(text) = render::event(&event) {
                println!("{}", text);
            }
        }
    });

    let mut app = App::new(config, store, events_tx, shutdown.clone());
    app.resume().await?;
    println!("Type `help` for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt(&app.prompt());

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match app.handle(command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                tracing::debug!(error = ?e, "Command failed");
                println!("Error: {:#}", e);
            }
        }
    }

    shutdown.cancel();
    // Dropping the app closes the event channel so the printer drains and exits.
    drop(app);
    let _ = printer.await;

    Ok(())
}
