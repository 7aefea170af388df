//! dashboard-sync CLI
//!
//! `watch` polls the backend and redraws the dashboard until Ctrl+C.
//! The other commands perform one action and print the resulting view.

use std::io::{self, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dashboard_sync::dashboard::render;
use dashboard_sync::settings::{self, SimulatedProgress};
use dashboard_sync::{BotSettings, Config, DashboardSync, ManualTrade, Poller, Result, TradeSide};

#[derive(Parser)]
#[command(name = "dashboard-sync", about = "Keep a trading bot dashboard in sync with its backend")]
struct Cli {
    /// Backend base URL (overrides DASHBOARD_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll every category and redraw until Ctrl+C
    Watch,
    /// Refresh once and print the dashboard
    Snapshot,
    /// Start trading
    Start,
    /// Stop trading
    Stop,
    /// Execute a manual trade
    Trade {
        #[arg(long)]
        side: TradeSide,
        #[arg(long)]
        quantity: f64,
        /// Defaults to the configured trading pair
        #[arg(long)]
        pair: Option<String>,
    },
    /// Save bot settings; the backend starts the bot with them
    Configure {
        #[arg(long)]
        pair: Option<String>,
        /// Risk per trade, in percent
        #[arg(long, default_value_t = 2.0)]
        risk: f64,
        #[arg(long)]
        model: Option<String>,
        /// Minutes between trading decisions
        #[arg(long)]
        frequency: Option<u32>,
        /// Stop loss, in percent
        #[arg(long)]
        stop_loss: Option<f64>,
        #[arg(long)]
        reinvest: Option<bool>,
    },
    /// Stop the bot started by `configure`
    StopBot,
    /// Show simulated model training progress
    Train {
        /// Step slider position, 1 to 5
        #[arg(long, default_value_t = 3)]
        steps: u8,
        /// Progress tick in milliseconds
        #[arg(long, default_value_t = 500)]
        tick_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(api_base) = cli.api_base {
        config.set_api_base(&api_base)?;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!(environment = %config.environment, api_base = %config.api_base, "starting");

    match cli.command {
        Command::Train { steps, tick_ms } => {
            train(&config.trading_pair, steps, Duration::from_millis(tick_ms)).await
        }
        Command::Watch => watch(DashboardSync::new(config)?).await,
        command => run_action(DashboardSync::new(config)?, command).await,
    }
}

/// One-shot commands: perform the action, then print the view
async fn run_action(sync: DashboardSync, command: Command) -> Result<()> {
    match command {
        Command::Snapshot => log_failures(&sync).await,
        Command::Start => {
            sync.refresh_status().await?;
            report(sync.start_trading().await);
        }
        Command::Stop => {
            sync.refresh_status().await?;
            report(sync.stop_trading().await);
        }
        Command::Trade { side, quantity, pair } => {
            let pair = pair.unwrap_or_else(|| sync.config().trading_pair.clone());
            report(sync.execute_trade(ManualTrade { pair, side, quantity }).await);
        }
        Command::Configure {
            pair,
            risk,
            model,
            frequency,
            stop_loss,
            reinvest,
        } => {
            if let Some(minutes) = frequency {
                tracing::info!(frequency = %settings::format_frequency(minutes), "trading frequency");
            }
            let bot_settings = BotSettings {
                trading_pair: pair.unwrap_or_else(|| sync.config().trading_pair.clone()),
                risk_level: settings::percent_to_fraction(risk),
                model_selection: model,
                trading_frequency: frequency,
                stop_loss: stop_loss.map(settings::percent_to_fraction),
                reinvest_profits: reinvest,
            };
            report(sync.save_settings(bot_settings).await);
        }
        Command::StopBot => report(sync.stop_bot().await),
        // dispatched in main
        Command::Watch | Command::Train { .. } => {}
    }

    render(&sync.view(), &mut io::stdout().lock())
}

/// Failures are already in the notices; keep the exit status clean
fn report<T>(result: Result<T>) {
    if let Err(e) = result {
        tracing::debug!(kind = e.kind(), error = %e, "action failed");
    }
}

async fn log_failures(sync: &DashboardSync) {
    for (category, e) in sync.refresh_all().await {
        tracing::warn!(%category, error = %e, "initial refresh failed");
    }
}

async fn watch(sync: DashboardSync) -> Result<()> {
    log_failures(&sync).await;

    let mut poller = Poller::new();
    sync.spawn_polling(&mut poller);
    tracing::info!(schedules = poller.len(), "polling started");

    let mut ticker = tokio::time::interval(sync.config().render_interval());
    let mut last_revision = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                let view = sync.view();
                let revision = sync.with_state(|s| s.revision());
                if last_revision == Some(revision) {
                    continue;
                }
                last_revision = Some(revision);

                let mut out = io::stdout().lock();
                write!(out, "\x1b[2J\x1b[H")?;
                if let Err(e) = render(&view, &mut out) {
                    tracing::error!(error = %e, "render failed");
                    break;
                }
            }
        }
    }

    poller.shutdown().await;
    Ok(())
}

async fn train(pair: &str, slider: u8, tick: Duration) -> Result<()> {
    let steps = settings::training_steps(slider);
    println!(
        "Training {pair} model for {} steps (simulated progress, no backend job)",
        settings::format_number(steps)
    );

    let mut source = SimulatedProgress::new();
    let done = settings::run_training(&mut source, tick, |progress| {
        println!("{:>6.1}%  {}", progress.percent(), progress.phase().status_text());
    })
    .await;

    tracing::debug!(percent = done.percent(), "training finished");
    Ok(())
}
