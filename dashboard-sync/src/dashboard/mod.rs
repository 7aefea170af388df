//! Dashboard module - Trading bot terminal view
//!
//! Builds a display-ready snapshot of the application state and renders
//! it as text. Separated into view model, formatting, and rendering.
//!
//! # Architecture
//! - `mod.rs`: `DashboardView`, built from `AppState` under the lock
//! - `format.rs`: currency, percent, and placeholder formatting
//! - `text.rs`: text renderer writing to any `io::Write`
//!
//! # Features
//! - Current price with signed 24h change
//! - Rolling price chart (sparkline)
//! - Wallet balances and portfolio value
//! - Trade history with derived performance metrics
//! - Bot status with the single enabled control
//! - Stale data indicators and action notices

pub mod format;
mod text;

pub use text::{render, render_to_string, sparkline};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::control::ControlAction;
use crate::state::{AppState, Notice};
use crate::types::{BotState, Category, PerformanceMetrics, PricePoint, TradeSide};

#[derive(Debug, Clone, PartialEq)]
pub struct WalletRow {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub time: String,
    pub pair: String,
    pub side: TradeSide,
    pub price: f64,
    /// `None` when the backend did not report it
    pub quantity: Option<f64>,
    pub total: f64,
    pub status: String,
}

/// Everything the renderer needs, detached from the lock
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub generated_at: DateTime<Utc>,
    pub pair: String,
    pub quote_asset: String,
    pub price: Option<f64>,
    /// Signed percent
    pub change_percent: Option<f64>,
    pub chart: Vec<PricePoint>,
    /// `None` until the first wallet response
    pub wallet: Option<Vec<WalletRow>>,
    pub portfolio_value: Option<f64>,
    pub trades: Vec<TradeRow>,
    pub metrics: PerformanceMetrics,
    /// `None` until the first status poll
    pub bot_state: Option<BotState>,
    pub enabled_control: ControlAction,
    pub pending_control: Option<ControlAction>,
    pub stale: Vec<Category>,
    pub notices: Vec<Notice>,
}

impl DashboardView {
    /// Snapshot `state`. Expired notices are pruned on the way.
    pub fn build(state: &mut AppState, config: &Config, now: DateTime<Utc>) -> Self {
        let notices = state.active_notices(now).to_vec();

        let wallet = state.wallet.as_ref().map(|w| {
            w.display_order()
                .into_iter()
                .map(|(asset, balance)| WalletRow {
                    asset: asset.to_string(),
                    free: balance.free,
                    locked: balance.locked,
                })
                .collect()
        });

        let trades = state
            .trades
            .iter()
            .map(|t| TradeRow {
                time: t.time_of_day().to_string(),
                pair: t.pair.clone(),
                side: t.side,
                price: t.price,
                quantity: t.quantity,
                total: t.total,
                status: t.status.clone(),
            })
            .collect();

        let stale = Category::ALL
            .iter()
            .copied()
            .filter(|c| state.is_stale(*c))
            .collect();

        Self {
            generated_at: now,
            pair: config.trading_pair.clone(),
            quote_asset: config.quote_asset.clone(),
            price: state.latest_price(),
            change_percent: state.market.as_ref().map(|m| m.change_percent()),
            chart: state.series.iter().cloned().collect(),
            wallet,
            portfolio_value: state.portfolio_value(&config.base_asset, &config.quote_asset),
            trades,
            metrics: state.metrics.clone(),
            bot_state: state.status_known.then(|| state.control.state()),
            enabled_control: state.control.enabled_control(),
            pending_control: state.control.in_flight(),
            stale,
            notices,
        }
    }

    pub fn is_stale(&self, category: Category) -> bool {
        self.stale.contains(&category)
    }
}
