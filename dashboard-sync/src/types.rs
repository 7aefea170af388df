//! Common types for the dashboard
//!
//! All shared data structures used across modules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Asset pinned to the top of every wallet listing
pub const PINNED_ASSET: &str = "USD";

/// Trade side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side {other:?}")),
        }
    }
}

/// A completed trade as shown in the history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: String,
    pub pair: String,
    pub side: TradeSide,
    pub price: f64,
    /// `None` when the backend omitted it; rendered as a placeholder
    pub quantity: Option<f64>,
    pub total: f64,
    pub status: String,
}

impl Trade {
    /// Time-of-day part of a `YYYY-MM-DD HH:MM:SS` timestamp
    pub fn time_of_day(&self) -> &str {
        match self.timestamp.find(' ') {
            Some(idx) => &self.timestamp[idx + 1..],
            None => &self.timestamp,
        }
    }
}

/// Running state of the remote bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BotState {
    Running,
    #[default]
    Stopped,
}

impl BotState {
    pub fn from_active(is_active: bool) -> Self {
        if is_active { BotState::Running } else { BotState::Stopped }
    }

    pub fn is_running(self) -> bool {
        self == BotState::Running
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotState::Running => write!(f, "Running"),
            BotState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Free and reserved portions of one asset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetBalance {
    pub free: f64,
    pub locked: f64,
}

impl AssetBalance {
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

/// Wallet balances keyed by asset symbol
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub balances: BTreeMap<String, AssetBalance>,
}

impl WalletSnapshot {
    pub fn get(&self, asset: &str) -> Option<&AssetBalance> {
        self.balances.get(asset)
    }

    /// Free balance of an asset, zero when absent
    pub fn free(&self, asset: &str) -> f64 {
        self.get(asset).map_or(0.0, |b| b.free)
    }

    /// Display order: USD first, the rest lexicographic
    pub fn display_order(&self) -> Vec<(&str, &AssetBalance)> {
        let pinned = self
            .balances
            .get_key_value(PINNED_ASSET)
            .map(|(k, v)| (k.as_str(), v));

        pinned
            .into_iter()
            .chain(
                self.balances
                    .iter()
                    .filter(|(k, _)| k.as_str() != PINNED_ASSET)
                    .map(|(k, v)| (k.as_str(), v)),
            )
            .collect()
    }
}

/// Latest ticker for the tracked pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub pair: String,
    pub last_price: f64,
    /// 24h change as a fraction (0.0123 = +1.23%)
    pub change: f64,
    pub received_at: DateTime<Utc>,
}

impl MarketTick {
    pub fn change_percent(&self) -> f64 {
        self.change * 100.0
    }
}

/// One point on the price chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub label: String,
    pub value: f64,
}

/// Metrics derived from the trade list on every refresh
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    /// BUY immediately followed by SELL, in timestamp order
    pub closed_positions: usize,
    pub profitable_closures: usize,
    pub total_profit: f64,
    /// Percent of closed positions that were profitable
    pub win_rate: Option<f64>,
    /// Gross profit over gross loss
    pub profit_factor: Option<f64>,
    /// Largest peak-to-trough drop of cumulative closure profit
    pub max_drawdown: Option<f64>,
}

/// Manual trade submitted from the trade form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualTrade {
    pub pair: String,
    pub side: TradeSide,
    pub quantity: f64,
}

/// Bot settings posted when (re)starting the bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    pub trading_pair: String,
    /// Fraction of capital at risk (0.02 = 2%)
    pub risk_level: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_selection: Option<String>,
    /// Minutes between trading decisions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trading_frequency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reinvest_profits: Option<bool>,
}

/// Data categories refreshed independently by the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    TradeHistory,
    Wallet,
    Market,
    Status,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::TradeHistory,
        Category::Wallet,
        Category::Market,
        Category::Status,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::TradeHistory => "trade_history",
            Category::Wallet => "wallet",
            Category::Market => "market",
            Category::Status => "status",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
