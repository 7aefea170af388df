//! Application state owned by the dashboard
//!
//! Every category (trades, wallet, market, status) has its own request
//! sequence. A response is applied only when its sequence is newer than
//! the last applied one, so a slow reply cannot overwrite fresher data.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::control::{BotControlGate, ControlAction};
use crate::performance;
use crate::series::PriceSeries;
use crate::types::{
    BotState, Category, MarketTick, PerformanceMetrics, Trade, WalletSnapshot,
};
use crate::valuation;

/// How long a notice stays visible
pub const NOTICE_TTL_SECS: i64 = 5;

/// Banner severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl NoticeLevel {
    pub fn label(self) -> &'static str {
        match self {
            NoticeLevel::Success => "OK",
            NoticeLevel::Info => "INFO",
            NoticeLevel::Warning => "WARN",
            NoticeLevel::Danger => "ERROR",
        }
    }
}

/// Dismissible banner raised by user-triggered actions
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Duration::seconds(NOTICE_TTL_SECS)
    }
}

/// Request bookkeeping for one category
#[derive(Debug, Clone, Default)]
pub struct CategoryHealth {
    next_seq: u64,
    last_applied: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl CategoryHealth {
    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub series: PriceSeries,
    pub wallet: Option<WalletSnapshot>,
    pub market: Option<MarketTick>,
    pub trades: Vec<Trade>,
    pub metrics: PerformanceMetrics,
    pub control: BotControlGate,
    /// False until the first status poll lands
    pub status_known: bool,
    health: BTreeMap<Category, CategoryHealth>,
    notices: Vec<Notice>,
    next_notice_id: u64,
    stale_after: u32,
    /// Bumped on every applied change; renderers redraw when it moves
    revision: u64,
}

impl AppState {
    pub fn new(series_capacity: usize, stale_after: u32) -> Self {
        Self {
            series: PriceSeries::with_capacity(series_capacity),
            wallet: None,
            market: None,
            trades: Vec::new(),
            metrics: PerformanceMetrics::default(),
            control: BotControlGate::default(),
            status_known: false,
            health: Category::ALL
                .iter()
                .map(|c| (*c, CategoryHealth::default()))
                .collect(),
            notices: Vec::new(),
            next_notice_id: 1,
            stale_after: stale_after.max(1),
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn health_mut(&mut self, category: Category) -> &mut CategoryHealth {
        self.health.entry(category).or_default()
    }

    pub fn health(&self, category: Category) -> Option<&CategoryHealth> {
        self.health.get(&category)
    }

    /// Reserve the sequence number for a new request
    pub fn begin_request(&mut self, category: Category) -> u64 {
        let health = self.health_mut(category);
        health.next_seq += 1;
        health.next_seq
    }

    /// Claim `seq` for application; false when a newer response already landed
    fn accept(&mut self, category: Category, seq: u64, now: DateTime<Utc>) -> bool {
        let health = self.health_mut(category);
        if seq <= health.last_applied {
            tracing::debug!(
                %category,
                seq,
                last_applied = health.last_applied,
                "discarding out-of-order response"
            );
            return false;
        }
        health.last_applied = seq;
        health.consecutive_failures = 0;
        health.last_success = Some(now);
        health.last_error = None;
        true
    }

    /// Count a failed request. Returns true when the category just went stale.
    pub fn record_failure(&mut self, category: Category, seq: u64, error: &str) -> bool {
        let stale_after = self.stale_after;
        let health = self.health_mut(category);
        if seq <= health.last_applied {
            return false;
        }
        health.consecutive_failures += 1;
        health.last_error = Some(error.to_string());
        let became_stale = health.consecutive_failures == stale_after;
        self.touch();
        became_stale
    }

    /// Whether the category has failed too many times in a row
    pub fn is_stale(&self, category: Category) -> bool {
        self.health
            .get(&category)
            .is_some_and(|h| h.consecutive_failures >= self.stale_after)
    }

    pub fn apply_trades(&mut self, seq: u64, trades: Vec<Trade>, now: DateTime<Utc>) -> bool {
        if !self.accept(Category::TradeHistory, seq, now) {
            return false;
        }
        self.metrics = performance::compute(&trades);
        self.trades = trades;
        self.touch();
        true
    }

    pub fn apply_wallet(&mut self, seq: u64, wallet: WalletSnapshot, now: DateTime<Utc>) -> bool {
        if !self.accept(Category::Wallet, seq, now) {
            return false;
        }
        self.wallet = Some(wallet);
        self.touch();
        true
    }

    /// Record the tick and push a chart point labelled `label`
    pub fn apply_market(&mut self, seq: u64, tick: MarketTick, label: String) -> bool {
        if !self.accept(Category::Market, seq, tick.received_at) {
            return false;
        }
        self.series.append(label, tick.last_price);
        self.market = Some(tick);
        self.touch();
        true
    }

    pub fn apply_status(&mut self, seq: u64, state: BotState, now: DateTime<Utc>) -> bool {
        if !self.accept(Category::Status, seq, now) {
            return false;
        }
        self.status_known = true;
        if self.control.observe(state) {
            tracing::info!(state = %state, "bot state changed");
        }
        self.touch();
        true
    }

    /// Resolve a control request. On success every status poll issued
    /// so far is superseded, since it predates the new state.
    pub fn finish_control(&mut self, action: ControlAction, succeeded: bool) {
        self.control.finish(action, succeeded);
        if succeeded {
            let health = self.health_mut(Category::Status);
            health.last_applied = health.next_seq;
        }
        self.touch();
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.market.as_ref().map(|m| m.last_price)
    }

    /// Portfolio value; `None` until both a wallet and a price are known
    pub fn portfolio_value(&self, base_asset: &str, quote_asset: &str) -> Option<f64> {
        let wallet = self.wallet.as_ref()?;
        valuation::portfolio_value(wallet, base_asset, quote_asset, self.latest_price(), &self.series)
    }

    pub fn push_notice(&mut self, level: NoticeLevel, message: impl Into<String>, now: DateTime<Utc>) -> u64 {
        let id = self.next_notice_id;
        self.next_notice_id += 1;
        self.notices.push(Notice {
            id,
            level,
            message: message.into(),
            created_at: now,
        });
        self.touch();
        id
    }

    /// Drop expired notices and return the rest
    pub fn active_notices(&mut self, now: DateTime<Utc>) -> &[Notice] {
        let before = self.notices.len();
        self.notices.retain(|n| !n.is_expired(now));
        if self.notices.len() != before {
            self.touch();
        }
        &self.notices
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn dismiss_notice(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        let removed = self.notices.len() != before;
        if removed {
            self.touch();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetBalance, TradeSide};

    fn state() -> AppState {
        AppState::new(20, 3)
    }

    fn wallet(btc: f64, usd: f64) -> WalletSnapshot {
        let mut w = WalletSnapshot::default();
        w.balances.insert("BTC".into(), AssetBalance { free: btc, locked: 0.0 });
        w.balances.insert("USD".into(), AssetBalance { free: usd, locked: 0.0 });
        w
    }

    fn tick(price: f64) -> MarketTick {
        MarketTick {
            pair: "BTC/USD".into(),
            last_price: price,
            change: 0.0,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_out_of_order_response_discarded() {
        let mut s = state();
        let now = Utc::now();
        let first = s.begin_request(Category::Wallet);
        let second = s.begin_request(Category::Wallet);

        assert!(s.apply_wallet(second, wallet(1.0, 10.0), now));
        assert!(!s.apply_wallet(first, wallet(9.0, 90.0), now));
        assert_eq!(s.wallet, Some(wallet(1.0, 10.0)));
    }

    #[test]
    fn test_failure_keeps_previous_wallet() {
        let mut s = state();
        let now = Utc::now();
        let seq = s.begin_request(Category::Wallet);
        s.apply_wallet(seq, wallet(0.5, 100.0), now);

        let seq = s.begin_request(Category::Wallet);
        s.record_failure(Category::Wallet, seq, "Envelope error: auth");
        assert_eq!(s.wallet, Some(wallet(0.5, 100.0)));
    }

    #[test]
    fn test_stale_after_consecutive_failures() {
        let mut s = state();
        let mut became = Vec::new();
        for _ in 0..4 {
            let seq = s.begin_request(Category::Market);
            became.push(s.record_failure(Category::Market, seq, "down"));
        }
        assert_eq!(became, vec![false, false, true, false]);
        assert!(s.is_stale(Category::Market));
        assert!(!s.is_stale(Category::Wallet));

        let seq = s.begin_request(Category::Market);
        s.apply_market(seq, tick(100.0), "10:00:00".into());
        assert!(!s.is_stale(Category::Market));
    }

    #[test]
    fn test_late_failure_after_success_ignored() {
        let mut s = state();
        let old = s.begin_request(Category::Status);
        let new = s.begin_request(Category::Status);
        s.apply_status(new, BotState::Running, Utc::now());
        assert!(!s.record_failure(Category::Status, old, "timeout"));
        assert_eq!(s.health(Category::Status).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_trades_recompute_metrics() {
        let mut s = state();
        let trade = |ts: &str, side, price| Trade {
            timestamp: ts.into(),
            pair: "BTC/USD".into(),
            side,
            price,
            quantity: Some(1.0),
            total: price,
            status: "FILLED".into(),
        };
        let seq = s.begin_request(Category::TradeHistory);
        s.apply_trades(
            seq,
            vec![
                trade("2024-01-01 10:00:00", TradeSide::Buy, 100.0),
                trade("2024-01-01 10:01:00", TradeSide::Sell, 110.0),
            ],
            Utc::now(),
        );
        assert_eq!(s.metrics.win_rate, Some(100.0));

        let seq = s.begin_request(Category::TradeHistory);
        s.apply_trades(seq, Vec::new(), Utc::now());
        assert_eq!(s.metrics, PerformanceMetrics::default());
    }

    #[test]
    fn test_portfolio_value_needs_wallet_and_price() {
        let mut s = state();
        assert_eq!(s.portfolio_value("BTC", "USD"), None);

        let seq = s.begin_request(Category::Wallet);
        s.apply_wallet(seq, wallet(0.5, 100.0), Utc::now());
        assert_eq!(s.portfolio_value("BTC", "USD"), None);

        let seq = s.begin_request(Category::Market);
        s.apply_market(seq, tick(60000.0), "10:00:00".into());
        assert_eq!(s.portfolio_value("BTC", "USD"), Some(30100.0));
    }

    #[test]
    fn test_status_poll_updates_control() {
        let mut s = state();
        assert!(!s.status_known);
        let seq = s.begin_request(Category::Status);
        s.apply_status(seq, BotState::Running, Utc::now());
        assert!(s.status_known);
        assert_eq!(s.control.state(), BotState::Running);
    }

    #[test]
    fn test_status_poll_issued_before_start_is_discarded() {
        let mut s = state();
        s.control.begin(ControlAction::Start).unwrap();
        let in_flight_poll = s.begin_request(Category::Status);
        s.finish_control(ControlAction::Start, true);

        assert!(!s.apply_status(in_flight_poll, BotState::Stopped, Utc::now()));
        assert_eq!(s.control.state(), BotState::Running);

        let fresh = s.begin_request(Category::Status);
        assert!(s.apply_status(fresh, BotState::Stopped, Utc::now()));
        assert_eq!(s.control.state(), BotState::Stopped);
    }

    #[test]
    fn test_failed_control_keeps_pending_polls() {
        let mut s = state();
        s.control.begin(ControlAction::Start).unwrap();
        let poll = s.begin_request(Category::Status);
        s.finish_control(ControlAction::Start, false);

        assert!(s.apply_status(poll, BotState::Stopped, Utc::now()));
        assert_eq!(s.control.state(), BotState::Stopped);
    }

    #[test]
    fn test_notices_expire_and_dismiss() {
        let mut s = state();
        let t0 = Utc::now();
        let a = s.push_notice(NoticeLevel::Success, "Trading bot started successfully!", t0);
        let b = s.push_notice(NoticeLevel::Danger, "Trade execution failed", t0 + Duration::seconds(3));

        assert_eq!(s.active_notices(t0 + Duration::seconds(1)).len(), 2);
        assert!(s.dismiss_notice(b));
        assert!(!s.dismiss_notice(b));

        let left = s.active_notices(t0 + Duration::seconds(5));
        assert!(left.is_empty(), "notice {a} should have expired");
    }

    #[test]
    fn test_revision_moves_on_change() {
        let mut s = state();
        let r0 = s.revision();
        let seq = s.begin_request(Category::Market);
        s.apply_market(seq, tick(1.0), "t".into());
        assert!(s.revision() > r0);
    }
}
