//! Dashboard synchronization
//!
//! Coordinates the API client, normalizer, and application state:
//! - Polled refreshes (trade history, wallet, market, bot status)
//! - User actions (start/stop, manual trade, bot settings)
//!
//! Refreshes never touch the previous state on failure. User actions
//! additionally raise a notice so the failure is visible.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Local, Utc};

use crate::client::DashboardClient;
use crate::config::Config;
use crate::control::ControlAction;
use crate::dashboard::DashboardView;
use crate::error::{DashboardError, Result};
use crate::normalize;
use crate::poller::{Poller, TaskHandle};
use crate::settings;
use crate::state::{AppState, NoticeLevel};
use crate::types::{BotSettings, Category, ManualTrade};

/// Polling client for one bot backend
#[derive(Debug, Clone)]
pub struct DashboardSync {
    client: DashboardClient,
    config: Arc<Config>,
    state: Arc<Mutex<AppState>>,
}

/// Clears the in-flight marker if a control request is abandoned mid-way
struct InFlightGuard {
    state: Arc<Mutex<AppState>>,
    action: ControlAction,
    armed: bool,
}

impl InFlightGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.state).control.abandon(self.action);
        }
    }
}

fn lock(state: &Mutex<AppState>) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DashboardSync {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = DashboardClient::new(&config)?;
        let state = AppState::new(config.price_series_capacity, config.stale_after_failures);

        Ok(Self {
            client,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &DashboardClient {
        &self.client
    }

    /// Run `f` against the locked state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Display-ready snapshot of the current state
    pub fn view(&self) -> DashboardView {
        let now = Utc::now();
        self.with_state(|state| DashboardView::build(state, &self.config, now))
    }

    // ------------------------------------------------------------------
    // Polled refreshes
    // ------------------------------------------------------------------

    pub async fn refresh_trade_history(&self) -> Result<()> {
        let seq = self.with_state(|s| s.begin_request(Category::TradeHistory));
        let result = match self.client.get_trade_history().await {
            Ok(envelope) => normalize::trades(envelope, &self.config.trading_pair),
            Err(e) => Err(e),
        };
        self.settle(Category::TradeHistory, seq, result, |state, trades| {
            state.apply_trades(seq, trades, Utc::now())
        })
    }

    pub async fn refresh_wallet(&self) -> Result<()> {
        let seq = self.with_state(|s| s.begin_request(Category::Wallet));
        let result = match self.client.get_wallet_balance().await {
            Ok(envelope) => normalize::wallet(envelope),
            Err(e) => Err(e),
        };
        self.settle(Category::Wallet, seq, result, |state, wallet| {
            state.apply_wallet(seq, wallet, Utc::now())
        })
    }

    pub async fn refresh_market(&self) -> Result<()> {
        let pair = &self.config.trading_pair;
        let seq = self.with_state(|s| s.begin_request(Category::Market));
        let result = match self.client.get_market_data(pair).await {
            Ok(envelope) => normalize::market(envelope, pair, Utc::now()),
            Err(e) => Err(e),
        };
        self.settle(Category::Market, seq, result, |state, tick| {
            let label = tick
                .received_at
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string();
            state.apply_market(seq, tick, label)
        })
    }

    pub async fn refresh_status(&self) -> Result<()> {
        let seq = self.with_state(|s| s.begin_request(Category::Status));
        let result = self
            .client
            .get_trading_status()
            .await
            .map(|status| normalize::status(&status));
        self.settle(Category::Status, seq, result, |state, bot_state| {
            state.apply_status(seq, bot_state, Utc::now())
        })
    }

    /// Apply a refresh result or count the failure
    fn settle<T>(
        &self,
        category: Category,
        seq: u64,
        result: Result<T>,
        apply: impl FnOnce(&mut AppState, T) -> bool,
    ) -> Result<()> {
        match result {
            Ok(value) => {
                let applied = self.with_state(|state| apply(state, value));
                if applied {
                    tracing::trace!(%category, seq, "refreshed");
                }
                Ok(())
            }
            Err(e) => {
                let went_stale = self.with_state(|state| state.record_failure(category, seq, &e.to_string()));
                if went_stale {
                    tracing::warn!(
                        %category,
                        failures = self.config.stale_after_failures,
                        "data is stale after consecutive failures"
                    );
                }
                Err(e)
            }
        }
    }

    /// Refresh every category once, concurrently
    pub async fn refresh_all(&self) -> Vec<(Category, DashboardError)> {
        let (trades, wallet, market, status) = futures::join!(
            self.refresh_trade_history(),
            self.refresh_wallet(),
            self.refresh_market(),
            self.refresh_status(),
        );

        [
            (Category::TradeHistory, trades),
            (Category::Wallet, wallet),
            (Category::Market, market),
            (Category::Status, status),
        ]
        .into_iter()
        .filter_map(|(category, result)| result.err().map(|e| (category, e)))
        .collect()
    }

    /// Register one schedule per category at its configured interval
    pub fn spawn_polling(&self, poller: &mut Poller) -> Vec<TaskHandle> {
        let schedules = [
            (Category::TradeHistory, self.config.trade_history_interval_ms),
            (Category::Wallet, self.config.wallet_interval_ms),
            (Category::Market, self.config.market_interval_ms),
            (Category::Status, self.config.status_interval_ms),
        ];

        schedules
            .into_iter()
            .map(|(category, interval_ms)| {
                let sync = self.clone();
                poller.schedule(
                    category.name(),
                    Duration::from_millis(interval_ms),
                    move || {
                        let sync = sync.clone();
                        async move { sync.refresh(category).await }
                    },
                )
            })
            .collect()
    }

    pub async fn refresh(&self, category: Category) -> Result<()> {
        match category {
            Category::TradeHistory => self.refresh_trade_history().await,
            Category::Wallet => self.refresh_wallet().await,
            Category::Market => self.refresh_market().await,
            Category::Status => self.refresh_status().await,
        }
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    pub async fn start_trading(&self) -> Result<()> {
        self.control(ControlAction::Start).await
    }

    pub async fn stop_trading(&self) -> Result<()> {
        self.control(ControlAction::Stop).await
    }

    async fn control(&self, action: ControlAction) -> Result<()> {
        self.with_state(|s| s.control.begin(action))?;
        let guard = InFlightGuard {
            state: Arc::clone(&self.state),
            action,
            armed: true,
        };

        let response = match action {
            ControlAction::Start => self.client.start_trading().await,
            ControlAction::Stop => self.client.stop_trading().await,
        };
        let result = response.and_then(crate::client::Envelope::into_ack);
        guard.disarm();

        let now = Utc::now();
        self.with_state(|state| match result {
            Ok(_) => {
                state.finish_control(action, true);
                let (level, message) = match action {
                    ControlAction::Start => (NoticeLevel::Success, "Trading bot started successfully!"),
                    ControlAction::Stop => (NoticeLevel::Warning, "Trading bot stopped!"),
                };
                state.push_notice(level, message, now);
                tracing::info!(%action, "bot control succeeded");
                Ok(())
            }
            Err(e) => {
                state.finish_control(action, false);
                state.push_notice(NoticeLevel::Danger, format!("Failed to {action} trading: {e}"), now);
                tracing::error!(%action, error = %e, "bot control failed");
                Err(e)
            }
        })
    }

    /// Submit a manual trade, then refresh trades and wallet on success
    pub async fn execute_trade(&self, trade: ManualTrade) -> Result<()> {
        if !(trade.quantity.is_finite() && trade.quantity > 0.0) {
            return Err(DashboardError::InvalidInput(format!(
                "quantity must be positive, got {}",
                trade.quantity
            )));
        }

        let result = match self.client.execute_trade(&trade).await {
            Ok(envelope) => envelope.into_ack(),
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => {
                tracing::info!(pair = %trade.pair, side = %trade.side, quantity = trade.quantity, "trade executed");
                self.with_state(|s| {
                    s.push_notice(NoticeLevel::Success, "Trade executed successfully!", Utc::now())
                });
                let (trades, wallet) =
                    futures::join!(self.refresh_trade_history(), self.refresh_wallet());
                for e in [trades.err(), wallet.err()].into_iter().flatten() {
                    tracing::warn!(error = %e, "refresh after trade failed");
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(pair = %trade.pair, error = %e, "trade execution failed");
                self.with_state(|s| {
                    s.push_notice(
                        NoticeLevel::Danger,
                        format!("Trade execution failed: {}", reason(&e)),
                        Utc::now(),
                    )
                });
                Err(e)
            }
        }
    }

    /// Post bot settings; the backend starts the bot with them
    pub async fn save_settings(&self, bot_settings: BotSettings) -> Result<Option<String>> {
        settings::validate(&bot_settings)?;

        let result = match self.client.start_bot(&bot_settings).await {
            Ok(envelope) => envelope.into_ack(),
            Err(e) => Err(e),
        };

        match result {
            Ok(message) => {
                tracing::info!(pair = %bot_settings.trading_pair, "settings saved");
                self.with_state(|s| {
                    s.push_notice(NoticeLevel::Success, "Settings saved and bot started", Utc::now())
                });
                if let Err(e) = self.refresh_status().await {
                    tracing::warn!(error = %e, "status refresh after settings failed");
                }
                Ok(message)
            }
            Err(e) => {
                let message = match &e {
                    DashboardError::Envelope(m) => format!("Failed to save settings: {m}"),
                    _ => "Error saving settings".to_string(),
                };
                tracing::error!(error = %e, "saving settings failed");
                self.with_state(|s| s.push_notice(NoticeLevel::Danger, message, Utc::now()));
                Err(e)
            }
        }
    }

    pub async fn stop_bot(&self) -> Result<Option<String>> {
        let result = match self.client.stop_bot().await {
            Ok(envelope) => envelope.into_ack(),
            Err(e) => Err(e),
        };

        let now = Utc::now();
        match result {
            Ok(message) => {
                self.with_state(|s| s.push_notice(NoticeLevel::Warning, "Bot stopped", now));
                Ok(message)
            }
            Err(e) => {
                self.with_state(|s| {
                    s.push_notice(NoticeLevel::Danger, format!("Failed to stop bot: {}", reason(&e)), now)
                });
                Err(e)
            }
        }
    }
}

/// Backend message without the error-kind prefix
fn reason(err: &DashboardError) -> String {
    match err {
        DashboardError::Envelope(m) | DashboardError::Network(m) => m.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BotState, TradeSide};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sync_for(server: &MockServer) -> DashboardSync {
        DashboardSync::new(Config {
            api_base: server.uri(),
            ..Config::default()
        })
        .expect("sync should build")
    }

    async fn mount_json(server: &MockServer, verb: &str, route: &str, body: serde_json::Value) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_failed_envelope_keeps_wallet() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "GET",
            "/api/wallet-balance",
            json!({"success": true, "data": {"Wallet": {"BTC": {"Free": 0.5}, "USD": {"Free": 100}}}}),
        )
        .await;

        let sync = sync_for(&server);
        sync.refresh_wallet().await.unwrap();
        let before = sync.with_state(|s| s.wallet.clone());
        assert!(before.is_some());

        server.reset().await;
        mount_json(&server, "GET", "/api/wallet-balance", json!({"success": false})).await;

        let err = sync.refresh_wallet().await.unwrap_err();
        assert!(matches!(err, DashboardError::Envelope(_)));
        assert_eq!(sync.with_state(|s| s.wallet.clone()), before);
    }

    #[tokio::test]
    async fn test_refresh_all_populates_state() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "GET",
            "/api/trade-history",
            json!({"success": true, "data": [
                {"timestamp": "2024-01-01 10:00:00", "pair": "BTC/USD", "side": "BUY", "price": 100, "quantity": 1, "total": 100, "status": "FILLED"},
                {"timestamp": "2024-01-01 10:05:00", "pair": "BTC/USD", "side": "SELL", "price": 110, "quantity": 1, "total": 110, "status": "FILLED"}
            ]}),
        )
        .await;
        mount_json(
            &server,
            "GET",
            "/api/wallet-balance",
            json!({"success": true, "data": {"Wallet": {"BTC": {"Free": 0.5}, "USD": {"Free": 100}}}}),
        )
        .await;
        mount_json(
            &server,
            "GET",
            "/api/market-data",
            json!({"success": true, "data": {"Data": {"BTC/USD": {"LastPrice": 60000, "Change": 0.01}}}}),
        )
        .await;
        mount_json(&server, "GET", "/api/trading-status", json!({"is_active": true})).await;

        let sync = sync_for(&server);
        let failures = sync.refresh_all().await;
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");

        sync.with_state(|s| {
            assert_eq!(s.trades.len(), 2);
            assert_eq!(s.metrics.win_rate, Some(100.0));
            assert_eq!(s.series.len(), 1);
            assert_eq!(s.control.state(), BotState::Running);
            assert_eq!(s.portfolio_value("BTC", "USD"), Some(30100.0));
        });
    }

    #[tokio::test]
    async fn test_one_category_failing_leaves_others() {
        let server = MockServer::start().await;
        mount_json(&server, "GET", "/api/trading-status", json!({"is_active": false})).await;
        // Everything else 404s

        let sync = sync_for(&server);
        let failures = sync.refresh_all().await;
        let failed: Vec<Category> = failures.iter().map(|(c, _)| *c).collect();
        assert_eq!(failed.len(), 3);
        assert!(!failed.contains(&Category::Status));
        assert!(sync.with_state(|s| s.status_known));
    }

    #[tokio::test]
    async fn test_concurrent_start_submits_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/start-trading"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "Trading bot started"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sync = sync_for(&server);
        let (first, second) = tokio::join!(sync.start_trading(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sync.start_trading().await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(DashboardError::ControlBusy(_))));
        assert_eq!(sync.with_state(|s| s.control.state()), BotState::Running);
    }

    #[tokio::test]
    async fn test_slow_status_poll_does_not_revert_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/trading-status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"is_active": false}))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        mount_json(&server, "POST", "/api/start-trading", json!({"success": true})).await;

        let sync = sync_for(&server);
        let (poll, start) = tokio::join!(sync.refresh_status(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sync.start_trading().await
        });

        assert!(poll.is_ok());
        assert!(start.is_ok());
        assert_eq!(sync.with_state(|s| s.control.state()), BotState::Running);
    }

    #[tokio::test]
    async fn test_trailing_slash_in_api_base() {
        let server = MockServer::start().await;
        mount_json(&server, "GET", "/api/trading-status", json!({"is_active": true})).await;

        let mut config = Config::default();
        config.set_api_base(&format!("{}/", server.uri())).unwrap();
        let sync = DashboardSync::new(config).unwrap();

        sync.refresh_status().await.unwrap();
        assert_eq!(sync.with_state(|s| s.control.state()), BotState::Running);
    }

    #[tokio::test]
    async fn test_failed_stop_surfaces_notice() {
        let server = MockServer::start().await;
        mount_json(&server, "GET", "/api/trading-status", json!({"is_active": true})).await;
        mount_json(
            &server,
            "POST",
            "/api/stop-trading",
            json!({"success": false, "error": "engine unreachable"}),
        )
        .await;

        let sync = sync_for(&server);
        sync.refresh_status().await.unwrap();
        assert!(sync.stop_trading().await.is_err());

        sync.with_state(|s| {
            assert_eq!(s.control.state(), BotState::Running);
            assert_eq!(s.control.in_flight(), None);
            let notice = s.notices().last().expect("notice expected");
            assert_eq!(notice.level, NoticeLevel::Danger);
            assert!(notice.message.contains("engine unreachable"));
        });
    }

    #[tokio::test]
    async fn test_trade_refreshes_history_and_wallet() {
        let server = MockServer::start().await;
        mount_json(&server, "POST", "/api/execute-trade", json!({"success": true})).await;
        Mock::given(method("GET"))
            .and(path("/api/trade-history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/wallet-balance"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "data": {"Wallet": {}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sync = sync_for(&server);
        sync.execute_trade(ManualTrade {
            pair: "BTC/USD".into(),
            side: TradeSide::Buy,
            quantity: 0.01,
        })
        .await
        .unwrap();

        sync.with_state(|s| {
            assert_eq!(s.notices().len(), 1);
            assert_eq!(s.notices()[0].message, "Trade executed successfully!");
        });
    }

    #[tokio::test]
    async fn test_trade_rejects_bad_quantity() {
        let server = MockServer::start().await;
        let sync = sync_for(&server);
        let err = sync
            .execute_trade(ManualTrade {
                pair: "BTC/USD".into(),
                side: TradeSide::Sell,
                quantity: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_settings_failure_message() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "POST",
            "/api/start_bot",
            json!({"status": "error", "message": "model not found"}),
        )
        .await;

        let sync = sync_for(&server);
        let settings = BotSettings {
            trading_pair: "BTC/USD".into(),
            risk_level: 0.02,
            model_selection: Some("ppo".into()),
            trading_frequency: Some(5),
            stop_loss: Some(0.05),
            reinvest_profits: Some(true),
        };
        assert!(sync.save_settings(settings).await.is_err());
        sync.with_state(|s| {
            assert_eq!(s.notices()[0].message, "Failed to save settings: model not found");
        });
    }
}
