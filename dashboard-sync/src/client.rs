//! Trading bot backend API client
//!
//! Implements the control panel's REST contract:
//! - Trade history, wallet balances, market data, bot status (polled)
//! - Start/stop trading, manual trades, bot settings (user actions)
//!
//! The client only checks HTTP status and decodes JSON; envelope
//! validation and field defaults live in `normalize`.

use std::collections::BTreeMap;

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::types::{BotSettings, ManualTrade};

/// `{success|status, data}` wrapper returned by every endpoint
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: Option<bool>,
    pub status: Option<String>,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// `success: true` or `status: "success"`
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(false) || self.status.as_deref() == Some("success")
    }

    /// Best available explanation for a failed envelope
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "backend reported failure".to_string())
    }

    /// Unwrap the payload, failing on a negative envelope or missing data
    pub fn into_data(self) -> Result<T> {
        if !self.is_success() {
            return Err(DashboardError::Envelope(self.failure_reason()));
        }
        self.data
            .ok_or_else(|| DashboardError::Envelope("response carried no data".to_string()))
    }

    /// Acknowledge an action envelope, returning the backend's message if any
    pub fn into_ack(self) -> Result<Option<String>> {
        if self.is_success() {
            Ok(self.message)
        } else {
            Err(DashboardError::Envelope(self.failure_reason()))
        }
    }
}

/// Trade row as sent by the backend; every field may be missing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrade {
    #[serde(alias = "time")]
    pub timestamp: Option<String>,
    pub pair: Option<String>,
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: Option<f64>,
    pub status: Option<String>,
}

/// Wallet payload; older backends use `SpotWallet`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletPayload {
    #[serde(rename = "Wallet")]
    pub wallet: Option<BTreeMap<String, RawBalance>>,
    #[serde(rename = "SpotWallet")]
    pub spot_wallet: Option<BTreeMap<String, RawBalance>>,
}

/// Balance entry for one asset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBalance {
    #[serde(rename = "Free", default, deserialize_with = "lenient_f64")]
    pub free: Option<f64>,
    #[serde(rename = "Lock", alias = "Locked", default, deserialize_with = "lenient_f64")]
    pub lock: Option<f64>,
}

/// Market data payload keyed by pair
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketPayload {
    #[serde(rename = "Data", default)]
    pub data: BTreeMap<String, RawTicker>,
}

/// Ticker for one pair
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTicker {
    #[serde(rename = "LastPrice", default, deserialize_with = "lenient_f64")]
    pub last_price: Option<f64>,
    #[serde(rename = "Change", default, deserialize_with = "lenient_f64")]
    pub change: Option<f64>,
}

/// `/api/trading-status` is the one endpoint without an envelope
#[derive(Debug, Clone, Deserialize)]
pub struct TradingStatus {
    pub is_active: bool,
    pub environment_ready: Option<bool>,
    pub trader_ready: Option<bool>,
}

/// Accept JSON numbers and numeric strings alike
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

pub(crate) fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

/// Bot backend API client
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    base_url: String,
}

impl DashboardClient {
    /// Create a client for the configured backend
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| DashboardError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full trade history
    pub async fn get_trade_history(&self) -> Result<Envelope<Vec<RawTrade>>> {
        self.get("/api/trade-history", &[]).await
    }

    /// Wallet balances
    pub async fn get_wallet_balance(&self) -> Result<Envelope<WalletPayload>> {
        self.get("/api/wallet-balance", &[]).await
    }

    /// Ticker for one pair
    pub async fn get_market_data(&self, pair: &str) -> Result<Envelope<MarketPayload>> {
        self.get("/api/market-data", &[("pair", pair)]).await
    }

    /// Whether the bot's trading loop is active
    pub async fn get_trading_status(&self) -> Result<TradingStatus> {
        self.get("/api/trading-status", &[]).await
    }

    pub async fn start_trading(&self) -> Result<Envelope<Value>> {
        self.post_empty("/api/start-trading").await
    }

    pub async fn stop_trading(&self) -> Result<Envelope<Value>> {
        self.post_empty("/api/stop-trading").await
    }

    /// Submit a manual trade (form-encoded)
    pub async fn execute_trade(&self, trade: &ManualTrade) -> Result<Envelope<Value>> {
        let url = self.url("/api/execute-trade");
        tracing::debug!(%url, pair = %trade.pair, side = %trade.side, "POST form");

        let response = self.http.post(&url).form(trade).send().await?;
        Self::handle_response(response).await
    }

    /// Save settings and start the bot
    pub async fn start_bot(&self, settings: &BotSettings) -> Result<Envelope<Value>> {
        let url = self.url("/api/start_bot");
        tracing::debug!(%url, pair = %settings.trading_pair, "POST json");

        let response = self.http.post(&url).json(settings).send().await?;
        Self::handle_response(response).await
    }

    pub async fn stop_bot(&self) -> Result<Envelope<Value>> {
        self.post_empty("/api/stop_bot").await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Perform GET request
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        tracing::trace!(%url, "GET");

        let response = self.http.get(&url).query(query).send().await?;
        Self::handle_response(response).await
    }

    /// Perform POST request without a body
    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Handle API response, checking for errors
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            return Err(DashboardError::Network(format!("HTTP {status}: {error_text}")));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(DashboardError::from)
    }
}
