//! Configuration management for the dashboard client

use std::time::Duration;

use crate::error::{DashboardError, Result};

/// Dashboard client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (production, staging, development)
    pub environment: String,

    /// Log level used when RUST_LOG is not set
    pub log_level: String,

    /// Backend base URL, without trailing slash
    pub api_base: String,

    /// Pair shown on the price card and chart
    pub trading_pair: String,
    pub base_asset: String,
    pub quote_asset: String,

    /// Polling intervals per data category
    pub market_interval_ms: u64,
    pub trade_history_interval_ms: u64,
    pub wallet_interval_ms: u64,
    pub status_interval_ms: u64,

    /// How often the terminal view is redrawn
    pub render_interval_ms: u64,

    pub http_timeout_ms: u64,

    /// Consecutive failures before a category is flagged stale
    pub stale_after_failures: u32,

    pub price_series_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            log_level: "info".to_string(),
            api_base: "http://127.0.0.1:5000".to_string(),
            trading_pair: "BTC/USD".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USD".to_string(),
            market_interval_ms: 5_000,
            trade_history_interval_ms: 10_000,
            wallet_interval_ms: 15_000,
            status_interval_ms: 10_000,
            render_interval_ms: 1_000,
            http_timeout_ms: 10_000,
            stale_after_failures: 3,
            price_series_capacity: 20,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let config = Self {
            environment: string("ENVIRONMENT", defaults.environment),
            log_level: string("LOG_LEVEL", defaults.log_level),
            api_base: normalize_base(&string("DASHBOARD_API_BASE", defaults.api_base)),
            trading_pair: string("TRADING_PAIR", defaults.trading_pair),
            base_asset: string("BASE_ASSET", defaults.base_asset).to_uppercase(),
            quote_asset: string("QUOTE_ASSET", defaults.quote_asset).to_uppercase(),
            market_interval_ms: parse_var(&lookup, "MARKET_INTERVAL_MS", defaults.market_interval_ms)?,
            trade_history_interval_ms: parse_var(
                &lookup,
                "TRADE_HISTORY_INTERVAL_MS",
                defaults.trade_history_interval_ms,
            )?,
            wallet_interval_ms: parse_var(&lookup, "WALLET_INTERVAL_MS", defaults.wallet_interval_ms)?,
            status_interval_ms: parse_var(&lookup, "STATUS_INTERVAL_MS", defaults.status_interval_ms)?,
            render_interval_ms: parse_var(&lookup, "RENDER_INTERVAL_MS", defaults.render_interval_ms)?,
            http_timeout_ms: parse_var(&lookup, "HTTP_TIMEOUT_MS", defaults.http_timeout_ms)?,
            stale_after_failures: parse_var(
                &lookup,
                "STALE_AFTER_FAILURES",
                defaults.stale_after_failures,
            )?,
            price_series_capacity: parse_var(
                &lookup,
                "PRICE_SERIES_CAPACITY",
                defaults.price_series_capacity,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(DashboardError::Config(format!(
                "DASHBOARD_API_BASE must be an http(s) URL, got {}",
                self.api_base
            )));
        }
        if self.trading_pair.trim().is_empty() {
            return Err(DashboardError::Config("trading_pair must not be empty".into()));
        }
        let intervals = [
            ("market_interval_ms", self.market_interval_ms),
            ("trade_history_interval_ms", self.trade_history_interval_ms),
            ("wallet_interval_ms", self.wallet_interval_ms),
            ("status_interval_ms", self.status_interval_ms),
            ("render_interval_ms", self.render_interval_ms),
            ("http_timeout_ms", self.http_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(DashboardError::Config(format!("{name} must be positive")));
            }
        }
        if self.stale_after_failures == 0 {
            return Err(DashboardError::Config("stale_after_failures must be at least 1".into()));
        }
        if self.price_series_capacity == 0 {
            return Err(DashboardError::Config("price_series_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Replace the backend URL, trimming trailing slashes
    pub fn set_api_base(&mut self, api_base: &str) -> Result<()> {
        let previous = std::mem::replace(&mut self.api_base, normalize_base(api_base));
        if let Err(e) = self.validate() {
            self.api_base = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DashboardError::Config(format!("{key} has invalid value {raw:?}"))),
        None => Ok(default),
    }
}
