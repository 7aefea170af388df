//! Portfolio valuation
//!
//! value = base free balance × price + quote free balance.
//! Price source, in order: explicit latest tick, last chart point.
//! With neither, the value is unavailable rather than guessed.

use crate::series::PriceSeries;
use crate::types::WalletSnapshot;

/// Plain valuation with a known price
pub fn value(base_free: f64, quote_free: f64, price: f64) -> f64 {
    base_free * price + quote_free
}

/// Pick the price to value the portfolio at
pub fn resolve_price(latest_price: Option<f64>, series: &PriceSeries) -> Option<f64> {
    latest_price.or_else(|| series.latest().map(|p| p.value))
}

/// Value a wallet snapshot, `None` when no price is known yet
pub fn portfolio_value(
    wallet: &WalletSnapshot,
    base_asset: &str,
    quote_asset: &str,
    latest_price: Option<f64>,
    series: &PriceSeries,
) -> Option<f64> {
    let price = resolve_price(latest_price, series)?;
    Some(value(wallet.free(base_asset), wallet.free(quote_asset), price))
}
