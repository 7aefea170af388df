//! Envelope validation and field defaults
//!
//! Turns raw backend payloads into the display model. Every function
//! either yields a complete value or an error; callers keep their
//! previous state on error.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};

use crate::client::{Envelope, MarketPayload, RawTrade, TradingStatus, WalletPayload};
use crate::error::{DashboardError, Result};
use crate::types::{AssetBalance, BotState, MarketTick, Trade, TradeSide, WalletSnapshot};

const DEFAULT_TRADE_STATUS: &str = "FILLED";

/// Validate the trade-history envelope and normalize each row
///
/// Rows without a recognizable side or price are dropped.
pub fn trades(envelope: Envelope<Vec<RawTrade>>, default_pair: &str) -> Result<Vec<Trade>> {
    let rows = envelope.into_data()?;
    let received = rows.len();

    let trades: Vec<Trade> = rows
        .into_iter()
        .filter_map(|raw| trade(raw, default_pair))
        .collect();

    if trades.len() < received {
        tracing::debug!(
            dropped = received - trades.len(),
            kept = trades.len(),
            "dropped malformed trade rows"
        );
    }
    Ok(trades)
}

/// Normalize one trade row
pub fn trade(raw: RawTrade, default_pair: &str) -> Option<Trade> {
    let side = match raw.side.as_deref().map(str::parse::<TradeSide>) {
        Some(Ok(side)) => side,
        _ => return None,
    };
    let price = raw.price?;
    let total = raw
        .total
        .or_else(|| raw.quantity.map(|q| q * price))
        .unwrap_or(0.0);

    Some(Trade {
        timestamp: raw.timestamp.unwrap_or_default(),
        pair: raw.pair.unwrap_or_else(|| default_pair.to_string()),
        side,
        price,
        quantity: raw.quantity,
        total,
        status: raw
            .status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TRADE_STATUS.to_string()),
    })
}

/// Validate the wallet envelope; `Wallet` wins over `SpotWallet`
///
/// Asset keys are uppercased. Keys differing only in case are summed.
pub fn wallet(envelope: Envelope<WalletPayload>) -> Result<WalletSnapshot> {
    let payload = envelope.into_data()?;
    let raw = payload.wallet.or(payload.spot_wallet).unwrap_or_default();

    let mut balances: BTreeMap<String, AssetBalance> = BTreeMap::new();
    for (asset, balance) in raw {
        let key = asset.to_uppercase();
        let free = balance.free.unwrap_or(0.0);
        let locked = balance.lock.unwrap_or(0.0);
        match balances.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(AssetBalance { free, locked });
            }
            Entry::Occupied(mut slot) => {
                tracing::debug!(asset = %asset, merged_into = %slot.key(), "summing case-variant wallet keys");
                let existing = slot.get_mut();
                existing.free += free;
                existing.locked += locked;
            }
        }
    }

    Ok(WalletSnapshot { balances })
}

/// Validate the market envelope and pick the ticker for `pair`
pub fn market(
    envelope: Envelope<MarketPayload>,
    pair: &str,
    received_at: DateTime<Utc>,
) -> Result<MarketTick> {
    let payload = envelope.into_data()?;
    let ticker = payload
        .data
        .get(pair)
        .ok_or_else(|| DashboardError::Envelope(format!("no ticker for {pair}")))?;
    let last_price = ticker
        .last_price
        .ok_or_else(|| DashboardError::Envelope(format!("ticker for {pair} has no LastPrice")))?;

    Ok(MarketTick {
        pair: pair.to_string(),
        last_price,
        change: ticker.change.unwrap_or(0.0),
        received_at,
    })
}

pub fn status(status: &TradingStatus) -> BotState {
    BotState::from_active(status.is_active)
}
