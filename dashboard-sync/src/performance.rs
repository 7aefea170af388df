//! Performance metrics derived from the trade history
//!
//! Trades are ordered by timestamp and walked pairwise: a SELL that
//! directly follows a BUY closes one position, with
//! profit = (sell price - buy price) × sell quantity.
//!
//! Win rate is profitable closures over closed positions. Nothing is
//! cached between runs; every refresh recomputes from the full list.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime};

use crate::types::{PerformanceMetrics, Trade, TradeSide};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// Sort key for a trade timestamp; unparseable stamps sort after parsed ones
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TimeKey<'a> {
    At(NaiveDateTime),
    Raw(&'a str),
}

fn time_key(timestamp: &str) -> TimeKey<'_> {
    let trimmed = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return TimeKey::At(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map_or(TimeKey::Raw(trimmed), TimeKey::At)
}

fn cmp_quantity(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Total order over trades; equal timestamps put BUY before SELL
fn chronological(a: &(TimeKey<'_>, &Trade), b: &(TimeKey<'_>, &Trade)) -> Ordering {
    let (ka, ta) = a;
    let (kb, tb) = b;
    ka.cmp(kb)
        .then(ta.side.cmp(&tb.side))
        .then(ta.price.total_cmp(&tb.price))
        .then(cmp_quantity(ta.quantity, tb.quantity))
        .then_with(|| ta.pair.cmp(&tb.pair))
        .then(ta.total.total_cmp(&tb.total))
        .then_with(|| ta.status.cmp(&tb.status))
}

/// Trades in timestamp order
pub fn sorted(trades: &[Trade]) -> Vec<&Trade> {
    let mut keyed: Vec<(TimeKey<'_>, &Trade)> =
        trades.iter().map(|t| (time_key(&t.timestamp), t)).collect();
    keyed.sort_by(chronological);
    keyed.into_iter().map(|(_, t)| t).collect()
}

/// Profit of every BUY→SELL closure, in timestamp order
pub fn closure_profits(trades: &[Trade]) -> Vec<f64> {
    sorted(trades)
        .windows(2)
        .filter_map(|pair| {
            let (buy, sell) = (pair[0], pair[1]);
            if buy.side != TradeSide::Buy || sell.side != TradeSide::Sell {
                return None;
            }
            sell.quantity.map(|qty| (sell.price - buy.price) * qty)
        })
        .collect()
}

/// Compute metrics for the current trade list
pub fn compute(trades: &[Trade]) -> PerformanceMetrics {
    let profits = closure_profits(trades);
    let closed = profits.len();

    let mut metrics = PerformanceMetrics {
        total_trades: trades.len(),
        closed_positions: closed,
        ..PerformanceMetrics::default()
    };
    if closed == 0 {
        return metrics;
    }

    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;
    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;

    for &profit in &profits {
        if profit > 0.0 {
            metrics.profitable_closures += 1;
            gross_profit += profit;
        } else {
            gross_loss += -profit;
        }
        cumulative += profit;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.max(peak - cumulative);
    }

    metrics.total_profit = cumulative;
    metrics.win_rate = Some(metrics.profitable_closures as f64 / closed as f64 * 100.0);
    metrics.profit_factor = (gross_loss > 0.0).then(|| gross_profit / gross_loss);
    metrics.max_drawdown = Some(max_drawdown);
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(ts: &str, side: TradeSide, price: f64, qty: f64) -> Trade {
        Trade {
            timestamp: ts.to_string(),
            pair: "BTC/USD".to_string(),
            side,
            price,
            quantity: Some(qty),
            total: price * qty,
            status: "FILLED".to_string(),
        }
    }

    #[test]
    fn test_single_profitable_closure() {
        let trades = vec![
            trade("2024-01-01 10:00:00", TradeSide::Buy, 100.0, 1.0),
            trade("2024-01-01 10:05:00", TradeSide::Sell, 110.0, 1.0),
        ];

        let m = compute(&trades);
        assert_eq!(m.total_trades, 2);
        assert_eq!(m.closed_positions, 1);
        assert_eq!(m.profitable_closures, 1);
        assert_eq!(m.win_rate, Some(100.0));
        assert!((m.total_profit - 10.0).abs() < 1e-9);
        // No losing closure: profit factor is undefined
        assert_eq!(m.profit_factor, None);
        assert_eq!(m.max_drawdown, Some(0.0));
    }

    #[test]
    fn test_order_invariance() {
        let trades = vec![
            trade("2024-01-01 10:00:00", TradeSide::Buy, 100.0, 1.0),
            trade("2024-01-01 10:05:00", TradeSide::Sell, 110.0, 1.0),
            trade("2024-01-01 11:00:00", TradeSide::Buy, 120.0, 2.0),
            trade("2024-01-01 11:00:00", TradeSide::Sell, 115.0, 2.0),
            trade("2024-01-01 12:00:00", TradeSide::Sell, 130.0, 1.0),
            trade("not a date", TradeSide::Buy, 90.0, 1.0),
        ];
        let expected = compute(&trades);

        let mut reversed = trades.clone();
        reversed.reverse();
        assert_eq!(compute(&reversed), expected);

        for shift in 1..trades.len() {
            let mut rotated = trades.clone();
            rotated.rotate_left(shift);
            assert_eq!(compute(&rotated), expected);
        }
    }

    #[test]
    fn test_equal_timestamps_buy_first() {
        let trades = vec![
            trade("2024-01-01 10:00:00", TradeSide::Sell, 110.0, 1.0),
            trade("2024-01-01 10:00:00", TradeSide::Buy, 100.0, 1.0),
        ];
        assert_eq!(compute(&trades).closed_positions, 1);
    }

    #[test]
    fn test_mixed_closures() {
        let trades = vec![
            trade("2024-01-01 10:00:00", TradeSide::Buy, 100.0, 1.0),
            trade("2024-01-01 10:01:00", TradeSide::Sell, 110.0, 1.0), // +10
            trade("2024-01-01 10:02:00", TradeSide::Buy, 120.0, 2.0),
            trade("2024-01-01 10:03:00", TradeSide::Sell, 115.0, 2.0), // -10
            trade("2024-01-01 10:04:00", TradeSide::Sell, 130.0, 1.0), // no preceding BUY
            trade("2024-01-01 10:05:00", TradeSide::Buy, 100.0, 1.0),
            trade("2024-01-01 10:06:00", TradeSide::Sell, 130.0, 1.0), // +30
        ];

        let m = compute(&trades);
        assert_eq!(m.total_trades, 7);
        assert_eq!(m.closed_positions, 3);
        assert_eq!(m.profitable_closures, 2);
        assert!((m.win_rate.unwrap() - 200.0 / 3.0).abs() < 1e-9);
        assert!((m.total_profit - 30.0).abs() < 1e-9);
        assert!((m.profit_factor.unwrap() - 4.0).abs() < 1e-9);
        assert!((m.max_drawdown.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_closures() {
        let trades = vec![
            trade("2024-01-01 10:00:00", TradeSide::Sell, 100.0, 1.0),
            trade("2024-01-01 10:05:00", TradeSide::Buy, 110.0, 1.0),
        ];
        let m = compute(&trades);
        assert_eq!(m.total_trades, 2);
        assert_eq!(m.closed_positions, 0);
        assert_eq!(m.win_rate, None);
        assert_eq!(m.profit_factor, None);
        assert_eq!(m.max_drawdown, None);
        assert_eq!(compute(&[]), PerformanceMetrics::default());
    }

    #[test]
    fn test_sell_without_quantity_does_not_close() {
        let mut sell = trade("2024-01-01 10:05:00", TradeSide::Sell, 110.0, 1.0);
        sell.quantity = None;
        let trades = vec![trade("2024-01-01 10:00:00", TradeSide::Buy, 100.0, 1.0), sell];
        assert_eq!(compute(&trades).closed_positions, 0);
    }

    #[test]
    fn test_rfc3339_and_plain_timestamps_interleave() {
        let trades = vec![
            trade("2024-01-01T10:05:00Z", TradeSide::Sell, 110.0, 1.0),
            trade("2024-01-01 10:00:00", TradeSide::Buy, 100.0, 1.0),
        ];
        assert_eq!(compute(&trades).profitable_closures, 1);
    }
}
