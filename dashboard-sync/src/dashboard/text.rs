//! Text renderer
//!
//! Writes one full frame per call. Nothing here mutates state; a failed
//! write surfaces as `DashboardError::Render`.

use std::io::Write;

use super::format::{
    NOT_COMPUTED, balance_decimals, format_amount, format_percent, format_rate, format_ratio,
    format_usd,
};
use super::DashboardView;
use crate::error::Result;
use crate::types::Category;

const SPARK_BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const STALE_TAG: &str = " [stale data]";

/// One block character per value, scaled between min and max
pub fn sparkline(values: &[f64]) -> String {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = max - min;

    values
        .iter()
        .map(|v| {
            if span <= f64::EPSILON {
                SPARK_BLOCKS[SPARK_BLOCKS.len() / 2]
            } else {
                let idx = ((v - min) / span * (SPARK_BLOCKS.len() - 1) as f64).round() as usize;
                SPARK_BLOCKS[idx.min(SPARK_BLOCKS.len() - 1)]
            }
        })
        .collect()
}

fn stale_tag(view: &DashboardView, category: Category) -> &'static str {
    if view.is_stale(category) { STALE_TAG } else { "" }
}

pub fn render<W: Write>(view: &DashboardView, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "{}  {}  {}{}",
        view.pair,
        format_usd(view.price),
        format_percent(view.change_percent),
        stale_tag(view, Category::Market)
    )?;

    let values: Vec<f64> = view.chart.iter().map(|p| p.value).collect();
    if values.is_empty() {
        writeln!(out, "chart     (waiting for prices)")?;
    } else {
        let first = view.chart.first().map_or("", |p| p.label.as_str());
        let last = view.chart.last().map_or("", |p| p.label.as_str());
        writeln!(out, "chart     {}  {first}..{last} ({} points)", sparkline(&values), values.len())?;
    }

    let bot = view.bot_state.map_or_else(|| "--".to_string(), |s| s.to_string());
    let control = match view.pending_control {
        Some(action) => format!("{action} pending"),
        None => format!("[{}] enabled", view.enabled_control),
    };
    writeln!(out, "bot       {bot}  {control}{}", stale_tag(view, Category::Status))?;
    writeln!(out, "portfolio {}", format_usd(view.portfolio_value))?;

    writeln!(out)?;
    writeln!(out, "WALLET{}", stale_tag(view, Category::Wallet))?;
    match &view.wallet {
        None => writeln!(out, "  --")?,
        Some(rows) if rows.is_empty() => writeln!(out, "  (no balances)")?,
        Some(rows) => {
            for row in rows {
                let decimals = balance_decimals(&row.asset, &view.quote_asset);
                writeln!(
                    out,
                    "  {:<6} free {:>16}  locked {:>16}",
                    row.asset,
                    format_amount(Some(row.free), decimals),
                    format_amount(Some(row.locked), decimals)
                )?;
            }
        }
    }

    let m = &view.metrics;
    writeln!(out)?;
    writeln!(out, "PERFORMANCE{}", stale_tag(view, Category::TradeHistory))?;
    writeln!(
        out,
        "  trades {}  closed {}  win rate {}  profit factor {}",
        m.total_trades,
        m.closed_positions,
        format_rate(m.win_rate),
        format_ratio(m.profit_factor)
    )?;
    let drawdown = m
        .max_drawdown
        .map_or_else(|| NOT_COMPUTED.to_string(), |d| format_usd(Some(d)));
    let profit = if m.closed_positions > 0 {
        format_usd(Some(m.total_profit))
    } else {
        NOT_COMPUTED.to_string()
    };
    writeln!(out, "  total profit {profit}  max drawdown {drawdown}  sharpe {NOT_COMPUTED}")?;

    writeln!(out)?;
    writeln!(out, "TRADES{}", stale_tag(view, Category::TradeHistory))?;
    if view.trades.is_empty() {
        writeln!(out, "  (none)")?;
    } else {
        writeln!(
            out,
            "  {:<10} {:<9} {:<4} {:>14} {:>12} {:>14} {}",
            "TIME", "PAIR", "SIDE", "PRICE", "QTY", "TOTAL", "STATUS"
        )?;
        for t in &view.trades {
            writeln!(
                out,
                "  {:<10} {:<9} {:<4} {:>14} {:>12} {:>14} {}",
                t.time,
                t.pair,
                t.side,
                format_usd(Some(t.price)),
                t.quantity.map_or_else(|| "--".to_string(), |q| q.to_string()),
                format_usd(Some(t.total)),
                t.status
            )?;
        }
    }

    if !view.notices.is_empty() {
        writeln!(out)?;
        for notice in &view.notices {
            writeln!(out, "[{}] {} (#{})", notice.level.label(), notice.message, notice.id)?;
        }
    }

    out.flush()?;
    Ok(())
}

pub fn render_to_string(view: &DashboardView) -> Result<String> {
    let mut buf = Vec::new();
    render(view, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
