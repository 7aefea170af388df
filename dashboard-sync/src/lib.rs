//! Dashboard Sync - terminal control panel for a crypto trading bot
//!
//! Keeps a local view of the bot backend in sync by polling its REST API.
//!
//! # Architecture
//! - `Poller` runs one cancellable schedule per data category
//! - `DashboardSync` fetches, normalizes, and applies responses to `AppState`
//! - Per-category sequence numbers discard out-of-order responses
//! - `dashboard` renders a display-ready view to any text sink
//!
//! # Features
//! - Price chart over a bounded FIFO series
//! - Wallet balances and portfolio valuation
//! - Performance metrics derived from trade history
//! - Start/stop control with single in-flight request
//! - Manual trades, bot settings, simulated training progress

// Clippy configuration for dashboard code patterns
#![allow(clippy::similar_names)] // seq/set, base/quote are common names here
#![allow(clippy::cast_precision_loss)] // Float casts OK for display
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::too_many_lines)] // Renderer writes a whole frame
#![allow(clippy::doc_markdown)] // Doc style flexibility
#![allow(clippy::needless_pass_by_value)] // Envelopes are consumed by the normalizer
#![allow(clippy::if_not_else)] // Readability preference
#![allow(clippy::map_unwrap_or)] // Explicit fallback preference

pub mod client;
pub mod config;
pub mod control;
pub mod dashboard;
pub mod error;
pub mod normalize;
pub mod performance;
pub mod poller;
pub mod series;
pub mod settings;
pub mod state;
pub mod sync;
pub mod types;
pub mod valuation;

pub use client::DashboardClient;
pub use config::Config;
pub use control::{BotControlGate, ControlAction};
pub use dashboard::DashboardView;
pub use error::{DashboardError, Result};
pub use poller::{Poller, TaskHandle};
pub use series::PriceSeries;
pub use state::{AppState, Notice, NoticeLevel};
pub use sync::DashboardSync;
pub use types::*;
