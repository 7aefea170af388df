//! Bot settings and model training helpers
//!
//! Slider values arrive as percentages and are posted as fractions.
//! The backend has no training endpoint, so training progress comes
//! from a pluggable `ProgressSource`; the only one shipped is
//! `SimulatedProgress`, and callers must present it as simulated.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DashboardError, Result};
use crate::types::BotSettings;

/// Training step counts selectable on the 1..=5 slider
const TRAINING_STEPS: [u64; 5] = [10_000, 50_000, 100_000, 250_000, 500_000];
const DEFAULT_TRAINING_STEPS: u64 = 100_000;

/// Slider percentage to posted fraction (2.5 -> 0.025)
pub fn percent_to_fraction(percent: f64) -> f64 {
    percent / 100.0
}

/// Steps for a slider position; unknown positions use the default
pub fn training_steps(slider: u8) -> u64 {
    match slider {
        1..=5 => TRAINING_STEPS[usize::from(slider - 1)],
        _ => DEFAULT_TRAINING_STEPS,
    }
}

/// Thousands separators: 250000 -> "250,000"
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_frequency(minutes: u32) -> String {
    match minutes {
        1 => "Every minute".to_string(),
        60 => "Every hour".to_string(),
        n => format!("Every {n} minutes"),
    }
}

/// Reject settings the backend would misinterpret
pub fn validate(settings: &BotSettings) -> Result<()> {
    if settings.trading_pair.trim().is_empty() {
        return Err(DashboardError::InvalidInput("trading pair is required".into()));
    }
    if !(settings.risk_level > 0.0 && settings.risk_level <= 1.0) {
        return Err(DashboardError::InvalidInput(format!(
            "risk level must be a fraction in (0, 1], got {}",
            settings.risk_level
        )));
    }
    if let Some(stop_loss) = settings.stop_loss {
        if !(stop_loss > 0.0 && stop_loss < 1.0) {
            return Err(DashboardError::InvalidInput(format!(
                "stop loss must be a fraction in (0, 1), got {stop_loss}"
            )));
        }
    }
    if settings.trading_frequency == Some(0) {
        return Err(DashboardError::InvalidInput("trading frequency must be at least one minute".into()));
    }
    Ok(())
}

/// Training stage shown next to the progress bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Preparing,
    Training,
    Optimizing,
    Complete,
}

impl TrainingPhase {
    pub fn for_percent(percent: f64) -> Self {
        if percent >= 100.0 {
            TrainingPhase::Complete
        } else if percent >= 70.0 {
            TrainingPhase::Optimizing
        } else if percent >= 30.0 {
            TrainingPhase::Training
        } else {
            TrainingPhase::Preparing
        }
    }

    pub fn status_text(self) -> &'static str {
        match self {
            TrainingPhase::Preparing => "Preparing training data...",
            TrainingPhase::Training => "Training in progress...",
            TrainingPhase::Optimizing => "Optimizing model parameters...",
            TrainingPhase::Complete => "Training complete! Model saved.",
        }
    }
}

/// Progress bar state, clamped to 0..=100
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingProgress {
    percent: f64,
    phase: TrainingPhase,
}

impl Default for TrainingProgress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            phase: TrainingPhase::Preparing,
        }
    }
}

impl TrainingProgress {
    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TrainingPhase::Complete
    }

    /// Add `increment` percent; negative increments are ignored
    pub fn advance(&mut self, increment: f64) -> TrainingPhase {
        if self.is_complete() {
            return self.phase;
        }
        let step = if increment.is_finite() { increment.max(0.0) } else { 0.0 };
        self.percent = (self.percent + step).min(100.0);
        self.phase = TrainingPhase::for_percent(self.percent);
        self.phase
    }
}

/// Supplies progress increments, in percent, one per tick
pub trait ProgressSource {
    fn next_increment(&mut self) -> f64;
}

/// Random 0..3% per tick. Not connected to any real training job.
#[derive(Debug)]
pub struct SimulatedProgress {
    rng: StdRng,
    max_step: f64,
}

impl SimulatedProgress {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            max_step: 3.0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_step: 3.0,
        }
    }
}

impl Default for SimulatedProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSource for SimulatedProgress {
    fn next_increment(&mut self) -> f64 {
        self.rng.gen_range(0.0..self.max_step)
    }
}

/// Drive `progress` from `source` every `tick` until complete
pub async fn run_training<S, F>(source: &mut S, tick: Duration, mut on_progress: F) -> TrainingProgress
where
    S: ProgressSource + ?Sized,
    F: FnMut(&TrainingProgress),
{
    let mut progress = TrainingProgress::default();
    let mut ticker = tokio::time::interval(tick);
    ticker.tick().await;

    while !progress.is_complete() {
        ticker.tick().await;
        progress.advance(source.next_increment());
        on_progress(&progress);
    }
    progress
}
