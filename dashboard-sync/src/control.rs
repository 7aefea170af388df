//! Start/stop control gate
//!
//! Two states, RUNNING and STOPPED. Exactly one control is enabled,
//! matching the last known state. At most one request may be in
//! flight; a second one is rejected, never queued or double-submitted.

use crate::error::{DashboardError, Result};
use crate::types::BotState;

/// User-triggered bot control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
}

impl ControlAction {
    /// State reached when the request succeeds
    pub fn target(self) -> BotState {
        match self {
            ControlAction::Start => BotState::Running,
            ControlAction::Stop => BotState::Stopped,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BotControlGate {
    state: BotState,
    in_flight: Option<ControlAction>,
}

impl BotControlGate {
    pub fn new(state: BotState) -> Self {
        Self {
            state,
            in_flight: None,
        }
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn in_flight(&self) -> Option<ControlAction> {
        self.in_flight
    }

    /// The one control consistent with the current state
    pub fn enabled_control(&self) -> ControlAction {
        if self.state.is_running() {
            ControlAction::Stop
        } else {
            ControlAction::Start
        }
    }

    /// Whether `action` can be submitted right now
    pub fn can_submit(&self, action: ControlAction) -> bool {
        self.in_flight.is_none() && self.enabled_control() == action
    }

    /// Mark `action` as in flight
    pub fn begin(&mut self, action: ControlAction) -> Result<()> {
        if let Some(pending) = self.in_flight {
            return Err(DashboardError::ControlBusy(pending.name().to_string()));
        }
        if self.enabled_control() != action {
            return Err(DashboardError::InvalidInput(format!(
                "cannot {action} while bot is {}",
                self.state
            )));
        }
        self.in_flight = Some(action);
        Ok(())
    }

    /// Resolve the in-flight request; only success moves the state
    pub fn finish(&mut self, action: ControlAction, succeeded: bool) {
        if self.in_flight != Some(action) {
            tracing::warn!(%action, "finish called for a request that is not in flight");
            return;
        }
        self.in_flight = None;
        if succeeded {
            self.state = action.target();
        }
    }

    /// Drop an in-flight marker without resolving it (request abandoned)
    pub fn abandon(&mut self, action: ControlAction) {
        if self.in_flight == Some(action) {
            self.in_flight = None;
        }
    }

    /// Apply a polled state. Ignored while a request is in flight.
    /// Returns true when the state changed.
    pub fn observe(&mut self, polled: BotState) -> bool {
        if self.in_flight.is_some() || self.state == polled {
            return false;
        }
        self.state = polled;
        true
    }
}
