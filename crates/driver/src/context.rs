use chrono::{DateTime, Utc};
use std::time::Instant;

use amoe_core::{FlowResult, TerminalState, VerificationItem};

/// State machine for one verification item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Start,
    CodeEntry,
    Verified,
    Filled,
    Completed,
    VerificationFailed { reason: String },
    FillFailed { reason: String },
    SubmitFailed { reason: String },
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Start => "Start",
            FlowState::CodeEntry => "CodeEntry",
            FlowState::Verified => "Verified",
            FlowState::Filled => "Filled",
            FlowState::Completed => "Completed",
            FlowState::VerificationFailed { .. } => "VerificationFailed",
            FlowState::FillFailed { .. } => "FillFailed",
            FlowState::SubmitFailed { .. } => "SubmitFailed",
        }
    }

    pub fn terminal(&self) -> Option<TerminalState> {
        match self {
            FlowState::Completed => Some(TerminalState::Completed),
            FlowState::VerificationFailed { .. } => Some(TerminalState::VerificationFailed),
            FlowState::FillFailed { .. } => Some(TerminalState::FillFailed),
            FlowState::SubmitFailed { .. } => Some(TerminalState::SubmitFailed),
            _ => None,
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            FlowState::VerificationFailed { reason }
            | FlowState::FillFailed { reason }
            | FlowState::SubmitFailed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Transition between states with timestamp and detail
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: &'static str,
    pub to: &'static str,
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
}

/// Context for one item's trip through the flow
#[derive(Debug)]
pub struct FlowContext {
    pub item: VerificationItem,
    pub state: FlowState,
    pub evidence: Vec<StateTransition>,
    verified: bool,
    filled: bool,
    started_at: Instant,
}

impl FlowContext {
    pub fn new(item: VerificationItem) -> Self {
        Self {
            item,
            state: FlowState::Start,
            evidence: Vec::new(),
            verified: false,
            filled: false,
            started_at: Instant::now(),
        }
    }

    /// Move to a new state. Terminal states are final; later transitions are ignored.
    pub fn transition(&mut self, new_state: FlowState, details: Option<String>) {
        if self.is_terminal() {
            return;
        }

        match new_state {
            FlowState::Verified => self.verified = true,
            FlowState::Filled => self.filled = true,
            _ => {}
        }

        let old_state = std::mem::replace(&mut self.state, new_state);
        self.evidence.push(StateTransition {
            from: old_state.name(),
            to: self.state.name(),
            timestamp: Utc::now(),
            details,
        });
    }

    pub fn is_terminal(&self) -> bool {
        self.state.terminal().is_some()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Names of every state visited, starting with `Start`
    pub fn path(&self) -> Vec<String> {
        std::iter::once(FlowState::Start.name())
            .chain(self.evidence.iter().map(|t| t.to))
            .map(String::from)
            .collect()
    }

    pub fn into_result(self) -> FlowResult {
        // A context that never reached a terminal state was abandoned mid-verification
        let terminal_state = self
            .state
            .terminal()
            .unwrap_or(TerminalState::VerificationFailed);

        FlowResult {
            verified: self.verified,
            filled: self.filled,
            terminal_state,
            duplicate: false,
            failure: self.state.reason().map(String::from),
            transitions: self.path(),
            finished_at: Utc::now(),
            item: self.item,
        }
    }
}
