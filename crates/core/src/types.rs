use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A (link, code) pair pulled out of one verification email.
///
/// Construction goes through [`VerificationItem::new`], so an item that exists always has
/// a non-empty link and a six-digit code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VerificationItem {
    link: String,
    code: String,
}

impl VerificationItem {
    pub fn new(link: impl Into<String>, code: impl Into<String>) -> Option<Self> {
        let link = link.into();
        let code = code.into();

        if link.trim().is_empty() || !is_six_digit_code(&code) {
            return None;
        }

        Some(Self { link, code })
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

pub fn is_six_digit_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Unseen,
    Any,
}

/// Delay policy between empty mailbox attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { max: Duration },
}

impl Backoff {
    /// Delay to wait after the given (1-based) attempt came back empty.
    ///
    /// Never shorter than `base`, even when the cap is set below it.
    pub fn delay_after(&self, base: Duration, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed => base,
            Backoff::Exponential { max } => {
                let cap = (*max).max(base);
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(cap).min(cap)
            }
        }
    }
}

/// Governs how the harvester polls the mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxQuery {
    pub sender_filter: String,
    pub read_state: ReadState,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl MailboxQuery {
    /// Total time spent sleeping between attempts when every attempt comes back empty
    pub fn poll_budget(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.backoff.delay_after(self.poll_interval, attempt))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminalState {
    Completed,
    VerificationFailed,
    FillFailed,
    SubmitFailed,
}

impl TerminalState {
    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalState::Completed)
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TerminalState::Completed => "completed",
            TerminalState::VerificationFailed => "verification failed",
            TerminalState::FillFailed => "fill failed",
            TerminalState::SubmitFailed => "submit failed",
        };
        f.write_str(label)
    }
}

/// Outcome of driving one item through the verification flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub item: VerificationItem,
    pub verified: bool,
    pub filled: bool,
    pub terminal_state: TerminalState,
    /// Same link and code as an earlier item in the batch; not submitted again
    pub duplicate: bool,
    pub failure: Option<String>,
    pub transitions: Vec<String>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// Counts for one run, derived purely from the flow results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub found: usize,
    pub completed: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub verification_failed: usize,
    pub fill_failed: usize,
    pub submit_failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[FlowResult]) -> Self {
        let mut summary = RunSummary {
            found: results.len(),
            ..Default::default()
        };

        for result in results {
            if result.duplicate {
                summary.duplicates += 1;
                continue;
            }
            match result.terminal_state {
                TerminalState::Completed => summary.completed += 1,
                TerminalState::VerificationFailed => summary.verification_failed += 1,
                TerminalState::FillFailed => summary.fill_failed += 1,
                TerminalState::SubmitFailed => summary.submit_failed += 1,
            }
        }

        summary.skipped = summary.found - summary.completed;
        summary
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} completed", self.completed, self.found)
    }
}
