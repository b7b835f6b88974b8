use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How a control is looked up on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "{}", s),
            Locator::XPath(s) => write!(f, "xpath {}", s),
        }
    }
}

/// A control located on the current page.
///
/// Only valid until the next navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub locator: Locator,
    pub node_id: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InteractionError {
    #[error("element not found: {0}")]
    NotFound(Locator),

    #[error("timed out after {after:?} waiting for {locator}")]
    TimedOut { locator: Locator, after: Duration },

    #[error("{locator} refused interaction: {reason}")]
    Rejected { locator: Locator, reason: String },

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("browser session lost: {0}")]
    SessionLost(String),
}

pub type Interaction<T = ()> = Result<T, InteractionError>;

/// Failure to obtain a browser session at all
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
}

/// The narrow browser surface the flow driver needs.
///
/// Every call reports its outcome explicitly; nothing here panics or aborts the flow.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Interaction;

    /// Look up a control without waiting
    async fn find(&mut self, locator: &Locator) -> Interaction<Control>;

    /// Wait up to `timeout` for a control to be present
    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Interaction<Control>;

    async fn clear(&mut self, control: &Control) -> Interaction;

    async fn send_keys(&mut self, control: &Control, text: &str) -> Interaction;

    async fn click(&mut self, control: &Control) -> Interaction;

    /// Click dispatched from page script, for controls hidden behind overlays
    async fn script_click(&mut self, control: &Control) -> Interaction;

    async fn select_by_text(&mut self, control: &Control, text: &str) -> Interaction;

    async fn select_by_value(&mut self, control: &Control, value: &str) -> Interaction;

    /// Terminate the session; later calls report `SessionLost`
    async fn quit(&mut self);
}
