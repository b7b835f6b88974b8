//! Scripted in-memory browser keyed by page URL

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::layout::FormLayout;
use crate::session::{BrowserSession, Control, Interaction, InteractionError, Locator};

/// Controls present on one page and how they misbehave
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    present: HashSet<Locator>,
    rejecting: HashSet<Locator>,
    lose_session_at: Option<Locator>,
}

impl FakePage {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every control of the layout, all well behaved
    pub fn complete(layout: &FormLayout) -> Self {
        let present = [
            &layout.code_input,
            &layout.code_submit,
            &layout.first_name,
            &layout.last_name,
            &layout.suffix,
            &layout.street_address,
            &layout.apartment,
            &layout.city,
            &layout.state,
            &layout.zip_code,
            &layout.validate_address,
            &layout.confirm_address,
            &layout.final_submit,
        ]
        .into_iter()
        .cloned()
        .collect();

        Self {
            present,
            ..Self::default()
        }
    }

    pub fn without(mut self, locator: &Locator) -> Self {
        self.present.remove(locator);
        self
    }

    /// Present, but every operation on it fails
    pub fn rejecting(mut self, locator: &Locator) -> Self {
        self.rejecting.insert(locator.clone());
        self
    }

    /// The browser dies as soon as this control is looked up
    pub fn losing_session_at(mut self, locator: &Locator) -> Self {
        self.lose_session_at = Some(locator.clone());
        self
    }
}

#[derive(Debug, Default)]
struct State {
    pages: HashMap<String, FakePage>,
    current: Option<String>,
    actions: Vec<String>,
    touched: Vec<Locator>,
    navigations: usize,
    next_node: u32,
    lost: bool,
    quit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<State>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, page: FakePage) -> Self {
        self.lock().pages.insert(url.to_string(), page);
        self
    }

    /// Every interaction in order, e.g. `send_keys #first_name Ada`
    pub fn actions(&self) -> Vec<String> {
        self.lock().actions.clone()
    }

    /// Whether the control was looked up or operated on at all
    pub fn touched(&self, locator: &Locator) -> bool {
        self.lock().touched.contains(locator)
    }

    pub fn navigations(&self) -> usize {
        self.lock().navigations
    }

    pub fn was_quit(&self) -> bool {
        self.lock().quit
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn locate(&self, op: &str, locator: &Locator, missing: InteractionError) -> Interaction<Control> {
        let mut state = self.lock();
        state.alive()?;
        state.actions.push(format!("{} {}", op, locator));
        state.touched.push(locator.clone());

        let page = state.page()?.clone();
        if page.lose_session_at.as_ref() == Some(locator) {
            state.lost = true;
            return Err(InteractionError::SessionLost("chrome crashed".to_string()));
        }
        if !page.present.contains(locator) {
            return Err(missing);
        }

        state.next_node += 1;
        Ok(Control {
            locator: locator.clone(),
            node_id: state.next_node,
        })
    }

    fn operate(&self, op: &str, control: &Control, text: Option<&str>) -> Interaction {
        let mut state = self.lock();
        state.alive()?;

        let entry = match text {
            Some(text) => format!("{} {} {}", op, control.locator, text),
            None => format!("{} {}", op, control.locator),
        };
        state.actions.push(entry);
        state.touched.push(control.locator.clone());

        if state.page()?.rejecting.contains(&control.locator) {
            return Err(InteractionError::Rejected {
                locator: control.locator.clone(),
                reason: format!("{} not allowed", op),
            });
        }
        Ok(())
    }
}

impl State {
    fn alive(&self) -> Interaction {
        if self.lost || self.quit {
            return Err(InteractionError::SessionLost("browser is gone".to_string()));
        }
        Ok(())
    }

    fn page(&self) -> Interaction<&FakePage> {
        self.current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .ok_or_else(|| InteractionError::SessionLost("no page loaded".to_string()))
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Interaction {
        let mut state = self.lock();
        state.alive()?;
        state.actions.push(format!("navigate {}", url));
        state.navigations += 1;

        if !state.pages.contains_key(url) {
            state.current = None;
            return Err(InteractionError::NavigationFailed {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        state.current = Some(url.to_string());
        Ok(())
    }

    async fn find(&mut self, locator: &Locator) -> Interaction<Control> {
        self.locate("find", locator, InteractionError::NotFound(locator.clone()))
    }

    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Interaction<Control> {
        self.locate(
            "wait_for",
            locator,
            InteractionError::TimedOut {
                locator: locator.clone(),
                after: timeout,
            },
        )
    }

    async fn clear(&mut self, control: &Control) -> Interaction {
        self.operate("clear", control, None)
    }

    async fn send_keys(&mut self, control: &Control, text: &str) -> Interaction {
        self.operate("send_keys", control, Some(text))
    }

    async fn click(&mut self, control: &Control) -> Interaction {
        self.operate("click", control, None)
    }

    async fn script_click(&mut self, control: &Control) -> Interaction {
        self.operate("script_click", control, None)
    }

    async fn select_by_text(&mut self, control: &Control, text: &str) -> Interaction {
        self.operate("select_by_text", control, Some(text))
    }

    async fn select_by_value(&mut self, control: &Control, value: &str) -> Interaction {
        self.operate("select_by_value", control, Some(value))
    }

    async fn quit(&mut self) {
        self.lock().quit = true;
    }
}
