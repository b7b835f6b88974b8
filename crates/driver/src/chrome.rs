use async_trait::async_trait;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use amoe_core::config::BrowserConfig;

use crate::session::{BrowserError, BrowserSession, Control, Interaction, InteractionError, Locator};

const CLEAR_JS: &str = r#"function() {
    this.value = '';
    this.dispatchEvent(new Event('input', { bubbles: true }));
    return true;
}"#;

const SCRIPT_CLICK_JS: &str = r#"function() {
    this.click();
    return true;
}"#;

const SELECT_BY_TEXT_JS: &str = r#"function(text) {
    const opt = Array.from(this.options || []).find(o => o.text.trim() === text);
    if (!opt) { return false; }
    this.value = opt.value;
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

const SELECT_BY_VALUE_JS: &str = r#"function(value) {
    const opt = Array.from(this.options || []).find(o => o.value === value);
    if (!opt) { return false; }
    this.value = opt.value;
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

/// One Chrome process with a single tab, shared by every item of a run.
///
/// Chrome is terminated on `quit` or when the session is dropped.
pub struct HeadlessChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

/// Launch options for one session.
///
/// `idle_timeout` bounds how long Chrome may go without a DevTools message before the
/// connection is dropped; it must outlast every quiet period of the run, mailbox polling
/// included.
pub fn launch_options(
    config: &BrowserConfig,
    idle_timeout: Duration,
) -> Result<LaunchOptions<'static>, BrowserError> {
    // Required for running in Docker containers
    let extra_args: Vec<&'static OsStr> = vec![
        OsStr::new("--no-sandbox"),
        OsStr::new("--disable-dev-shm-usage"),
    ];

    let mut builder = headless_chrome::LaunchOptionsBuilder::default();
    builder
        .headless(config.headless)
        .window_size(Some((config.window_width, config.window_height)))
        .idle_browser_timeout(idle_timeout)
        .args(extra_args);

    // CHROME_PATH wins over the config file (Docker/custom installs)
    let chrome_path = std::env::var("CHROME_PATH").ok().or_else(|| config.chrome_path.clone());
    if let Some(path) = chrome_path {
        builder.path(Some(std::path::PathBuf::from(path)));
    }

    builder.build().map_err(|e| BrowserError::Launch(e.to_string()))
}

impl HeadlessChromeSession {
    pub fn launch(config: &BrowserConfig, idle_timeout: Duration) -> Result<Self, BrowserError> {
        let launch_options = launch_options(config, idle_timeout)?;

        let browser = Browser::new(launch_options).map_err(|e| BrowserError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        info!(
            "browser ready (headless={}, {}x{}, idle timeout {:?})",
            config.headless, config.window_width, config.window_height, idle_timeout
        );

        Ok(Self {
            browser: Some(browser),
            tab,
        })
    }

    fn ensure_open(&self) -> Interaction {
        if self.browser.is_none() {
            return Err(InteractionError::SessionLost("browser already closed".to_string()));
        }
        Ok(())
    }

    fn element(&self, control: &Control) -> Interaction<Element<'_>> {
        self.ensure_open()?;
        Element::new(&self.tab, control.node_id)
            .map_err(|e| classify(e, |_| InteractionError::NotFound(control.locator.clone())))
    }

    fn call_bool(&self, control: &Control, js: &str, args: Vec<serde_json::Value>) -> Interaction {
        let element = self.element(control)?;
        let result = element.call_js_fn(js, args, false).map_err(|e| {
            classify(e, |reason| InteractionError::Rejected {
                locator: control.locator.clone(),
                reason,
            })
        })?;

        match result.value {
            Some(serde_json::Value::Bool(true)) => Ok(()),
            other => Err(InteractionError::Rejected {
                locator: control.locator.clone(),
                reason: format!("script returned {:?}", other),
            }),
        }
    }
}

/// Map a driver error, recognizing a dead browser connection
fn classify<E, F>(err: E, otherwise: F) -> InteractionError
where
    E: Display,
    F: FnOnce(String) -> InteractionError,
{
    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("connection is closed") || lower.contains("channel closed") {
        InteractionError::SessionLost(text)
    } else {
        otherwise(text)
    }
}

fn control_from(locator: &Locator, element: &Element<'_>) -> Control {
    Control {
        locator: locator.clone(),
        node_id: element.node_id,
    }
}

#[async_trait]
impl BrowserSession for HeadlessChromeSession {
    async fn navigate(&mut self, url: &str) -> Interaction {
        self.ensure_open()?;
        info!("🌐 navigating to {}", url);

        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| {
                classify(e, |reason| InteractionError::NavigationFailed {
                    url: url.to_string(),
                    reason,
                })
            })?;

        Ok(())
    }

    async fn find(&mut self, locator: &Locator) -> Interaction<Control> {
        self.ensure_open()?;

        let found = match locator {
            Locator::Css(selector) => self.tab.find_element(selector),
            Locator::XPath(expression) => self.tab.find_element_by_xpath(expression),
        };

        found
            .map(|element| control_from(locator, &element))
            .map_err(|e| classify(e, |_| InteractionError::NotFound(locator.clone())))
    }

    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Interaction<Control> {
        self.ensure_open()?;
        debug!("waiting up to {:?} for {}", timeout, locator);

        let found = match locator {
            Locator::Css(selector) => self.tab.wait_for_element_with_custom_timeout(selector, timeout),
            Locator::XPath(expression) => {
                self.tab.wait_for_xpath_with_custom_timeout(expression, timeout)
            }
        };

        found
            .map(|element| control_from(locator, &element))
            .map_err(|e| {
                classify(e, |_| InteractionError::TimedOut {
                    locator: locator.clone(),
                    after: timeout,
                })
            })
    }

    async fn clear(&mut self, control: &Control) -> Interaction {
        self.call_bool(control, CLEAR_JS, Vec::new())
    }

    async fn send_keys(&mut self, control: &Control, text: &str) -> Interaction {
        let element = self.element(control)?;
        element.type_into(text).map_err(|e| {
            classify(e, |reason| InteractionError::Rejected {
                locator: control.locator.clone(),
                reason,
            })
        })?;
        Ok(())
    }

    async fn click(&mut self, control: &Control) -> Interaction {
        let element = self.element(control)?;
        element.click().map_err(|e| {
            classify(e, |reason| InteractionError::Rejected {
                locator: control.locator.clone(),
                reason,
            })
        })?;
        Ok(())
    }

    async fn script_click(&mut self, control: &Control) -> Interaction {
        self.call_bool(control, SCRIPT_CLICK_JS, Vec::new())
    }

    async fn select_by_text(&mut self, control: &Control, text: &str) -> Interaction {
        self.call_bool(control, SELECT_BY_TEXT_JS, vec![serde_json::json!(text)])
    }

    async fn select_by_value(&mut self, control: &Control, value: &str) -> Interaction {
        self.call_bool(control, SELECT_BY_VALUE_JS, vec![serde_json::json!(value)])
    }

    async fn quit(&mut self) {
        if self.browser.take().is_some() {
            info!("browser closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BrowserConfig {
        BrowserConfig {
            headless: true,
            window_width: 1280,
            window_height: 800,
            chrome_path: None,
            element_timeout_seconds: 15,
        }
    }

    #[test]
    fn test_launch_options_keep_browser_alive_through_polling() {
        let options = launch_options(&config(), Duration::from_secs(900)).unwrap();

        assert_eq!(options.idle_browser_timeout, Duration::from_secs(900));
        assert!(options.headless);
        assert_eq!(options.window_size, Some((1280, 800)));
        assert!(options.args.contains(&OsStr::new("--no-sandbox")));
    }
}
