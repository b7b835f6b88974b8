use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

use amoe_core::config::{Applicant, BrowserConfig, FlowConfig};
use amoe_core::{FlowResult, VerificationItem};

use crate::context::{FlowContext, FlowState};
use crate::layout::FormLayout;
use crate::session::{BrowserSession, Interaction, InteractionError, Locator};

/// Wait budgets and settle pauses used while driving the flow
#[derive(Debug, Clone)]
pub struct FlowTimings {
    pub element_timeout: Duration,
    /// After navigation and after each code-entry step
    pub step_settle: Duration,
    /// Before the address form is touched
    pub form_settle: Duration,
    /// After the suffix dropdown
    pub field_settle: Duration,
    /// After each trailing trigger
    pub trigger_settle: Duration,
}

impl FlowTimings {
    pub fn from_config(browser: &BrowserConfig, flow: &FlowConfig) -> Self {
        Self {
            element_timeout: Duration::from_secs(browser.element_timeout_seconds),
            step_settle: Duration::from_millis(flow.step_settle_ms),
            form_settle: Duration::from_millis(flow.form_settle_ms),
            field_settle: Duration::from_millis(flow.field_settle_ms),
            trigger_settle: Duration::from_millis(flow.trigger_settle_ms),
        }
    }

    /// No pauses at all
    pub fn immediate(element_timeout: Duration) -> Self {
        Self {
            element_timeout,
            step_settle: Duration::ZERO,
            form_settle: Duration::ZERO,
            field_settle: Duration::ZERO,
            trigger_settle: Duration::ZERO,
        }
    }
}

async fn settle(pause: Duration) {
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }
}

/// Drives verification items through one shared browser session, one at a time
pub struct FlowDriver<S: BrowserSession> {
    session: S,
    applicant: Applicant,
    layout: FormLayout,
    timings: FlowTimings,
    seen: HashMap<VerificationItem, FlowResult>,
}

impl<S: BrowserSession> FlowDriver<S> {
    pub fn new(session: S, applicant: Applicant, layout: FormLayout, timings: FlowTimings) -> Self {
        Self {
            session,
            applicant,
            layout,
            timings,
            seen: HashMap::new(),
        }
    }

    /// Process every item in order. One result per item; a failing item never stops the batch.
    pub async fn run_batch(&mut self, items: &[VerificationItem]) -> Vec<FlowResult> {
        let total = items.len();
        let mut results = Vec::with_capacity(total);

        for (index, item) in items.iter().enumerate() {
            info!("📧 Processing verification {}/{}", index + 1, total);

            let result = match self.seen.get(item) {
                Some(earlier) => {
                    info!("↩ Same link and code as an earlier item, not submitting again");
                    let mut repeat = earlier.clone();
                    repeat.duplicate = true;
                    repeat.finished_at = chrono::Utc::now();
                    repeat
                }
                None => {
                    let result = self.process(item.clone()).await;
                    self.seen.insert(item.clone(), result.clone());
                    result
                }
            };

            if result.terminal_state.is_completed() {
                info!("✅ Verification {}/{} completed", index + 1, total);
            } else {
                warn!(
                    "❌ Verification {}/{} ended in {}: {}",
                    index + 1,
                    total,
                    result.terminal_state,
                    result.failure.as_deref().unwrap_or("unknown")
                );
            }

            results.push(result);
        }

        results
    }

    /// Drive a single item from navigation to a terminal state
    pub async fn process(&mut self, item: VerificationItem) -> FlowResult {
        let mut ctx = FlowContext::new(item);

        self.verify(&mut ctx).await;
        if !ctx.is_terminal() {
            self.fill(&mut ctx).await;
        }
        if !ctx.is_terminal() {
            self.submit(&mut ctx).await;
        }

        info!(
            "flow finished in {:.1}s: {}",
            ctx.duration().as_secs_f64(),
            ctx.path().join(" -> ")
        );
        ctx.into_result()
    }

    /// Terminate the browser session
    pub async fn shutdown(mut self) {
        self.session.quit().await;
    }

    async fn verify(&mut self, ctx: &mut FlowContext) {
        let link = ctx.item.link().to_string();
        let code = ctx.item.code().to_string();

        info!("🌐 Opening verification link...");
        if let Err(e) = self.session.navigate(&link).await {
            error!("✗ Could not open verification link: {}", e);
            ctx.transition(
                FlowState::VerificationFailed {
                    reason: e.to_string(),
                },
                None,
            );
            return;
        }
        ctx.transition(FlowState::CodeEntry, Some(link));
        settle(self.timings.step_settle).await;

        match self.enter_code(&code).await {
            Ok(()) => ctx.transition(FlowState::Verified, Some("code accepted".to_string())),
            Err(e) => {
                error!("✗ Verification failed: {}", e);
                ctx.transition(
                    FlowState::VerificationFailed {
                        reason: e.to_string(),
                    },
                    None,
                );
            }
        }
    }

    async fn enter_code(&mut self, code: &str) -> Interaction {
        let input = self.layout.code_input.clone();
        let control = self.session.wait_for(&input, self.timings.element_timeout).await?;
        self.session.clear(&control).await?;
        self.session.send_keys(&control, code).await?;
        info!("✓ Entered OTP code: {}", code);

        settle(self.timings.step_settle).await;

        let submit = self.layout.code_submit.clone();
        let button = self.session.find(&submit).await?;
        self.session.click(&button).await?;
        info!("✓ Clicked verification button");

        settle(self.timings.step_settle).await;
        Ok(())
    }

    async fn fill(&mut self, ctx: &mut FlowContext) {
        settle(self.timings.form_settle).await;

        match self.fill_fields().await {
            Ok(()) => ctx.transition(FlowState::Filled, None),
            Err(e) => {
                error!("✗ Error while filling in details: {}", e);
                ctx.transition(
                    FlowState::FillFailed {
                        reason: e.to_string(),
                    },
                    None,
                );
            }
        }
    }

    async fn fill_fields(&mut self) -> Interaction {
        let a = self.applicant.clone();
        let layout = self.layout.clone();

        // The first field doubles as the "page is ready" signal
        let first = self
            .session
            .wait_for(&layout.first_name, self.timings.element_timeout)
            .await?;
        self.session.clear(&first).await?;
        self.session.send_keys(&first, &a.first_name).await?;
        info!("✓ First Name: {}", a.first_name);

        self.type_into(&layout.last_name, &a.last_name).await?;
        info!("✓ Last Name: {}", a.last_name);

        if !a.suffix.is_empty() {
            match self.choose_by_text(&layout.suffix, &a.suffix).await {
                Ok(()) => info!("✓ Suffix: {}", a.suffix),
                Err(e @ InteractionError::SessionLost(_)) => return Err(e),
                Err(e) => warn!("⚠ Suffix: {}", e),
            }
        }
        settle(self.timings.field_settle).await;

        self.type_into(&layout.street_address, &a.street_address).await?;
        info!("✓ Street Address: {}", a.street_address);

        if !a.apartment.is_empty() {
            self.type_into(&layout.apartment, &a.apartment).await?;
            info!("✓ Apartment: {}", a.apartment);
        }

        self.type_into(&layout.city, &a.city).await?;
        info!("✓ City: {}", a.city);

        let state = self.session.find(&layout.state).await?;
        self.session.select_by_value(&state, &a.state).await?;
        info!("✓ State: {}", a.state);

        self.type_into(&layout.zip_code, &a.zip_code).await?;
        info!("✓ Zip Code: {}", a.zip_code);

        settle(self.timings.step_settle).await;
        Ok(())
    }

    async fn type_into(&mut self, locator: &Locator, text: &str) -> Interaction {
        let control = self.session.find(locator).await?;
        self.session.clear(&control).await?;
        self.session.send_keys(&control, text).await
    }

    async fn choose_by_text(&mut self, locator: &Locator, text: &str) -> Interaction {
        let control = self.session.find(locator).await?;
        self.session.select_by_text(&control, text).await
    }

    async fn submit(&mut self, ctx: &mut FlowContext) {
        let layout = self.layout.clone();
        let triggers = [
            (Trigger::Script, &layout.validate_address, "Validate My Address"),
            (Trigger::Script, &layout.confirm_address, "Confirm Address"),
            (Trigger::Native, &layout.final_submit, "Submit"),
        ];

        for (how, locator, label) in triggers {
            match self.trigger(how, locator).await {
                Ok(()) => {
                    info!("✓ Clicked {}", label);
                    settle(self.timings.trigger_settle).await;
                }
                Err(InteractionError::SessionLost(reason)) => {
                    error!("✗ Browser lost while submitting: {}", reason);
                    ctx.transition(FlowState::SubmitFailed { reason }, Some(label.to_string()));
                    return;
                }
                Err(e) => warn!("⚠ {}: {}", label, e),
            }
        }

        ctx.transition(FlowState::Completed, None);
    }

    async fn trigger(&mut self, how: Trigger, locator: &Locator) -> Interaction {
        let control = self.session.find(locator).await?;
        match how {
            Trigger::Script => self.session.script_click(&control).await,
            Trigger::Native => self.session.click(&control).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// Dispatched from page script; these buttons are often overlaid
    Script,
    Native,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBrowser, FakePage};
    use amoe_core::TerminalState;

    const LINK: &str = "https://amoe.playatmcd.com/verify_your_email?token=abc";
    const OTHER_LINK: &str = "https://amoe.playatmcd.com/verify_your_email?token=def";

    fn applicant() -> Applicant {
        Applicant {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            suffix: "Jr.".to_string(),
            street_address: "1 Main St".to_string(),
            apartment: String::new(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
        }
    }

    fn item(link: &str, code: &str) -> VerificationItem {
        VerificationItem::new(link, code).unwrap()
    }

    fn driver(browser: &FakeBrowser, applicant: Applicant) -> FlowDriver<FakeBrowser> {
        FlowDriver::new(
            browser.clone(),
            applicant,
            FormLayout::default(),
            FlowTimings::immediate(Duration::from_secs(15)),
        )
    }

    fn layout() -> FormLayout {
        FormLayout::default()
    }

    #[tokio::test]
    async fn test_happy_path_reaches_completed_in_field_order() {
        let browser = FakeBrowser::new().with_page(LINK, FakePage::complete(&layout()));
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::Completed);
        assert!(result.verified);
        assert!(result.filled);
        assert!(!result.duplicate);
        assert_eq!(
            result.transitions,
            vec!["Start", "CodeEntry", "Verified", "Filled", "Completed"]
        );

        let typed: Vec<String> = browser
            .actions()
            .into_iter()
            .filter(|a| a.starts_with("send_keys") || a.starts_with("select_by"))
            .collect();
        assert_eq!(
            typed,
            vec![
                "send_keys #otp 123456",
                "send_keys #first_name Ada",
                "send_keys #last_name Lovelace",
                "select_by_text select[id='suffix'] Jr.",
                "send_keys #address 1 Main St",
                "send_keys #city Springfield",
                "select_by_value select[id='state'] IL",
                "send_keys #zip 62701",
            ]
        );

        let clicks: Vec<String> = browser
            .actions()
            .into_iter()
            .filter(|a| a.contains("click"))
            .collect();
        assert_eq!(
            clicks,
            vec![
                "click button[type='submit']",
                "script_click #validateaddress",
                "script_click xpath //button[contains(text(), 'Confirm Address')]",
                "click button[type='submit']",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_code_input_stops_before_later_stages() {
        let layout = layout();
        let page = FakePage::complete(&layout).without(&layout.code_input);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::VerificationFailed);
        assert!(!result.verified);
        assert!(!result.filled);
        assert!(!browser.touched(&layout.first_name));
        assert!(!browser.touched(&layout.code_submit));
        assert!(result.failure.unwrap().contains("#otp"));
    }

    #[tokio::test]
    async fn test_missing_code_submit_is_verification_failure() {
        let layout = layout();
        let page = FakePage::complete(&layout).without(&layout.code_submit);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::VerificationFailed);
        assert!(browser.actions().contains(&"send_keys #otp 123456".to_string()));
        assert!(!browser.touched(&layout.first_name));
    }

    #[tokio::test]
    async fn test_navigation_failure_is_verification_failure() {
        let browser = FakeBrowser::new();
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::VerificationFailed);
        assert_eq!(result.transitions, vec!["Start", "VerificationFailed"]);
    }

    #[tokio::test]
    async fn test_missing_mandatory_field_is_fill_failure() {
        let layout = layout();
        let page = FakePage::complete(&layout).without(&layout.city);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::FillFailed);
        assert!(result.verified);
        assert!(!result.filled);
        assert!(!browser.touched(&layout.zip_code));
        assert!(!browser.touched(&layout.validate_address));
    }

    #[tokio::test]
    async fn test_suffix_failure_is_not_fatal() {
        let layout = layout();
        let page = FakePage::complete(&layout).rejecting(&layout.suffix);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::Completed);
        assert!(browser.actions().contains(&"send_keys #zip 62701".to_string()));
    }

    #[tokio::test]
    async fn test_empty_suffix_skips_dropdown() {
        let layout = layout();
        let browser = FakeBrowser::new().with_page(LINK, FakePage::complete(&layout));
        let mut applicant = applicant();
        applicant.suffix.clear();
        let mut driver = driver(&browser, applicant);

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::Completed);
        assert!(!browser.touched(&layout.suffix));
    }

    #[tokio::test]
    async fn test_apartment_only_touched_when_present() {
        let layout = layout();

        let browser = FakeBrowser::new().with_page(LINK, FakePage::complete(&layout));
        driver(&browser, applicant()).process(item(LINK, "123456")).await;
        assert!(!browser.touched(&layout.apartment));

        let browser = FakeBrowser::new().with_page(LINK, FakePage::complete(&layout));
        let mut with_apartment = applicant();
        with_apartment.apartment = "Apt 4B".to_string();
        driver(&browser, with_apartment).process(item(LINK, "123456")).await;
        assert!(browser.actions().contains(&"send_keys #address2 Apt 4B".to_string()));
    }

    #[tokio::test]
    async fn test_missing_trailing_triggers_still_complete() {
        let layout = layout();
        let page = FakePage::complete(&layout)
            .without(&layout.validate_address)
            .without(&layout.confirm_address);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::Completed);
        assert!(result.filled);
    }

    #[tokio::test]
    async fn test_session_lost_while_submitting_is_submit_failure() {
        let layout = layout();
        let page = FakePage::complete(&layout).losing_session_at(&layout.confirm_address);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::SubmitFailed);
        assert!(result.filled);
        assert_eq!(
            result.transitions,
            vec!["Start", "CodeEntry", "Verified", "Filled", "SubmitFailed"]
        );
    }

    #[tokio::test]
    async fn test_session_lost_during_code_entry_is_verification_failure() {
        let layout = layout();
        let page = FakePage::complete(&layout).losing_session_at(&layout.code_input);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::VerificationFailed);
        assert!(!result.verified);
        assert_eq!(
            result.transitions,
            vec!["Start", "CodeEntry", "VerificationFailed"]
        );
        assert!(!browser.touched(&layout.first_name));
    }

    #[tokio::test]
    async fn test_session_lost_during_fill_is_fill_failure() {
        let layout = layout();
        // the suffix is optional, but a dead browser still ends the stage
        let page = FakePage::complete(&layout).losing_session_at(&layout.suffix);
        let browser = FakeBrowser::new().with_page(LINK, page);
        let mut driver = driver(&browser, applicant());

        let result = driver.process(item(LINK, "123456")).await;

        assert_eq!(result.terminal_state, TerminalState::FillFailed);
        assert!(result.verified);
        assert!(!result.filled);
        assert_eq!(
            result.transitions,
            vec!["Start", "CodeEntry", "Verified", "FillFailed"]
        );
        assert!(!browser.touched(&layout.street_address));
        assert!(!browser.touched(&layout.validate_address));
    }

    #[tokio::test]
    async fn test_fill_failure_does_not_abort_batch() {
        let layout = layout();
        let browser = FakeBrowser::new()
            .with_page(LINK, FakePage::complete(&layout).without(&layout.last_name))
            .with_page(OTHER_LINK, FakePage::complete(&layout));
        let mut driver = driver(&browser, applicant());

        let results = driver
            .run_batch(&[item(LINK, "111111"), item(OTHER_LINK, "222222")])
            .await;

        let states: Vec<TerminalState> = results.iter().map(|r| r.terminal_state).collect();
        assert_eq!(states, vec![TerminalState::FillFailed, TerminalState::Completed]);
    }

    #[tokio::test]
    async fn test_duplicate_item_is_not_submitted_twice() {
        let browser = FakeBrowser::new().with_page(LINK, FakePage::complete(&layout()));
        let mut driver = driver(&browser, applicant());

        let results = driver
            .run_batch(&[item(LINK, "123456"), item(LINK, "123456")])
            .await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].duplicate);
        assert!(results[1].duplicate);
        assert_eq!(results[1].terminal_state, TerminalState::Completed);
        assert_eq!(browser.navigations(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_quits_session() {
        let browser = FakeBrowser::new();
        driver(&browser, applicant()).shutdown().await;
        assert!(browser.was_quit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_pauses_follow_timings() {
        let browser = FakeBrowser::new().with_page(LINK, FakePage::complete(&layout()));
        let timings = FlowTimings::from_config(
            &BrowserConfig {
                headless: true,
                window_width: 1920,
                window_height: 1080,
                chrome_path: None,
                element_timeout_seconds: 15,
            },
            &FlowConfig::default(),
        );
        let mut driver = FlowDriver::new(browser.clone(), applicant(), layout(), timings);
        let started = tokio::time::Instant::now();

        driver.process(item(LINK, "123456")).await;

        // 3 x 1s code entry, 2s form, 0.5s suffix, 1s after zip, 3 x 2s triggers
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(12_500) && elapsed < Duration::from_millis(13_500));
    }
}
