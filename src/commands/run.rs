use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use amoe_core::config::AppConfig;
use amoe_core::{FlowResult, MailboxQuery, RunSummary};
use amoe_driver::{BrowserSession, FlowDriver, FlowTimings, FormLayout, HeadlessChromeSession};
use amoe_harvester::{FetchMode, Harvester, MailAccess};

use crate::commands::imap_harvester;

/// Everything one run produced, as written to `--report`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub results: Vec<FlowResult>,
}

impl RunReport {
    fn new(results: Vec<FlowResult>) -> Self {
        Self {
            generated_at: Utc::now(),
            summary: RunSummary::from_results(&results),
            results,
        }
    }
}

pub async fn run(config: AppConfig, report: Option<String>) -> Result<()> {
    println!("{}", "=".repeat(60));
    println!("AMOE automatic verification and form filling");
    println!("{}", "=".repeat(60));

    let harvester = imap_harvester(&config, FetchMode::MarkSeen)?;
    let query = config.mailbox_query();

    let session = HeadlessChromeSession::launch(&config.browser, browser_idle_timeout(&query))
        .context("could not start the browser")?;
    let driver = FlowDriver::new(
        session,
        config.applicant.clone(),
        FormLayout::default(),
        FlowTimings::from_config(&config.browser, &config.flow),
    );

    let outcome = pipeline(&harvester, &query, driver).await?;

    print_summary(&outcome);

    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(&path, json).with_context(|| format!("failed to write report to {}", path))?;
        info!("📝 Report written to {}", path);
    }

    Ok(())
}

// IMAP connect/search/fetch round trips per attempt, plus the gap before the first page
const PER_ATTEMPT_ALLOWANCE: Duration = Duration::from_secs(60);
const STARTUP_ALLOWANCE: Duration = Duration::from_secs(120);

/// How long the browser may sit without DevTools traffic.
///
/// Chrome is launched before polling starts, so it must survive every empty attempt.
fn browser_idle_timeout(query: &MailboxQuery) -> Duration {
    query.poll_budget() + PER_ATTEMPT_ALLOWANCE * query.max_attempts + STARTUP_ALLOWANCE
}

/// Harvest once, then drive every item through the browser.
///
/// The browser is shut down on every path. Finding nothing at all is fatal.
pub async fn pipeline<M, S>(
    harvester: &Harvester<M>,
    query: &MailboxQuery,
    mut driver: FlowDriver<S>,
) -> Result<RunReport>
where
    M: MailAccess,
    S: BrowserSession,
{
    let items = harvester.harvest(query).await;

    if items.is_empty() {
        driver.shutdown().await;
        bail!(
            "unable to retrieve any verification emails after {} attempts",
            query.max_attempts
        );
    }

    info!("📋 Processing {} verification item(s)", items.len());
    let results = driver.run_batch(&items).await;
    driver.shutdown().await;

    Ok(RunReport::new(results))
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;

    println!("\n╔══════════════════════════════════════════════╗");
    println!("║           AMOE Run Summary                   ║");
    println!("╠══════════════════════════════════════════════╣");
    println!("║ Emails found:         {:>18}    ║", s.found);
    println!("║ Completed:            {:>18}    ║", s.completed);
    println!("║ Verification failed:  {:>18}    ║", s.verification_failed);
    println!("║ Fill failed:          {:>18}    ║", s.fill_failed);
    println!("║ Submit failed:        {:>18}    ║", s.submit_failed);
    println!("║ Duplicates:           {:>18}    ║", s.duplicates);
    println!("╚══════════════════════════════════════════════╝");
    println!("  {}\n", s);

    for (i, result) in report.results.iter().enumerate() {
        let mark = if result.terminal_state.is_completed() { "✓" } else { "✗" };
        let note = if result.duplicate { " (duplicate)" } else { "" };
        println!(
            "  {} [{}] {} {}{}",
            mark,
            i + 1,
            result.item.code(),
            result.terminal_state,
            note
        );
    }
    println!();
}
