use anyhow::Result;

use amoe_core::config::AppConfig;
use amoe_harvester::{FetchMode, Harvester, ImapMailAccess};

use crate::commands::imap_harvester;

/// Read-only view of the mailbox; messages stay unseen for a later `run`
fn dry_run_harvester(config: &AppConfig) -> Result<Harvester<ImapMailAccess>> {
    imap_harvester(config, FetchMode::Peek)
}

/// Dry run: poll the mailbox and list what would be processed
pub async fn run(config: AppConfig) -> Result<()> {
    let harvester = dry_run_harvester(&config)?;
    let items = harvester.harvest(&config.mailbox_query()).await;

    if items.is_empty() {
        println!("\n✗ No verification emails found");
        return Ok(());
    }

    println!("\nFound {} verification item(s):\n", items.len());
    for (i, item) in items.iter().enumerate() {
        println!("  [{}] code {}  {}", i + 1, item.code(), item.link());
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sample_config;

    #[test]
    fn test_dry_run_leaves_messages_unseen() {
        let harvester = dry_run_harvester(&sample_config()).unwrap();
        assert_eq!(harvester.access().mode(), FetchMode::Peek);
        assert_eq!(harvester.access().mode().fetch_query(), "BODY.PEEK[]");
    }
}
