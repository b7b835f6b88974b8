pub mod check;
pub mod harvest;
pub mod run;

use anyhow::{Context, Result};

use amoe_core::config::AppConfig;
use amoe_harvester::{Extractor, FetchMode, Harvester, ImapCredentials, ImapMailAccess};

/// Harvester over the configured IMAP account
pub fn imap_harvester(config: &AppConfig, mode: FetchMode) -> Result<Harvester<ImapMailAccess>> {
    let mailbox = &config.mailbox;
    let credentials = ImapCredentials {
        host: mailbox.imap_host.clone(),
        port: mailbox.imap_port,
        username: mailbox.username.clone(),
        password: mailbox.password.clone(),
        folder: mailbox.folder.clone(),
    };
    let access = ImapMailAccess::new(credentials, mode);

    let extractor = Extractor::new(&mailbox.verification_host)
        .with_context(|| format!("bad verification host '{}'", mailbox.verification_host))?;

    Ok(Harvester::new(access, extractor))
}
