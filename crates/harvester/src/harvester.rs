/// Mailbox polling - collects verification items from unread messages
use tracing::{debug, info, warn};

use amoe_core::{MailboxQuery, VerificationItem};

use crate::access::{MailAccess, MailError, SearchFilter};
use crate::decode::normalized_body;
use crate::extract::Extractor;

pub struct Harvester<M: MailAccess> {
    access: M,
    extractor: Extractor,
}

impl<M: MailAccess> Harvester<M> {
    pub fn new(access: M, extractor: Extractor) -> Self {
        Self { access, extractor }
    }

    pub fn access(&self) -> &M {
        &self.access
    }

    /// Poll until one attempt yields items or `max_attempts` is exhausted.
    ///
    /// Items come back in mailbox order. An empty result means every attempt came up
    /// empty or failed.
    pub async fn harvest(&self, query: &MailboxQuery) -> Vec<VerificationItem> {
        info!("⏳ Waiting for verification emails from {}", query.sender_filter);

        let filter = SearchFilter::from_query(query);
        let max_attempts = query.max_attempts;

        for attempt in 1..=max_attempts {
            match self.attempt(&filter).await {
                Ok(items) if !items.is_empty() => {
                    info!("✅ Found {} verification email(s)", items.len());
                    return items;
                }
                Ok(_) => {
                    info!("Attempt {}/{}... no new verification emails yet", attempt, max_attempts);
                }
                Err(e) => {
                    warn!("Attempt {}/{}: error checking mailbox: {}", attempt, max_attempts, e);
                }
            }

            if attempt < max_attempts {
                let delay = query.backoff.delay_after(query.poll_interval, attempt);
                tokio::time::sleep(delay).await;
            }
        }

        warn!("✗ No verification emails found after {} attempts", max_attempts);
        Vec::new()
    }

    /// One scoped session: connect, scan, and always close
    async fn attempt(&self, filter: &SearchFilter) -> Result<Vec<VerificationItem>, MailError> {
        let mut session = self.access.connect().await?;

        let scanned = self.scan(&mut session, filter).await;

        if let Err(e) = self.access.close(session).await {
            warn!("failed to close mailbox session: {}", e);
        }

        scanned
    }

    async fn scan(
        &self,
        session: &mut M::Session,
        filter: &SearchFilter,
    ) -> Result<Vec<VerificationItem>, MailError> {
        let ids = self.access.search(session, filter).await?;
        let mut items = Vec::new();

        for id in ids {
            let raw = match self.access.fetch(session, id).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping message {}: {}", id.0, e);
                    continue;
                }
            };

            match self.parse_message(&raw) {
                Some(item) => {
                    info!("✓ Found OTP: {}", item.code());
                    items.push(item);
                }
                None => debug!("message {} has no usable link/code pair", id.0),
            }
        }

        Ok(items)
    }

    fn parse_message(&self, raw: &[u8]) -> Option<VerificationItem> {
        match normalized_body(raw) {
            Ok(body) => self.extractor.extract(&body),
            Err(e) => {
                debug!("unparseable message: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{verification_email, FakeMailbox, FakeMessage};
    use amoe_core::{Backoff, ReadState};
    use std::time::Duration;

    const HOST: &str = "amoe.playatmcd.com";

    fn query(max_attempts: u32) -> MailboxQuery {
        MailboxQuery {
            sender_filter: "playatmcd.com".to_string(),
            read_state: ReadState::Unseen,
            poll_interval: Duration::from_secs(15),
            max_attempts,
            backoff: Backoff::Fixed,
        }
    }

    fn harvester(mailbox: &FakeMailbox) -> Harvester<FakeMailbox> {
        Harvester::new(mailbox.clone(), Extractor::new(HOST).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_one_item_per_qualifying_message_in_order() {
        let mailbox = FakeMailbox::new().then_messages(vec![
            verification_email(HOST, "tok1", "111111"),
            verification_email(HOST, "tok2", "222222"),
            verification_email(HOST, "tok3", "333333"),
        ]);

        let items = harvester(&mailbox).harvest(&query(5)).await;

        let codes: Vec<&str> = items.iter().map(|i| i.code()).collect();
        assert_eq!(codes, vec!["111111", "222222", "333333"]);
        assert!(items[0].link().ends_with("token=tok1"));
        assert_eq!(mailbox.connects(), 1);
        assert_eq!(mailbox.closes(), 1);
        assert_eq!(mailbox.last_query().as_deref(), Some("FROM \"playatmcd.com\" UNSEEN"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_and_failing_messages_do_not_abort_batch() {
        let mailbox = FakeMailbox::new().then_batch(vec![
            FakeMessage::Raw(verification_email(HOST, "tok1", "111111")),
            FakeMessage::FetchError,
            FakeMessage::Raw(b"Subject: hi\r\n\r\nYour One Time Password Code: 999999".to_vec()),
            FakeMessage::Raw(b"\xff\xfe not a mail at all".to_vec()),
            FakeMessage::Raw(verification_email(HOST, "tok2", "222222")),
        ]);

        let items = harvester(&mailbox).harvest(&query(3)).await;

        assert_eq!(items.len(), 2);
        assert!(items
            .iter()
            .all(|i| !i.link().is_empty() && amoe_core::is_six_digit_code(i.code())));
        assert_eq!(mailbox.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_empty_after_max_attempts() {
        let mailbox = FakeMailbox::new();
        let started = tokio::time::Instant::now();

        let items = harvester(&mailbox).harvest(&query(3)).await;

        assert!(items.is_empty());
        assert_eq!(mailbox.connects(), 3);
        assert_eq!(mailbox.closes(), 3);
        // no sleep after the final attempt
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_errors_are_absorbed_and_polling_stops_at_first_batch() {
        let mailbox = FakeMailbox::new()
            .then_connect_error()
            .then_search_error()
            .then_empty()
            .then_messages(vec![verification_email(HOST, "tok", "424242")])
            .then_messages(vec![verification_email(HOST, "late", "515151")]);

        let items = harvester(&mailbox).harvest(&query(10)).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].code(), "424242");
        assert_eq!(mailbox.connects(), 4);
        // the failed connect never produced a session to close
        assert_eq!(mailbox.closes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_without_items_keep_polling() {
        let mailbox = FakeMailbox::new()
            .then_messages(vec![b"Subject: newsletter\r\n\r\nNothing here".to_vec()])
            .then_messages(vec![verification_email(HOST, "tok", "123456")]);

        let items = harvester(&mailbox).harvest(&query(2)).await;

        assert_eq!(items.len(), 1);
        assert_eq!(mailbox.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_between_attempts() {
        let mailbox = FakeMailbox::new();
        let mut q = query(4);
        q.backoff = Backoff::Exponential {
            max: Duration::from_secs(40),
        };
        let started = tokio::time::Instant::now();

        harvester(&mailbox).harvest(&q).await;

        // 15 + 30 + 40 (capped)
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(85) && elapsed < Duration::from_secs(86));
    }
}
