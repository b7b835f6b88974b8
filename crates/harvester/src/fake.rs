//! In-memory mailbox with scripted per-attempt batches

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::access::{MailAccess, MailError, MessageId, SearchFilter};

#[derive(Debug, Clone)]
pub enum FakeMessage {
    Raw(Vec<u8>),
    FetchError,
}

#[derive(Debug, Clone)]
enum Attempt {
    ConnectError,
    SearchError,
    Batch(Vec<FakeMessage>),
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Attempt>,
    connects: usize,
    closes: usize,
    last_query: Option<String>,
}

/// Each `connect` consumes the next scripted attempt; once the script runs out every
/// attempt sees an empty folder.
#[derive(Debug, Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<State>>,
}

pub struct FakeSession {
    batch: Vec<FakeMessage>,
    fail_search: bool,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, attempt: Attempt) -> Self {
        self.lock().script.push_back(attempt);
        self
    }

    pub fn then_empty(self) -> Self {
        self.push(Attempt::Batch(Vec::new()))
    }

    pub fn then_connect_error(self) -> Self {
        self.push(Attempt::ConnectError)
    }

    pub fn then_search_error(self) -> Self {
        self.push(Attempt::SearchError)
    }

    pub fn then_messages(self, raw: Vec<Vec<u8>>) -> Self {
        self.push(Attempt::Batch(raw.into_iter().map(FakeMessage::Raw).collect()))
    }

    pub fn then_batch(self, batch: Vec<FakeMessage>) -> Self {
        self.push(Attempt::Batch(batch))
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    pub fn last_query(&self) -> Option<String> {
        self.lock().last_query.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MailAccess for FakeMailbox {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession, MailError> {
        let mut state = self.lock();
        state.connects += 1;

        match state.script.pop_front() {
            Some(Attempt::ConnectError) => Err(MailError::Connect("connection refused".into())),
            Some(Attempt::SearchError) => Ok(FakeSession {
                batch: Vec::new(),
                fail_search: true,
            }),
            Some(Attempt::Batch(batch)) => Ok(FakeSession {
                batch,
                fail_search: false,
            }),
            None => Ok(FakeSession {
                batch: Vec::new(),
                fail_search: false,
            }),
        }
    }

    async fn search(
        &self,
        session: &mut FakeSession,
        filter: &SearchFilter,
    ) -> Result<Vec<MessageId>, MailError> {
        self.lock().last_query = Some(filter.to_imap_query());

        if session.fail_search {
            return Err(MailError::Command("search timed out".into()));
        }

        Ok((1..=session.batch.len() as u32).map(MessageId).collect())
    }

    async fn fetch(&self, session: &mut FakeSession, id: MessageId) -> Result<Vec<u8>, MailError> {
        match session.batch.get(id.0 as usize - 1) {
            Some(FakeMessage::Raw(raw)) => Ok(raw.clone()),
            Some(FakeMessage::FetchError) => Err(MailError::Command(format!("fetch {} failed", id.0))),
            None => Err(MailError::MissingBody(id.0)),
        }
    }

    async fn close(&self, _session: FakeSession) -> Result<(), MailError> {
        self.lock().closes += 1;
        Ok(())
    }
}

/// A plausible HTML verification email carrying a labeled code and a link
pub fn verification_email(host: &str, token: &str, code: &str) -> Vec<u8> {
    format!(
        "From: Promotions <noreply@playatmcd.com>\r\n\
Subject: Verify your email\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body style=\"color:#333333\">\r\n\
<p>Your One Time Password Code: <strong>{code}</strong></p>\r\n\
<p><a href=\"https://{host}/verify_your_email?token={token}\">Verify my email</a></p>\r\n\
<p>Offer valid in zip 10025 through 2026.</p>\r\n\
</body></html>\r\n"
    )
    .into_bytes()
}
