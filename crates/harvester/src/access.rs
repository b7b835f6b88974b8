use async_trait::async_trait;
use thiserror::Error;

use amoe_core::{MailboxQuery, ReadState};

#[derive(Error, Debug)]
pub enum MailError {
    #[error("mailbox connect failed: {0}")]
    Connect(String),

    #[error("mailbox login failed: {0}")]
    Auth(String),

    #[error("mailbox command failed: {0}")]
    Command(String),

    #[error("message {0} has no body")]
    MissingBody(u32),
}

/// Sequence number of a message inside the selected folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

/// Which messages count as candidates for one poll attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub sender: String,
    pub read_state: ReadState,
}

impl SearchFilter {
    pub fn from_query(query: &MailboxQuery) -> Self {
        Self {
            sender: query.sender_filter.clone(),
            read_state: query.read_state,
        }
    }

    /// IMAP SEARCH criteria, e.g. `FROM "example.com" UNSEEN`
    pub fn to_imap_query(&self) -> String {
        let sender: String = self
            .sender
            .chars()
            .filter(|c| *c != '"' && *c != '\\')
            .collect();

        match self.read_state {
            ReadState::Unseen => format!("FROM \"{}\" UNSEEN", sender),
            ReadState::Any => format!("FROM \"{}\"", sender),
        }
    }
}

/// Narrow view of a mail store.
///
/// A session is exclusively owned by the caller between `connect` and `close`;
/// callers must hand it back to `close` on every path.
#[async_trait]
pub trait MailAccess: Send + Sync {
    type Session: Send;

    async fn connect(&self) -> Result<Self::Session, MailError>;

    /// Ids of matching messages, in mailbox order
    async fn search(
        &self,
        session: &mut Self::Session,
        filter: &SearchFilter,
    ) -> Result<Vec<MessageId>, MailError>;

    /// Raw RFC822 bytes of one message
    async fn fetch(&self, session: &mut Self::Session, id: MessageId) -> Result<Vec<u8>, MailError>;

    async fn close(&self, session: Self::Session) -> Result<(), MailError>;
}
