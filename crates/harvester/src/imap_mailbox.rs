/// IMAP-over-TLS mailbox access
use async_trait::async_trait;
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;
use tracing::{debug, info};

use crate::access::{MailAccess, MailError, MessageId, SearchFilter};

#[derive(Debug, Clone)]
pub struct ImapCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
}

/// Whether harvesting leaves a trace in the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Folder opened read-write and fetched with `RFC822`, which flags messages `\Seen`
    MarkSeen,
    /// Folder opened with `EXAMINE` and fetched with `BODY.PEEK[]`; flags stay untouched
    Peek,
}

impl FetchMode {
    pub fn fetch_query(&self) -> &'static str {
        match self {
            FetchMode::MarkSeen => "RFC822",
            FetchMode::Peek => "BODY.PEEK[]",
        }
    }
}

pub struct ImapMailAccess {
    credentials: ImapCredentials,
    mode: FetchMode,
}

impl ImapMailAccess {
    pub fn new(credentials: ImapCredentials, mode: FetchMode) -> Self {
        Self { credentials, mode }
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }
}

#[async_trait]
impl MailAccess for ImapMailAccess {
    type Session = imap::Session<TlsStream<TcpStream>>;

    async fn connect(&self) -> Result<Self::Session, MailError> {
        let creds = &self.credentials;

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| MailError::Connect(format!("tls builder failed: {}", e)))?;

        let client = imap::connect((creds.host.as_str(), creds.port), &creds.host, &tls)
            .map_err(|e| {
                MailError::Connect(format!("{}:{}: {}", creds.host, creds.port, e))
            })?;

        let mut session = client
            .login(&creds.username, &creds.password)
            .map_err(|(e, _)| MailError::Auth(format!("{}: {}", creds.username, e)))?;

        let opened = match self.mode {
            FetchMode::MarkSeen => session.select(&creds.folder),
            FetchMode::Peek => session.examine(&creds.folder),
        };
        if let Err(e) = opened {
            let _ = session.logout();
            return Err(MailError::Command(format!(
                "select '{}' failed: {}",
                creds.folder, e
            )));
        }

        debug!("connected to {} as {}", creds.host, creds.username);
        Ok(session)
    }

    async fn search(
        &self,
        session: &mut Self::Session,
        filter: &SearchFilter,
    ) -> Result<Vec<MessageId>, MailError> {
        let query = filter.to_imap_query();

        let mut ids: Vec<u32> = session
            .search(&query)
            .map_err(|e| MailError::Command(format!("search {} failed: {}", query, e)))?
            .into_iter()
            .collect();
        ids.sort_unstable();

        info!("{} message(s) match {}", ids.len(), query);
        Ok(ids.into_iter().map(MessageId).collect())
    }

    async fn fetch(&self, session: &mut Self::Session, id: MessageId) -> Result<Vec<u8>, MailError> {
        let fetches = session
            .fetch(id.0.to_string(), self.mode.fetch_query())
            .map_err(|e| MailError::Command(format!("fetch {} failed: {}", id.0, e)))?;

        fetches
            .iter()
            .find_map(|fetch| fetch.body().map(|body| body.to_vec()))
            .ok_or(MailError::MissingBody(id.0))
    }

    async fn close(&self, mut session: Self::Session) -> Result<(), MailError> {
        session
            .logout()
            .map_err(|e| MailError::Command(format!("logout failed: {}", e)))
    }
}
