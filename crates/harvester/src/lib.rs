pub mod access;
pub mod decode;
pub mod extract;
pub mod harvester;
pub mod imap_mailbox;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use access::{MailAccess, MailError, MessageId, SearchFilter};
pub use extract::{CodeSource, ExtractedCode, Extractor};
pub use harvester::Harvester;
pub use imap_mailbox::{FetchMode, ImapCredentials, ImapMailAccess};
