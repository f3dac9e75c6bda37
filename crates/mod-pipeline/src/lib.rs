pub mod extractor;
pub mod filter;
pub mod ledger;
pub mod mailbox;
pub mod orchestrator;
pub mod storage;

pub use extractor::{extract_secure_mail, SECURE_MAIL_ATTACHMENT};
pub use filter::SenderFilter;
pub use ledger::DedupLedger;
pub use mailbox::MailboxPipeline;
pub use orchestrator::{Orchestrator, RunSummary};
pub use storage::{sanitize_filename, OutputPaths, StorageLayout};
