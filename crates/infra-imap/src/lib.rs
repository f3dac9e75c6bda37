pub mod transport;

pub use transport::{ImapConnector, ImapTransport};
