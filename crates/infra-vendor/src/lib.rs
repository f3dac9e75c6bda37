pub mod client;
pub mod downloader;
pub mod form;
pub mod session;

pub use client::{PortalResponse, VendorClient, VendorConfig, DEFAULT_ENDPOINT};
pub use downloader::{SecureMailDownloader, VendorCredentials};
pub use form::{extract_form, FormLocator};
pub use session::{SecureMailSession, SessionStage};
