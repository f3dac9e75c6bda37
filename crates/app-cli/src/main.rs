mod config;

use std::env;
use std::sync::Arc;

use secmail_domain::OriginalFetcher;
use secmail_error::{ErrorReport, SecMailError};
use secmail_imap::ImapConnector;
use secmail_pipeline::{
    DedupLedger, MailboxPipeline, Orchestrator, SenderFilter, StorageLayout,
};
use secmail_vendor::{SecureMailDownloader, VendorClient};
use tracing::{error, info, warn};

use crate::config::{env_var, load_mail_config, load_secure_mail_config, load_storage_dir};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "secmail=info,secmail_pipeline=info,secmail_imap=info,secmail_vendor=info",
                )
            }),
        )
        .compact()
        .init();
}

async fn run_download() -> Result<(), SecMailError> {
    let mail = load_mail_config(env_var)?;
    let secure_mail = load_secure_mail_config(env_var)?;
    let layout = StorageLayout::new(load_storage_dir(env_var));

    layout.ensure_dirs().await?;
    let ledger = Arc::new(DedupLedger::load(layout.ledger_path()).await?);

    let fetcher: Option<Arc<dyn OriginalFetcher>> = match secure_mail {
        Some(cfg) => {
            info!(
                endpoint = %cfg.client.endpoint,
                max_connections = cfg.client.max_connections,
                "secure mail download enabled"
            );
            let client = VendorClient::new(cfg.client)?;
            Some(Arc::new(SecureMailDownloader::new(client, cfg.credentials)))
        }
        None => {
            info!("secure mail credentials not configured, saving notifications only");
            None
        }
    };

    let filter = SenderFilter::new(mail.sender_suffix.as_deref());
    let mut pipeline = MailboxPipeline::connect(Arc::new(ImapConnector), mail.account).await;
    let messages = pipeline
        .filter_messages(&mail.folder, move |message| filter.accepts(message))
        .await;

    let summary = Orchestrator::new(ledger, layout, fetcher).run(messages).await;

    if let Some(e) = pipeline.error() {
        return Err(e);
    }
    pipeline.close().await;
    if let Some(e) = pipeline.error() {
        warn!(error = %e, "logout failed");
    }

    info!(
        skipped = summary.skipped,
        processed = summary.processed,
        without_secure_mail = summary.without_secure_mail,
        failed = summary.failed,
        "Done!"
    );
    let json = serde_json::to_string(&summary)
        .map_err(|e| SecMailError::internal(format!("summary: {e}")))?;
    println!("{json}");
    Ok(())
}

async fn run_list_mailboxes() -> Result<(), SecMailError> {
    let mail = load_mail_config(env_var)?;
    let mut pipeline = MailboxPipeline::connect(Arc::new(ImapConnector), mail.account).await;

    let names = pipeline.list_mailboxes().await;
    pipeline.close().await;
    if let Some(e) = pipeline.error() {
        return Err(e);
    }

    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn print_usage() {
    eprintln!("secmail: archive secure mail notifications and download their originals");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  secmail [run]        Process the configured folder (default)");
    eprintln!("  secmail mailboxes    List the mailboxes on the server");
    eprintln!("  secmail help         Show this help");
    eprintln!();
    eprintln!("Environment variables (a .env file in the working directory is read first):");
    eprintln!("  IMAP_SERVER                  IMAP host, optionally host:port (default port 993)");
    eprintln!("  IMAP_USERNAME                IMAP login");
    eprintln!("  IMAP_PASSWORD                IMAP password");
    eprintln!("  IMAP_FOLDER                  Folder to process (default: INBOX.Archive)");
    eprintln!("  MAIL_FROM_SUFFIX             Only process senders ending with this suffix");
    eprintln!("  SECURE_MAIL_USERNAME         Secure mail portal login (downloads off when unset)");
    eprintln!("  SECURE_MAIL_PASSWORD         Secure mail portal password");
    eprintln!("  SECURE_MAIL_ENDPOINT         Portal URL (default: https://demvreply.datevnet.de/web.app)");
    eprintln!("  SECURE_MAIL_MAX_CONNECTIONS  Concurrent portal requests (default: 10)");
    eprintln!("  SECMAIL_STORAGE_DIR          Ledger and output directory (default: storage)");
    eprintln!("  RUST_LOG                     Log level (default: secmail=info)");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    let result = match cmd {
        "run" => run_download().await,
        "mailboxes" => run_list_mailboxes().await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        unknown => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run `secmail help` for usage");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        let report = ErrorReport::from(&e);
        error!(code = report.code, "{}", report.to_compact());
        std::process::exit(1);
    }
}
