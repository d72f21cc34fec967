//! Ingestion Loop (§4.4) — drives the Message Parser on every inbound
//! Telegram message, persisting only when at least one classified link
//! survives, with bounded retry and durable failure logging.
//!
//! Grounded on `examples/xcorat-araliya-bot/src/subsystems/comms/telegram.rs`'s
//! `Component` impl and shutdown `select!` pattern, and on
//! `examples/original_source/app/core/monitor.py`'s `handler`.

pub mod transport;

use std::io::Write as _;
use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::Message;
use crate::error::AppError;
use crate::parser::parse_message;
use crate::store::Store;
use crate::subsystems::runtime::{Component, ComponentFuture};
use transport::{InboundMessage, TeloxideTransport};

const STORE_RETRY_ATTEMPTS: u32 = 3;
const STORE_RETRY_PAUSE: std::time::Duration = std::time::Duration::from_secs(1);

/// Channel buffer between the transport dispatcher and the persistence
/// loop; bounded so a slow store backpressures the transport rather than
/// growing unboundedly.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

pub struct IngestionLoop {
    bot_token: Option<String>,
    channels: Vec<String>,
    store: Store,
    failed_messages_log_path: PathBuf,
    error_messages_log_path: PathBuf,
}

impl IngestionLoop {
    pub fn new(
        bot_token: Option<String>,
        channels: Vec<String>,
        store: Store,
        failed_messages_log_path: PathBuf,
        error_messages_log_path: PathBuf,
    ) -> Self {
        Self { bot_token, channels, store, failed_messages_log_path, error_messages_log_path }
    }
}

impl Component for IngestionLoop {
    fn id(&self) -> &str {
        "ingestion-loop"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_ingestion(*self, shutdown))
    }
}

async fn run_ingestion(loop_: IngestionLoop, shutdown: CancellationToken) -> Result<(), AppError> {
    let Some(token) = loop_.bot_token else {
        warn!("TELEGRAM_BOT_TOKEN not set, ingestion loop exiting");
        return Ok(());
    };

    let (tx, mut rx) = mpsc::channel::<InboundMessage>(INBOUND_CHANNEL_CAPACITY);
    let transport = TeloxideTransport::new(token, loop_.channels.clone());

    let transport_shutdown = shutdown.clone();
    let transport_handle = tokio::spawn(transport.run(tx, transport_shutdown));

    info!("ingestion loop started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("ingestion loop shutting down");
                break;
            }
            maybe_msg = rx.recv() => {
                match maybe_msg {
                    Some(inbound) => {
                        if let Err(e) = handle_one(&loop_.store, &inbound, &loop_.failed_messages_log_path).await {
                            warn!("unhandled ingestion error: {e}");
                            append_log_line(&loop_.error_messages_log_path, &format!("{e}\n{}", preview(&inbound.text)));
                        }
                    }
                    None => {
                        warn!("ingestion transport channel closed");
                        break;
                    }
                }
            }
        }
    }

    match transport_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("telegram transport exited with error: {e}"),
        Err(e) => warn!("telegram transport task panicked: {e}"),
    }

    Ok(())
}

/// Process one inbound message per spec.md §4.4 steps 1–4. Step 5 (unhandled
/// errors must not terminate the loop) is enforced by the caller treating
/// this function's `Err` as recoverable.
async fn handle_one(store: &Store, inbound: &InboundMessage, failed_log: &std::path::Path) -> Result<(), AppError> {
    // Step 1 — convert origin time to local (UTC+8).
    let timestamp = crate::time::to_local(inbound.origin);

    debug!(channel = ?inbound.channel, "ingestion loop processing inbound message");

    // Step 2 — parse; a parser panic is not expected (it is a pure function)
    // but a pathologically malformed message is still logged and skipped
    // rather than propagated.
    let parsed = parse_message(&inbound.text, &inbound.metadata);

    // Step 3 — skip if no classified links.
    if parsed.links.is_empty() {
        debug!("no classified links, skipping message");
        return Ok(());
    }

    let mut message = Message {
        id: 0,
        timestamp,
        title: parsed.title,
        description: parsed.description,
        links: parsed.links,
        tags: parsed.tags,
        source: inbound.source.clone(),
        channel: inbound.channel.clone(),
        group_name: inbound.group_name.clone(),
        bot: inbound.bot.clone(),
        netdisk_types: Vec::new(),
        created_at: timestamp,
    };
    message.sync_netdisk_types();

    // Step 4 — persist with retry.
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.insert_message(&message) {
            Ok(_) => return Ok(()),
            Err(e) if attempt < STORE_RETRY_ATTEMPTS => {
                warn!(attempt, "transient store failure, retrying: {e}");
                tokio::time::sleep(STORE_RETRY_PAUSE).await;
            }
            Err(e) => {
                warn!("store write failed after {STORE_RETRY_ATTEMPTS} attempts: {e}");
                append_log_line(failed_log, &preview_full(&inbound.text));
                return Ok(());
            }
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

fn preview_full(text: &str) -> String {
    text.to_string()
}

/// Append `line` to `path`, creating the file (and its header timestamp) if
/// missing. Never truncates (spec.md §4.4 supplement).
fn append_log_line(path: &std::path::Path, line: &str) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    let result = std::fs::OpenOptions::new().create(true).append(true).open(path).and_then(|mut f| {
        writeln!(f, "[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), line)
    });
    if let Err(e) = result {
        warn!("failed to append to log file {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract::MessageMetadata;

    fn sample_inbound(text: &str) -> InboundMessage {
        InboundMessage {
            text: text.to_string(),
            metadata: MessageMetadata::default(),
            channel: Some("test_channel".to_string()),
            group_name: None,
            bot: None,
            source: None,
            origin: Utc::now(),
        }
    }

    fn open_test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("tg.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn message_without_links_is_skipped() {
        let (store, _dir) = open_test_store();
        let inbound = sample_inbound("just some text, no links at all here");
        let log = tempfile::tempdir().unwrap();
        handle_one(&store, &inbound, &log.path().join("failed.log")).await.unwrap();

        let page = store
            .get_filtered_messages(&crate::store::messages::MessageFilter::default())
            .unwrap();
        assert_eq!(page.messages.len(), 0);
    }

    #[tokio::test]
    async fn message_with_link_is_persisted_with_local_timestamp() {
        let (store, _dir) = open_test_store();
        let inbound = sample_inbound("名称：测试资源\n链接：https://pan.quark.cn/s/abc123");
        let log = tempfile::tempdir().unwrap();
        handle_one(&store, &inbound, &log.path().join("failed.log")).await.unwrap();

        let page = store
            .get_filtered_messages(&crate::store::messages::MessageFilter::default())
            .unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].netdisk_types, vec!["夸克网盘".to_string()]);
    }

    #[test]
    fn preview_truncates_to_200_chars() {
        let long = "a".repeat(500);
        assert_eq!(preview(&long).chars().count(), 200);
    }
}
