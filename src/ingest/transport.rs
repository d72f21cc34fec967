//! The Telegram transport, abstracted behind a trait (spec.md §1 keeps the
//! Telegram client itself out of scope; this is only its interface, per
//! SPEC_FULL.md §0/§4.4) so the Ingestion Loop and the admin
//! channel-diagnostic endpoints can run against a test double.

use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::AppError;
use crate::parser::extract::MessageMetadata;

/// One inbound message as the Ingestion Loop sees it, already stripped of
/// transport-specific types.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub text: String,
    pub metadata: MessageMetadata,
    pub channel: Option<String>,
    pub group_name: Option<String>,
    pub bot: Option<String>,
    pub source: Option<String>,
    /// UTC origin instant, per spec.md §4.4 step 1.
    pub origin: chrono::DateTime<chrono::Utc>,
}

/// Abstracts the Telegram client so the Ingestion Loop and the admin
/// channel-diagnostic endpoints (§6 supplement) work uniformly against the
/// live client or a test double.
pub trait Transport: Send + Sync + 'static {
    /// Attempt to resolve `channel`'s entity, returning an error description
    /// on failure (used by `POST /api/admin/channels/diagnose`).
    fn diagnose_channel(
        &self,
        channel: &str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + '_>>;

    /// Register a short-lived listener against `channel` and report whether
    /// any message arrived before `timeout` elapses (used by
    /// `POST /api/admin/channels/test-monitor`).
    fn test_monitor(
        &self,
        channel: &str,
        timeout: std::time::Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>>;
}

/// Production transport backed by `teloxide` (rustls), grounded on
/// `examples/xcorat-araliya-bot/src/subsystems/comms/telegram.rs`'s
/// `Dispatcher` setup.
pub struct TeloxideTransport {
    bot: Bot,
    channels: Vec<String>,
}

impl TeloxideTransport {
    pub fn new(token: String, channels: Vec<String>) -> Self {
        Self { bot: Bot::new(token), channels }
    }

    /// Run the dispatcher, forwarding every text message to `sender` as an
    /// [`InboundMessage`] until `shutdown` is cancelled.
    pub async fn run(
        self,
        sender: mpsc::Sender<InboundMessage>,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> Result<(), AppError> {
        let channels = self.channels.clone();
        let handler = Update::filter_message().endpoint(move |msg: Message| {
            let sender = sender.clone();
            let channels = channels.clone();
            async move {
                if let Some(text) = msg.text() {
                    let channel = msg.chat.username().map(str::to_string);
                    if !channels.is_empty() {
                        if let Some(ref c) = channel {
                            if !channels.iter().any(|configured| configured == c) {
                                return respond(());
                            }
                        }
                    }

                    let metadata = entity_metadata(&msg);
                    let inbound = InboundMessage {
                        text: text.to_string(),
                        metadata,
                        channel,
                        group_name: msg.chat.title().map(str::to_string),
                        bot: msg.via_bot.as_ref().and_then(|u| u.username.clone()),
                        source: msg.from.as_ref().and_then(|u| u.username.clone()),
                        origin: msg.date,
                    };

                    if sender.send(inbound).await.is_err() {
                        warn!("ingestion channel closed; dropping inbound telegram message");
                    }
                }
                respond(())
            }
        });

        let mut dispatcher = Dispatcher::builder(self.bot, handler).build();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            _ = dispatcher.dispatch() => {
                warn!("telegram dispatcher exited unexpectedly");
            }
        }
        Ok(())
    }
}

impl Transport for TeloxideTransport {
    fn diagnose_channel(
        &self,
        channel: &str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + '_>> {
        let bot = self.bot.clone();
        let channel = channel.to_string();
        Box::pin(async move {
            bot.get_chat(format!("@{channel}"))
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }

    fn test_monitor(
        &self,
        channel: &str,
        timeout: std::time::Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
        let bot = self.bot.clone();
        let channel = channel.to_string();
        Box::pin(async move {
            let (tx, mut rx) = mpsc::channel::<()>(1);
            let handler = Update::filter_message().endpoint(move |msg: Message| {
                let tx = tx.clone();
                let channel = channel.clone();
                async move {
                    if msg.chat.username() == Some(channel.as_str()) {
                        let _ = tx.try_send(());
                    }
                    respond(())
                }
            });
            let mut dispatcher = Dispatcher::builder(bot, handler).build();
            tokio::select! {
                _ = dispatcher.dispatch() => false,
                arrived = rx.recv() => arrived.is_some(),
                _ = tokio::time::sleep(timeout) => false,
            }
        })
    }
}

/// Pull entity/button/preview URLs out of a teloxide `Message` into the
/// parser's transport-agnostic metadata shape.
fn entity_metadata(msg: &Message) -> MessageMetadata {
    let mut entity_urls = Vec::new();
    if let Some(entities) = msg.entities() {
        for entity in entities {
            if let teloxide::types::MessageEntityKind::TextLink { url } = &entity.kind {
                entity_urls.push(url.to_string());
            }
        }
    }

    let mut button_urls = Vec::new();
    if let Some(markup) = msg.reply_markup() {
        for row in &markup.inline_keyboard {
            for button in row {
                if let teloxide::types::InlineKeyboardButtonKind::Url(url) = &button.kind {
                    button_urls.push(url.to_string());
                }
            }
        }
    }

    let webpage_preview_url = msg.link_preview_options().and_then(|o| o.url.clone());

    MessageMetadata { entity_urls, button_urls, webpage_preview_url }
}

/// A stub transport used by channel-diagnostic and admin-route tests, never
/// touching the network. Kept as a plain `pub` item (not `cfg(test)`-gated)
/// so `tests/test_api.rs` can build an `ApiState` without a real Telegram
/// client — integration tests compile the library without `cfg(test)` set.
pub struct StubTransport {
    pub ok_channels: Vec<String>,
    pub monitored_channels: Vec<String>,
}

impl Transport for StubTransport {
    fn diagnose_channel(
        &self,
        channel: &str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + '_>> {
        let ok = self.ok_channels.iter().any(|c| c == channel);
        Box::pin(async move { if ok { Ok(()) } else { Err("not found".to_string()) } })
    }

    fn test_monitor(
        &self,
        channel: &str,
        _timeout: std::time::Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
        let arrived = self.monitored_channels.iter().any(|c| c == channel);
        Box::pin(async move { arrived })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_transport_reports_configured_channels_as_ok() {
        let transport = StubTransport { ok_channels: vec!["good_channel".to_string()], monitored_channels: vec![] };
        assert!(transport.diagnose_channel("good_channel").await.is_ok());
        assert!(transport.diagnose_channel("missing_channel").await.is_err());
    }
}
