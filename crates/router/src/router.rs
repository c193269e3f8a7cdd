use std::time::{Duration, Instant};

use {
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    tracing::{debug, info, warn},
};

use {
    consult_backend::{BackendClient, Error as BackendError},
    consult_channels::{Allowlist, ChannelTransport, InboundMessage, MediaRef},
    consult_common::{ChatMessage, ChatRole, now_ms},
    consult_sessions::SessionStore,
};

use crate::{
    chunk::{MAX_MESSAGE_LEN, chunk_reply},
    error::{RelayError, reply},
    sanitize::strip_emphasis,
};

/// Pause between consecutive chunks of one long reply so the channel
/// delivers them in order.
const CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Terminal state of one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// At least one reply (answer or fixed failure notice) reached the
    /// transport.
    Delivered,
    /// Dropped without any reply: sender not admitted, or a payload kind
    /// the relay does not service.
    RejectedSilently,
    /// A reply was produced but the transport refused to carry it.
    DeliveryFailed,
}

/// Derive the canonical sender id from a raw transport address:
/// `60123456789@c.us` becomes `+60123456789`.
#[must_use]
pub fn sender_id_from_address(from: &str) -> String {
    let digits = from.split('@').next().unwrap_or(from);
    format!("+{digits}")
}

/// Per-event state machine: admission, classification, backend dispatch,
/// sanitization, chunked delivery.
pub struct MessageRouter {
    store: SessionStore,
    allowlist: Allowlist,
    backend: BackendClient,
    chunk_delay: Duration,
}

impl MessageRouter {
    #[must_use]
    pub fn new(store: SessionStore, allowlist: Allowlist, backend: BackendClient) -> Self {
        Self {
            store,
            allowlist,
            backend,
            chunk_delay: CHUNK_DELAY,
        }
    }

    /// Override the inter-chunk pause. Tests set this to zero.
    #[must_use]
    pub fn with_chunk_delay(mut self, chunk_delay: Duration) -> Self {
        self.chunk_delay = chunk_delay;
        self
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Drive one inbound event to a terminal outcome. Never returns an
    /// error: every failure is absorbed into at most one fixed reply so a
    /// bad event cannot take the relay down.
    pub async fn handle(
        &self,
        transport: &dyn ChannelTransport,
        message: &InboundMessage,
    ) -> Outcome {
        let started = Instant::now();
        let sender_id = sender_id_from_address(&message.from);

        if !self.allowlist.is_allowed(&sender_id) {
            info!(sender_id, "sender not on allow-list, dropping");
            return Outcome::RejectedSilently;
        }

        let result = match &message.media {
            Some(media) if media.mime_type.starts_with("image/") => {
                self.handle_image(transport, &sender_id, &message.from, media).await
            },
            Some(media) => {
                info!(sender_id, mime_type = %media.mime_type, "unsupported media kind");
                return match transport.send_text(&message.from, reply::IMAGES_ONLY).await {
                    Ok(()) => Outcome::Delivered,
                    Err(e) => {
                        warn!(sender_id, error = %e, "failed to send unsupported-media notice");
                        Outcome::DeliveryFailed
                    },
                };
            },
            None if !message.body.trim().is_empty() => {
                self.handle_text(transport, &sender_id, &message.from, &message.body)
                    .await
            },
            None => {
                debug!(sender_id, "empty event, dropping");
                return Outcome::RejectedSilently;
            },
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => self.report_failure(transport, &sender_id, &message.from, &e).await,
        };
        debug!(
            sender_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?outcome,
            "event handled"
        );
        outcome
    }

    /// Text consultation: append the user turn to the session history, call
    /// the chat backend, persist its returned history, deliver the reply.
    ///
    /// The store is only updated after the backend succeeds, so a failed
    /// turn leaves the session exactly as it was.
    async fn handle_text(
        &self,
        transport: &dyn ChannelTransport,
        sender_id: &str,
        to: &str,
        body: &str,
    ) -> Result<Outcome, RelayError> {
        let session = self.store.get_or_create(sender_id);
        debug!(
            sender_id,
            prior_turns = session.history.len(),
            preview = preview(body),
            "text consultation"
        );

        let mut messages = session.history;
        messages.push(ChatMessage::user(body));

        let id = format!("chat_{}", now_ms());
        let returned = self.backend.chat(&id, &messages).await?;

        let answer = match returned.last() {
            Some(last) if last.role == ChatRole::Assistant => {
                last.content.clone()
            },
            _ => {
                return Err(BackendError::InvalidResponse(
                    "chat history did not end with an assistant turn".into(),
                )
                .into());
            },
        };

        self.store.update(sender_id, returned);
        self.deliver(transport, sender_id, to, &answer).await
    }

    /// Image diagnosis: fetch the media bytes through the transport, call
    /// the vision backend, deliver the diagnosis. Stateless; sessions are
    /// not touched.
    async fn handle_image(
        &self,
        transport: &dyn ChannelTransport,
        sender_id: &str,
        to: &str,
        media: &MediaRef,
    ) -> Result<Outcome, RelayError> {
        debug!(sender_id, media_id = %media.media_id, mime_type = %media.mime_type, "image diagnosis");

        let payload = transport
            .download_media(&media.media_id)
            .await
            .map_err(RelayError::MediaDownload)?;
        let image = BASE64
            .decode(payload.data.as_bytes())
            .map_err(|e| RelayError::MediaDownload(e.into()))?;

        let diagnosis = self.backend.vision(image, &payload.mime_type).await?;
        self.deliver(transport, sender_id, to, &diagnosis).await
    }

    /// Sanitize, chunk, and send one reply. Stops at the first transport
    /// error; the remaining chunks are dropped rather than retried out of
    /// order.
    async fn deliver(
        &self,
        transport: &dyn ChannelTransport,
        sender_id: &str,
        to: &str,
        raw: &str,
    ) -> Result<Outcome, RelayError> {
        let text = strip_emphasis(raw);
        let chunks = chunk_reply(&text, MAX_MESSAGE_LEN);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            if let Err(e) = transport.send_text(to, chunk).await {
                warn!(sender_id, chunk = i + 1, total, error = %e, "reply delivery failed");
                return Ok(Outcome::DeliveryFailed);
            }
        }
        info!(sender_id, chunks = total, "reply delivered");
        Ok(Outcome::Delivered)
    }

    /// Map a failure to its fixed user-visible notice and try to send it.
    async fn report_failure(
        &self,
        transport: &dyn ChannelTransport,
        sender_id: &str,
        to: &str,
        error: &RelayError,
    ) -> Outcome {
        warn!(sender_id, error = %error, "event failed");
        match transport.send_text(to, error.user_reply()).await {
            Ok(()) => Outcome::Delivered,
            Err(e) => {
                warn!(sender_id, error = %e, "failed to send failure notice");
                Outcome::DeliveryFailed
            },
        }
    }
}

/// First few characters of a message body for log lines.
fn preview(body: &str) -> &str {
    let mut end = body.len().min(40);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
