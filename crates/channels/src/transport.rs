use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

/// An inbound message event from the messaging channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Raw transport address of the sender (e.g. `60123456789@c.us`).
    pub from: String,
    /// Text body; may be empty when media is attached.
    #[serde(default)]
    pub body: String,
    /// Attached media, if any.
    #[serde(default)]
    pub media: Option<MediaRef>,
}

/// Reference to a media attachment, resolvable through the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub media_id: String,
    /// MIME type declared by the channel (e.g. `image/jpeg`).
    pub mime_type: String,
}

/// A downloaded media payload in the transport's wire encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    pub mime_type: String,
    /// Base64-encoded raw bytes.
    pub data: String,
}

/// Outbound reply sink and media source for one messaging channel.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Send one reply message to a raw sender identifier.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Fetch the payload behind a media reference.
    async fn download_media(&self, media_id: &str) -> Result<MediaPayload>;
}
