use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    reqwest::Client,
    serde::Serialize,
    tracing::debug,
};

use consult_channels::{ChannelTransport, MediaPayload};

/// Reply sink and media source backed by the channel bridge's HTTP API.
///
/// Replies go to `POST {base}/send`; media resolves through
/// `GET {base}/media/{id}`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChannelTransport for HttpTransport {
    async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()> {
        debug!(to, chars = text.len(), "sending reply through bridge");
        let response = self
            .http
            .post(format!("{}/send", self.base_url))
            .json(&SendRequest { to, text })
            .send()
            .await
            .context("bridge send request failed")?;
        if !response.status().is_success() {
            bail!("bridge refused the reply: {}", response.status());
        }
        Ok(())
    }

    async fn download_media(&self, media_id: &str) -> anyhow::Result<MediaPayload> {
        let response = self
            .http
            .get(format!("{}/media/{media_id}", self.base_url))
            .send()
            .await
            .context("bridge media request failed")?;
        if !response.status().is_success() {
            bail!("bridge has no media {media_id}: {}", response.status());
        }
        response
            .json::<MediaPayload>()
            .await
            .context("malformed media payload from bridge")
    }
}
