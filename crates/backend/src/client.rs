use std::time::Duration;

use {
    reqwest::{
        Client, StatusCode,
        multipart::{Form, Part},
    },
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use consult_common::ChatMessage;

use crate::error::{Error, Result};

/// Default overall budget for one backend request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Filename reported for uploaded diagnosis images.
const IMAGE_FILENAME: &str = "tongue.jpg";

/// HTTP client for the remote chat and vision backend.
///
/// One shared connection pool; the configured timeout applies per request
/// and classifies as [`Error::Timeout`] on expiry.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    id: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    messages: Vec<ChatMessage>,
}

/// The vision handlers answer with different field names depending on which
/// upstream produced the diagnosis; the first non-empty one wins.
#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl VisionResponse {
    fn into_diagnosis(self) -> Option<String> {
        [self.analysis, self.response, self.text]
            .into_iter()
            .flatten()
            .find(|t| !t.trim().is_empty())
    }
}

impl BackendClient {
    /// Build a client against `base_url` with the given per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send the full conversation history (prior turns plus the new user
    /// turn) and return the backend's updated history. The backend is
    /// authoritative: callers persist the returned sequence wholesale.
    pub async fn chat(&self, id: &str, messages: &[ChatMessage]) -> Result<Vec<ChatMessage>> {
        debug!(id, turns = messages.len(), "chat request");
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&ChatRequest { id, messages })
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        if body.messages.is_empty() {
            return Err(Error::InvalidResponse(
                "chat response carried no messages".into(),
            ));
        }
        Ok(body.messages)
    }

    /// Upload an image for diagnosis and return the diagnosis text.
    pub async fn vision(&self, image: Vec<u8>, mime_type: &str) -> Result<String> {
        debug!(bytes = image.len(), mime_type, "vision request");
        let part = Part::bytes(image)
            .file_name(IMAGE_FILENAME)
            .mime_str(mime_type)?;
        let form = Form::new().part("image", part);

        let response = self
            .http
            .post(format!("{}/api/vision", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: VisionResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        body.into_diagnosis().ok_or_else(|| {
            Error::InvalidResponse("vision response carried no diagnosis text".into())
        })
    }

    /// Startup probe. The chat endpoint is POST-only, so a GET answering
    /// 405 confirms the endpoint exists and the backend is reachable.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .http
            .get(format!("{}/api/chat", self.base_url))
            .send()
            .await?;
        Ok(response.status() == StatusCode::METHOD_NOT_ALLOWED)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Upstream { status, body })
}
