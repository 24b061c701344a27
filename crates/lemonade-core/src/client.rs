use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::profile::AssistantProfile;
use crate::sse::{SseDecoder, SseEvent, StreamLimits};
use crate::state::ChatMessage;

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// How a reply stream ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server sent `data: [DONE]`
    Sentinel,
    /// The body closed without a sentinel
    Closed,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    limits: StreamLimits,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            limits: StreamLimits::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config
            .functions_url
            .as_deref()
            .ok_or_else(|| ChatError::Config("functions_url is not configured".to_string()))?;
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ChatError::Config("api_key is not configured".to_string()))?;
        Ok(Self::new(base_url, api_key).with_limits(config.limits()))
    }

    pub fn with_limits(mut self, limits: StreamLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> StreamLimits {
        self.limits
    }

    pub fn endpoint(&self, profile: AssistantProfile) -> String {
        format!("{}/functions/v1/{}", self.base_url, profile.function_name())
    }

    /// Send the transcript and stream the assistant reply.
    ///
    /// `on_text` receives the whole reply accumulated so far each time a new
    /// fragment arrives. Non-success statuses and empty bodies are errors.
    pub async fn stream_chat<F>(
        &self,
        profile: AssistantProfile,
        messages: &[ChatMessage],
        on_text: F,
    ) -> Result<StreamEnd>
    where
        F: FnMut(&str),
    {
        let url = self.endpoint(profile);
        info!(assistant = profile.as_str(), turns = messages.len(), "starting chat stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&ChatRequest { messages })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .map(|body| body.error);
            warn!(%status, ?message, "chat function rejected the request");
            return Err(ChatError::Status { status, message });
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(ChatError::MissingBody);
        }

        read_reply(response.bytes_stream(), &self.limits, on_text).await
    }
}

/// Decode an SSE byte stream into accumulated reply text.
///
/// Reads one chunk at a time. Returns as soon as the `[DONE]` sentinel is
/// seen, or when the stream ends.
pub async fn read_reply<S, B, E, F>(
    body: S,
    limits: &StreamLimits,
    mut on_text: F,
) -> Result<StreamEnd>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ChatError>,
    F: FnMut(&str),
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new(*limits);
    let mut reply = String::new();
    let mut fragments = 0usize;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Into::<ChatError>::into)?;
        debug!(bytes = chunk.as_ref().len(), "received chunk");

        for event in decoder.push(chunk.as_ref())? {
            match event {
                SseEvent::Delta(text) => {
                    fragments += 1;
                    reply.push_str(&text);
                    on_text(&reply);
                }
                SseEvent::Done => {
                    info!(fragments, chars = reply.chars().count(), "chat stream completed");
                    return Ok(StreamEnd::Sentinel);
                }
            }
        }
    }

    decoder.finish();
    info!(fragments, chars = reply.chars().count(), "chat stream closed by server");
    Ok(StreamEnd::Closed)
}
