//! Per-widget chat state
//!
//! Each mounted assistant owns one [`ChatSession`]: its transcript, the text
//! being typed and the lifecycle of the request in flight. The session is the
//! only writer of its transcript; streamed text reaches it as [`ReplyEvent`]s,
//! either inline through [`ChatSession::send`] or from a task started with
//! [`spawn_reply`].

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::client::{ChatClient, StreamEnd};
use crate::profile::AssistantProfile;
use crate::state::{ChatMessage, ChatRole};
use crate::transcript::Transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl Lifecycle {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Lifecycle::Sending | Lifecycle::Streaming)
    }
}

/// Progress of one request, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// Whole assistant reply accumulated so far
    Content(String),
    Completed(StreamEnd),
    /// Transport failure, with the reason for the log
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    profile: AssistantProfile,
    transcript: Transcript,
    input: String,
    lifecycle: Lifecycle,
}

impl ChatSession {
    pub fn new(profile: AssistantProfile) -> Self {
        let greeting = profile.greeting().map(ChatMessage::assistant);
        Self {
            profile,
            transcript: Transcript::from_messages(greeting.into_iter().collect()),
            input: String::new(),
            lifecycle: Lifecycle::Idle,
        }
    }

    pub fn profile(&self) -> AssistantProfile {
        self.profile
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Input stays disabled while this is true.
    pub fn is_loading(&self) -> bool {
        self.lifecycle.is_in_flight()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn can_submit(&self) -> bool {
        !self.is_loading() && !self.input.trim().is_empty()
    }

    /// Start a turn from the current input.
    ///
    /// Returns the payload to send (prior transcript plus the new user
    /// message), or `None` without touching anything when the input is blank
    /// or a request is already in flight.
    pub fn begin_turn(&mut self) -> Option<Vec<ChatMessage>> {
        if !self.can_submit() {
            return None;
        }

        let content = std::mem::take(&mut self.input);
        self.transcript.push_user(content);
        self.lifecycle = Lifecycle::Sending;
        Some(self.transcript.to_vec())
    }

    pub fn apply(&mut self, event: ReplyEvent) {
        if !self.is_loading() {
            debug!(assistant = self.profile.as_str(), ?event, "ignoring reply event with no request in flight");
            return;
        }

        match event {
            ReplyEvent::Content(text) => {
                self.transcript.merge_assistant(&text);
                self.lifecycle = Lifecycle::Streaming;
            }
            ReplyEvent::Completed(_) => {
                self.lifecycle = Lifecycle::Completed;
            }
            ReplyEvent::Failed(reason) => {
                error!(assistant = self.profile.as_str(), %reason, "chat error");
                // Partial text stays; the notice is its own message
                self.transcript.push_fallback(self.profile.fallback_message());
                self.lifecycle = Lifecycle::Failed;
            }
        }
    }

    /// True while waiting for the first fragment of the reply.
    pub fn show_typing_indicator(&self) -> bool {
        self.is_loading()
            && self
                .transcript
                .last()
                .map_or(true, |msg| msg.role == ChatRole::User)
    }

    /// Run a whole turn inline and return where the lifecycle ended.
    pub async fn send(&mut self, client: &ChatClient) -> Lifecycle {
        let Some(payload) = self.begin_turn() else {
            return self.lifecycle;
        };

        let profile = self.profile;
        let result = client
            .stream_chat(profile, &payload, |text| {
                self.apply(ReplyEvent::Content(text.to_string()))
            })
            .await;

        self.apply(match result {
            Ok(end) => ReplyEvent::Completed(end),
            Err(err) => ReplyEvent::Failed(err.to_string()),
        });
        self.lifecycle
    }
}

/// Stream a reply on a background task, handing every event to `sink`.
///
/// The last event is always `Completed` or `Failed`.
pub fn spawn_reply<F>(
    client: ChatClient,
    profile: AssistantProfile,
    payload: Vec<ChatMessage>,
    mut sink: F,
) -> JoinHandle<()>
where
    F: FnMut(ReplyEvent) + Send + 'static,
{
    tokio::spawn(async move {
        let result = client
            .stream_chat(profile, &payload, |text| {
                sink(ReplyEvent::Content(text.to_string()))
            })
            .await;

        sink(match result {
            Ok(end) => ReplyEvent::Completed(end),
            Err(err) => ReplyEvent::Failed(err.to_string()),
        });
    })
}
