pub mod client;
pub mod config;
pub mod error;
pub mod profile;
pub mod session;
pub mod sse;
pub mod state;
pub mod transcript;

// Re-export main types for convenience
pub use client::{read_reply, ChatClient, StreamEnd};
pub use config::Config;
pub use error::{ChatError, Result};
pub use profile::AssistantProfile;
pub use session::{spawn_reply, ChatSession, Lifecycle, ReplyEvent};
pub use sse::{SseDecoder, SseEvent, StreamLimits};
pub use state::{ChatMessage, ChatRole};
pub use transcript::Transcript;
