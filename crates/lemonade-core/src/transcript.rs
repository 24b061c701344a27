use crate::state::{ChatMessage, ChatRole};

/// The ordered list of turns in one chat session.
///
/// All writes go through [`push_user`](Self::push_user),
/// [`merge_assistant`](Self::merge_assistant) and
/// [`push_fallback`](Self::push_fallback), which keeps at most one growing
/// assistant message per user turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    /// Show the accumulated assistant text for the current turn.
    ///
    /// Replaces the content of the last message when it is already the
    /// assistant's, otherwise starts the assistant message.
    pub fn merge_assistant(&mut self, accumulated: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == ChatRole::Assistant => {
                last.content = accumulated.to_string();
            }
            _ => self.messages.push(ChatMessage::assistant(accumulated)),
        }
    }

    /// Append a standalone assistant notice. Never merged into a partial reply.
    pub fn push_fallback(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(text));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_grow_one_assistant_message() {
        let fragments = ["Try", " the", " lavender", " one", "!"];
        for count in 1..=fragments.len() {
            let mut transcript = Transcript::new();
            transcript.push_user("What should I get?");

            let mut accumulated = String::new();
            for fragment in &fragments[..count] {
                accumulated.push_str(fragment);
                transcript.merge_assistant(&accumulated);
            }

            assert_eq!(transcript.len(), 2);
            let last = transcript.last().unwrap();
            assert_eq!(last.role, ChatRole::Assistant);
            assert_eq!(last.content, fragments[..count].concat());
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.merge_assistant("Hello");
        transcript.merge_assistant("Hello");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().unwrap().content, "Hello");
    }

    #[test]
    fn test_new_turn_starts_new_assistant_message() {
        let mut transcript = Transcript::new();
        transcript.push_user("first");
        transcript.merge_assistant("one");
        transcript.push_user("second");
        transcript.merge_assistant("two");

        let contents: Vec<&str> = transcript
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "one", "second", "two"]);
    }

    #[test]
    fn test_fallback_is_appended_after_partial_reply() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.merge_assistant("Half a sen");
        transcript.push_fallback("Sorry, I encountered an error. Please try again.");

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages()[1].content, "Half a sen");
        assert_eq!(
            transcript.last().unwrap().content,
            "Sorry, I encountered an error. Please try again."
        );
    }
}
