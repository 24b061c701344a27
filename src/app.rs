use std::collections::HashMap;

use lemonade_core::{spawn_reply, AssistantProfile, ChatClient, ChatSession, ReplyEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub active: AssistantProfile,

    // One session per mounted assistant
    pub sessions: Vec<ChatSession>,
    pub input_cursor: usize, // cursor position in the active session's input

    // Chat view state
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Streaming
    pub client: ChatClient,
    pub events: mpsc::UnboundedSender<AppEvent>,
    pub reply_tasks: HashMap<AssistantProfile, JoinHandle<()>>,
}

impl App {
    pub fn new(client: ChatClient, is_admin: bool, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let sessions = AssistantProfile::available(is_admin)
            .into_iter()
            .map(ChatSession::new)
            .collect();

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            active: AssistantProfile::Customer,
            sessions,
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            client,
            events,
            reply_tasks: HashMap::new(),
        }
    }

    pub fn session(&self) -> &ChatSession {
        self.sessions
            .iter()
            .find(|s| s.profile() == self.active)
            .unwrap_or(&self.sessions[0])
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        let idx = self
            .sessions
            .iter()
            .position(|s| s.profile() == self.active)
            .unwrap_or(0);
        &mut self.sessions[idx]
    }

    pub fn session_for_mut(&mut self, profile: AssistantProfile) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.profile() == profile)
    }

    pub fn can_switch(&self) -> bool {
        self.sessions.len() > 1
    }

    /// Cycle to the next mounted assistant
    pub fn next_assistant(&mut self) {
        if !self.can_switch() {
            return;
        }
        let idx = self
            .sessions
            .iter()
            .position(|s| s.profile() == self.active)
            .unwrap_or(0);
        self.active = self.sessions[(idx + 1) % self.sessions.len()].profile();
        self.input_cursor = self.session().input().chars().count();
        self.chat_scroll = 0;
        self.scroll_to_bottom();
    }

    /// Send the active session's input. Returns false when nothing was sent.
    pub fn submit(&mut self) -> bool {
        let Some(payload) = self.session_mut().begin_turn() else {
            return false;
        };
        self.input_cursor = 0;

        let profile = self.active;
        let events = self.events.clone();
        let handle = spawn_reply(self.client.clone(), profile, payload, move |event| {
            let _ = events.send(AppEvent::Reply { profile, event });
        });
        self.reply_tasks.insert(profile, handle);

        // Scroll to bottom so the typing indicator is visible
        self.scroll_to_bottom();
        true
    }

    /// Route a streamed reply event to the session that asked for it
    pub fn apply_reply(&mut self, profile: AssistantProfile, event: ReplyEvent) {
        let finished = matches!(event, ReplyEvent::Completed(_) | ReplyEvent::Failed(_));
        match self.session_for_mut(profile) {
            Some(session) => session.apply(event),
            None => debug!(assistant = profile.as_str(), "reply for unmounted assistant"),
        }
        if finished {
            self.reply_tasks.remove(&profile);
        }
        if profile == self.active {
            self.scroll_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session().is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat to bottom so the newest text is visible
    pub fn scroll_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.session().messages() {
            total_lines = total_lines.saturating_add(1); // Role line ("You:" or assistant name)
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count / wrap_width + 1 };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.session().show_typing_indicator() {
            total_lines = total_lines.saturating_add(2);
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    /// Abort replies still streaming
    pub fn shutdown(&mut self) {
        for (_, handle) in self.reply_tasks.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lemonade_core::{ChatRole, Lifecycle, StreamEnd};

    fn app(is_admin: bool) -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(ChatClient::new("http://127.0.0.1:1", "pk"), is_admin, tx)
    }

    #[test]
    fn test_customer_only_without_admin() {
        let mut app = app(false);
        assert_eq!(app.sessions.len(), 1);
        app.next_assistant();
        assert_eq!(app.active, AssistantProfile::Customer);
    }

    #[test]
    fn test_admin_can_switch_assistants() {
        let mut app = app(true);
        app.next_assistant();
        assert_eq!(app.active, AssistantProfile::Admin);
        assert!(app.session().messages().is_empty());
        app.next_assistant();
        assert_eq!(app.active, AssistantProfile::Customer);
    }

    #[test]
    fn test_blank_submit_sends_nothing() {
        let mut app = app(false);
        app.session_mut().set_input("  ");
        assert!(!app.submit());
        assert!(app.reply_tasks.is_empty());
        assert_eq!(app.session().messages().len(), 1);
    }

    #[tokio::test]
    async fn test_replies_reach_their_own_session() {
        let mut app = app(true);
        app.next_assistant();
        app.session_mut().set_input("Stock levels?");
        assert!(app.submit());
        app.next_assistant();

        app.apply_reply(AssistantProfile::Admin, ReplyEvent::Content("All good".to_string()));
        app.apply_reply(AssistantProfile::Admin, ReplyEvent::Completed(StreamEnd::Sentinel));

        let admin = app.session_for_mut(AssistantProfile::Admin).unwrap();
        assert_eq!(admin.lifecycle(), Lifecycle::Completed);
        assert_eq!(admin.messages().last().unwrap().role, ChatRole::Assistant);
        assert_eq!(admin.messages().last().unwrap().content, "All good");
        assert!(app.reply_tasks.is_empty());
        assert_eq!(app.session().messages().len(), 1);
        app.shutdown();
    }

    #[test]
    fn test_scroll_to_bottom_counts_wrapped_lines() {
        let mut app = app(false);
        app.chat_width = 10;
        app.chat_height = 4;
        // Greeting: role line, 6 wrapped lines, blank line
        app.scroll_to_bottom();
        assert_eq!(app.chat_scroll, 4);
    }
}
