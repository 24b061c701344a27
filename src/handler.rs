use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => app.scroll_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Reply { profile, event } => app.apply_reply(profile, event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.session().input().chars().count();
        }

        KeyCode::Tab => app.next_assistant(),

        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') | KeyCode::Home => app.chat_scroll = 0,
        KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.input_mode = InputMode::Normal;
        return;
    }

    // Input is disabled while a reply is streaming
    if app.session().is_loading() {
        return;
    }

    let cursor = app.input_cursor;
    match key.code {
        KeyCode::Enter => {
            if app.submit() {
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Backspace => {
            if cursor > 0 {
                let input = app.session_mut().input_mut();
                let byte_pos = char_to_byte_index(input, cursor - 1);
                input.remove(byte_pos);
                app.input_cursor -= 1;
            }
        }
        KeyCode::Delete => {
            let input = app.session_mut().input_mut();
            if cursor < input.chars().count() {
                let byte_pos = char_to_byte_index(input, cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.session().input().chars().count();
            app.input_cursor = (cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.session().input().chars().count();
        }
        KeyCode::Char(c) => {
            let input = app.session_mut().input_mut();
            let byte_pos = char_to_byte_index(input, cursor);
            input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}
