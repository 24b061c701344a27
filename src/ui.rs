use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use lemonade_core::{AssistantProfile, ChatRole, ChatSession};
use crate::app::{App, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn accent(profile: AssistantProfile) -> Color {
    match profile {
        AssistantProfile::Customer => Color::Yellow,
        AssistantProfile::Admin => Color::Red,
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, body_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(" Lemonade Stand ", Style::default().fg(Color::Yellow).bold())];

    for session in &app.sessions {
        let profile = session.profile();
        let style = if profile == app.active {
            Style::default().fg(Color::Black).bg(accent(profile)).bold()
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {} ", profile.display_name()), style));
    }

    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints: Vec<(&str, &str)> = match app.input_mode {
        InputMode::Normal => vec![("i", "type"), ("j/k", "scroll"), ("G", "bottom"), ("q", "quit")],
        InputMode::Editing => vec![("Enter", "send"), ("Esc", "done")],
    };
    if app.input_mode == InputMode::Normal && app.can_switch() {
        hints.insert(1, ("Tab", "switch assistant"));
    }

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {key} "), key_style));
        spans.push(Span::styled(format!(" {label} "), label_style));
        spans.push(Span::raw(" "));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Transcript lines for one session, one entry per source line
fn chat_lines(session: &ChatSession, animation_frame: u8) -> Vec<Line<'static>> {
    let profile = session.profile();
    let color = accent(profile);
    let mut lines: Vec<Line<'static>> = Vec::new();
    let assistant_label = format!("{}:", profile.display_name());

    for msg in session.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    assistant_label.clone(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if session.show_typing_indicator() {
        lines.push(Line::from(Span::styled(
            assistant_label,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let session = app.session();
    let profile = session.profile();
    let color = accent(profile);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {} ", profile.display_name()));

    let chat_text = if session.messages().is_empty() && !session.is_loading() {
        Text::from(Span::styled(
            profile.empty_hint(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(chat_lines(session, app.animation_frame))
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    // Input box, dimmed while a reply is streaming
    let editing = app.input_mode == InputMode::Editing;
    let loading = session.is_loading();
    let input_border_color = if loading {
        Color::DarkGray
    } else if editing {
        color
    } else {
        Color::Gray
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(if loading { " Waiting for reply... " } else { " Ask " });

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input = if session.input().is_empty() && !editing {
        Paragraph::new(Span::styled(profile.placeholder(), Style::default().fg(Color::DarkGray)))
    } else {
        let visible_text: String = session
            .input()
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(input.block(input_block), input_area);

    // Show cursor when editing
    if editing && !loading {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}
