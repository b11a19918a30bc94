use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode};
use crate::feed::{FillState, Message, MessageStatus, Viewport};
use crate::format;
use crate::relay::{short_key, ConnectionState};

mod markup;

use markup::markup_to_lines;

/// Draw one frame and report how the feed was laid out.
pub fn draw(f: &mut Frame<'_>, app: &App) -> Viewport {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Input area
        ])
        .split(size);

    draw_title_bar(f, app, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(75), // Feed
            Constraint::Percentage(25), // Info panel
        ])
        .split(chunks[1]);

    let viewport = draw_feed(f, app, main_chunks[0]);
    draw_info_panel(f, app, main_chunks[1]);
    draw_input_area(f, app, chunks[2]);

    viewport
}

fn state_label(app: &App) -> &str {
    match app.connection_state() {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting...",
        ConnectionState::Connected => "connected",
        ConnectionState::Failed => app.connection_error.as_deref().unwrap_or("failed"),
    }
}

fn state_style(state: ConnectionState) -> Style {
    match state {
        ConnectionState::Connected => Style::default().fg(Color::Green),
        ConnectionState::Connecting => Style::default().fg(Color::Yellow),
        ConnectionState::Disconnected | ConnectionState::Failed => {
            Style::default().fg(Color::Red)
        }
    }
}

fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let title = format!(
        " librx | {} | #{} | {} ",
        app.engine.author().alias,
        app.engine.community_id(),
        state_label(app),
    );

    let title_block = Block::default()
        .borders(Borders::ALL)
        .style(state_style(app.connection_state()))
        .title(" librx ");

    let title_paragraph = Paragraph::new(title)
        .block(title_block)
        .alignment(Alignment::Center);

    f.render_widget(title_paragraph, area);
}

fn message_lines(message: &Message, own_key: &str) -> Vec<Line<'static>> {
    let timestamp = message
        .local_time()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "----------------".to_string());
    let nick_color = if message.author_public_key == own_key {
        Color::Green
    } else {
        Color::Magenta
    };
    let alias = if message.author_alias.is_empty() {
        short_key(&message.author_public_key)
    } else {
        message.author_alias.clone()
    };

    let mut prefix = vec![
        Span::styled(format!("[{}] ", timestamp), Style::default().fg(Color::Gray)),
        Span::styled(format!("<{}> ", alias), Style::default().fg(nick_color)),
    ];
    match message.status {
        MessageStatus::Approved => {}
        MessageStatus::Pending => {
            prefix.push(Span::styled("(pending) ", Style::default().fg(Color::Yellow)));
        }
        MessageStatus::Rejected => {
            prefix.push(Span::styled("(rejected) ", Style::default().fg(Color::Red)));
        }
    }

    let mut lines = markup_to_lines(&format::format(&message.content), Style::default());
    if let Some(first) = lines.first_mut() {
        prefix.append(&mut first.spans);
        first.spans = prefix;
    }
    lines
}

/// Rows a line takes once wrapped to `width`.
fn wrapped_height(line: &Line<'_>, width: u16) -> u32 {
    let width = width.max(1) as usize;
    line.width().max(1).div_ceil(width) as u32
}

fn draw_feed(f: &mut Frame, app: &App, area: Rect) -> Viewport {
    let mut title = format!(" #{} ", app.engine.community_id());
    if let Some(date) = app.view.date {
        title.push_str(&format!("({}) ", date));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let own_key = &app.engine.author().public_key;
    let mut lines = Vec::new();
    for message in app.feed() {
        lines.extend(message_lines(&message, own_key));
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No messages yet. Press 'i' to write one, or /help for commands.",
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    }

    let content_height = lines.iter().map(|l| wrapped_height(l, inner.width)).sum();
    let scroll = app.scroll_offset.min(u16::MAX as u32) as u16;

    let messages_widget = Paragraph::new(lines)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));

    f.render_widget(messages_widget, inner);

    Viewport {
        content_height,
        viewport_height: inner.height as u32,
        scroll_offset: app.scroll_offset,
    }
}

fn draw_info_panel(f: &mut Frame<'_>, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Identity
            Constraint::Length(3), // Connection
            Constraint::Length(6), // Feed
            Constraint::Min(0),    // Status log
        ])
        .split(area);

    let author = app.engine.author();
    let key_preview: String = author.public_key.chars().take(16).collect();
    let identity_text = vec![
        Line::from(vec![
            Span::raw("Alias: "),
            Span::styled(author.alias.clone(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("Key: "),
            Span::styled(format!("{}...", key_preview), Style::default().fg(Color::Gray)),
        ]),
    ];
    let identity_block = Block::default()
        .borders(Borders::ALL)
        .title(" Identity ")
        .style(Style::default().fg(Color::Blue));
    f.render_widget(Paragraph::new(identity_text).block(identity_block), chunks[0]);

    let connection_text = Line::from(vec![
        Span::raw("Status: "),
        Span::styled(
            state_label(app).to_string(),
            state_style(app.connection_state()),
        ),
    ]);
    let connection_block = Block::default()
        .borders(Borders::ALL)
        .title(" Connection ")
        .style(Style::default().fg(Color::Blue));
    f.render_widget(Paragraph::new(connection_text).block(connection_block), chunks[1]);

    let backfill = match app.paginator.fill_state() {
        _ if app.paginator.is_fetching() => "fetching".to_string(),
        FillState::Idle => "idle".to_string(),
        FillState::Filling { rounds, .. } => format!("filling ({})", rounds),
        FillState::Settled => "settled".to_string(),
    };
    let feed_text = vec![
        Line::from(format!("Cached: {}", app.cached_count())),
        Line::from(format!(
            "Order: {}",
            if app.view.sort_by_newest { "newest first" } else { "oldest first" }
        )),
        Line::from(format!(
            "Anchor: {}",
            app.paginator
                .last_anchor()
                .with_timezone(&chrono::Local)
                .format("%m-%d %H:%M")
        )),
        Line::from(format!("Backfill: {}", backfill)),
    ];
    let feed_block = Block::default()
        .borders(Borders::ALL)
        .title(" Feed ")
        .style(Style::default().fg(Color::Blue));
    f.render_widget(Paragraph::new(feed_text).block(feed_block), chunks[2]);

    let status_block = Block::default()
        .borders(Borders::ALL)
        .title(" Status ")
        .style(Style::default().fg(Color::Blue));
    let visible = chunks[3].height.saturating_sub(2) as usize;
    let start = app.status_messages.len().saturating_sub(visible);
    let items: Vec<ListItem> = app.status_messages[start..]
        .iter()
        .map(|m| ListItem::new(m.as_str()).style(Style::default().fg(Color::White)))
        .collect();
    f.render_widget(List::new(items).block(status_block), chunks[3]);
}

fn draw_input_area(f: &mut Frame, app: &App, area: Rect) {
    let input_style = match app.input_mode {
        InputMode::Normal => Style::default().fg(Color::White),
        InputMode::Editing => Style::default().fg(Color::Green),
    };

    let mode_indicator = match app.input_mode {
        InputMode::Normal => "[NORMAL] Press 'i' to enter input mode",
        InputMode::Editing => "[INPUT] ESC=normal, ENTER=send",
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .title(mode_indicator)
        .style(input_style);

    let input_text = if app.input_mode == InputMode::Editing {
        app.input.as_str()
    } else {
        ""
    };

    let input_paragraph = Paragraph::new(input_text)
        .block(input_block)
        .wrap(Wrap { trim: false });

    f.render_widget(input_paragraph, area);

    if app.input_mode == InputMode::Editing {
        let column = app.input[..app.cursor_position].chars().count() as u16;
        f.set_cursor(area.x + column + 1, area.y + 1);
    }
}
