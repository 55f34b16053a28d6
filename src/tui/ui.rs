//! UI rendering for the TUI.
//!
//! Header on top, the SQL editor on the left, the plan and pipe syntax panes
//! stacked on the right, and a status line at the bottom.

use super::app::{App, Focus, Status};
use super::widgets::header::Header;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

const KEY_HINTS: &str = "F5/Ctrl+R run  Tab focus  PgUp/PgDn scroll  Esc quit";

/// Renders the entire UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Min(3),    // Panes
            Constraint::Length(1), // Status
        ])
        .split(area);

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(main_layout[1]);

    let output_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(content_layout[1]);

    frame.render_widget(
        Header::new(&app.connection_info, app.spinner()),
        main_layout[0],
    );
    render_editor(frame, content_layout[0], app);
    render_output(
        frame,
        output_layout[0],
        "Query Execution Plan",
        &app.plan_text,
        app.plan_scroll,
        app.focus == Focus::Plan,
    );
    render_output(
        frame,
        output_layout[1],
        "Pipe Syntax Version",
        &app.pipe_text,
        app.pipe_scroll,
        app.focus == Focus::Pipe,
    );
    render_status(frame, main_layout[2], app);
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().add_modifier(Modifier::BOLD),
        ))
}

fn render_editor(frame: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::Editor;
    let inner_height = area.height.saturating_sub(2) as usize;
    let (row, col) = app.editor.cursor();

    // Keep the cursor row visible
    let top = row.saturating_sub(inner_height.saturating_sub(1));
    let lines: Vec<Line> = app
        .editor
        .lines()
        .iter()
        .map(|line| Line::raw(line.as_str()))
        .collect();

    let paragraph = Paragraph::new(lines)
        .block(pane_block("SQL", focused))
        .scroll((top as u16, 0));
    frame.render_widget(paragraph, area);

    if focused {
        // Account for the border (1)
        let cursor_x = area.x + 1 + col as u16;
        let cursor_y = area.y + 1 + (row - top) as u16;
        if cursor_x < area.right().saturating_sub(1) && cursor_y < area.bottom().saturating_sub(1)
        {
            frame.set_cursor_position((cursor_x, cursor_y));
        }
    }
}

fn render_output(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    text: &str,
    scroll: u16,
    focused: bool,
) {
    let paragraph = Paragraph::new(text)
        .block(pane_block(title, focused))
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let (text, style) = match &app.status {
        Status::Idle => (KEY_HINTS.to_string(), Style::default().fg(Color::Gray)),
        Status::Running(spinner) => (spinner.display(), Style::default().fg(Color::Yellow)),
        Status::Ok(msg) => (format!("✓ {msg}"), Style::default().fg(Color::Green)),
        Status::Error(msg) => (
            format!("✗ {}", msg.lines().next().unwrap_or_default()),
            Style::default().fg(Color::Red),
        ),
    };
    frame.render_widget(Paragraph::new(Line::styled(text, style)), area);
}
