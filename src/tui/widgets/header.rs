//! Header widget for the TUI.
//!
//! Displays the application name, version, and database connection info.

use super::spinner::Spinner;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::Span,
    widgets::Widget,
};

/// Header bar widget.
pub struct Header<'a> {
    connection_info: &'a str,
    spinner: Option<&'a Spinner>,
}

impl<'a> Header<'a> {
    pub fn new(connection_info: &'a str, spinner: Option<&'a Spinner>) -> Self {
        Self {
            connection_info,
            spinner,
        }
    }
}

/// Left-hand header text.
pub fn title() -> String {
    format!(" sqlpipe v{}", env!("CARGO_PKG_VERSION"))
}

impl Widget for Header<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 {
            return;
        }

        let style = Style::default()
            .bg(Color::Blue)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD);

        for x in area.left()..area.right() {
            buf[(x, area.y)].set_style(style);
        }

        let left_span = Span::styled(title(), style);
        buf.set_span(area.x, area.y, &left_span, area.width);

        if let Some(spinner) = self.spinner {
            let text = spinner.display();
            let spinner_style = style.fg(Color::Yellow);
            let width = text.chars().count() as u16;
            let x = area.x + area.width.saturating_sub(width) / 2;
            buf.set_string(x, area.y, &text, spinner_style);
        }

        let right_text = format!(" [db: {}] ", self.connection_info);
        let right_width = right_text.chars().count() as u16;
        if right_width < area.width {
            let right_x = area.right().saturating_sub(right_width);
            buf.set_string(right_x, area.y, &right_text, style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect()
    }

    #[test]
    fn test_header_shows_version_and_connection() {
        let area = Rect::new(0, 0, 60, 1);
        let mut buf = Buffer::empty(area);
        Header::new("TPC-H @ localhost:5432", None).render(area, &mut buf);

        let text = row_text(&buf, 0);
        assert!(text.starts_with(" sqlpipe v"));
        assert!(text.contains("[db: TPC-H @ localhost:5432]"));
    }
}
