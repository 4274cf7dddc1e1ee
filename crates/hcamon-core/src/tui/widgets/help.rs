//! Key help line.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::tui::style::Styles;

const KEYS: &[(&str, &str)] = &[
    ("q", "quit"),
    ("p/space", "pause"),
    ("↑/↓", "select"),
];

pub fn render_help(frame: &mut Frame, area: Rect) {
    let spans: Vec<Span> = KEYS
        .iter()
        .flat_map(|(key, action)| {
            [
                Span::styled(format!(" {}", key), Styles::help_key()),
                Span::styled(format!(" {} ", action), Styles::help()),
            ]
        })
        .collect();
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
