//! Header widget showing time, mode and device summary.

use chrono::Local;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::widgets::Paragraph;

use crate::tui::state::AppState;
use crate::tui::style::{Styles, Theme};

/// Renders the header bar.
pub fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
    let chunks = Layout::horizontal([
        Constraint::Length(21), // Time
        Constraint::Length(10), // Mode
        Constraint::Min(20),    // Devices
        Constraint::Length(40), // Status
    ])
    .split(area);

    let time_str = Local::now().format(" %Y-%m-%d %H:%M:%S").to_string();
    frame.render_widget(Paragraph::new(time_str).style(Styles::header()), chunks[0]);

    let (mode_str, mode_style) = if state.paused {
        (" PAUSED ", Styles::warn().bg(Theme::HEADER_BG))
    } else {
        (" LIVE ", Styles::header())
    };
    frame.render_widget(Paragraph::new(mode_str).style(mode_style), chunks[1]);

    let links: Vec<String> = state
        .link_layers()
        .iter()
        .map(|l| l.to_string())
        .collect();
    let devices = if links.is_empty() {
        format!("{} devices", state.device_count())
    } else {
        format!("{} devices ({})", state.device_count(), links.join(", "))
    };
    frame.render_widget(Paragraph::new(devices).style(Styles::header()), chunks[2]);

    let (status, status_style) = match &state.last_error {
        Some(err) => (err.clone(), Styles::critical().bg(Theme::HEADER_BG)),
        None => (String::new(), Styles::header()),
    };
    frame.render_widget(Paragraph::new(status).style(status_style), chunks[3]);
}
