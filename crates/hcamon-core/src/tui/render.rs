//! Main rendering logic for TUI.

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};

use super::state::AppState;
use super::widgets::{render_devices, render_header, render_help};

/// Main render function.
pub fn render(frame: &mut Frame, state: &AppState) {
    let chunks = Layout::vertical([
        Constraint::Length(1), // Header
        Constraint::Min(3),    // Device tables
        Constraint::Length(1), // Help
    ])
    .split(frame.area());

    render_header(frame, chunks[0], state);
    render_devices(frame, chunks[1], state);
    render_help(frame, chunks[2]);
}
