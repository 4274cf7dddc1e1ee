//! Keyboard input handling.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::state::AppState;

/// What the main loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Quit,
}

/// Handles a key press.
pub fn handle_key(state: &mut AppState, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => KeyAction::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,

        KeyCode::Char('p') | KeyCode::Char('P') | KeyCode::Char(' ') => {
            state.toggle_pause();
            KeyAction::None
        }

        KeyCode::Down | KeyCode::Char('j') => {
            state.select_next();
            KeyAction::None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.select_prev();
            KeyAction::None
        }

        _ => KeyAction::None,
    }
}
