//! Main TUI application.

use std::io;
use std::time::Duration;

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{debug, warn};

use crate::provider::CycleProvider;

use super::event::{Event, EventHandler};
use super::input::{KeyAction, handle_key};
use super::render::render;
use super::state::AppState;

/// Main TUI application.
pub struct App {
    provider: Box<dyn CycleProvider>,
    state: AppState,
    should_quit: bool,
}

impl App {
    /// Creates a new App with the given provider.
    pub fn new(provider: Box<dyn CycleProvider>) -> Self {
        Self {
            provider,
            state: AppState::new(),
            should_quit: false,
        }
    }

    /// Runs the TUI application.
    pub fn run(mut self, tick_rate: Duration) -> io::Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let events = EventHandler::new(tick_rate);

        // Initial data fetch
        self.advance();

        loop {
            terminal.draw(|frame| render(frame, &self.state))?;

            match events.next() {
                Ok(event) => self.handle_event(event),
                Err(_) => self.should_quit = true,
            }

            if self.should_quit {
                break;
            }
        }

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Tick => {
                if !self.state.paused {
                    self.advance();
                }
            }
            Event::Key(key) => {
                if handle_key(&mut self.state, key) == KeyAction::Quit {
                    self.should_quit = true;
                }
            }
            // table widths come from the frame area on every draw
            Event::Resize => {}
        }
    }

    /// Runs one collection cycle and feeds it to the dashboard.
    fn advance(&mut self) {
        let cycle = self.provider.advance().cloned();
        match cycle {
            Some(cycle) => {
                if let Some(timing) = self.provider.collector_timing() {
                    debug!("cycle collected in {:?}", timing.total);
                }
                self.state.apply_cycle(cycle);
            }
            None => {
                let message = self
                    .provider
                    .last_error()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "collection failed".to_string());
                warn!("{}", message);
                self.state.last_error = Some(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Collector;
    use crate::collector::mock::scenarios::{DEBUGFS_ROOT, SYSFS_ROOT};
    use crate::collector::mock::{MockFs, MockRunner};
    use crate::config::CollectorConfig;
    use crate::provider::LiveProvider;
    use std::sync::Arc;

    fn app(fs: MockFs, runner: MockRunner) -> App {
        let config = CollectorConfig {
            sysfs_root: SYSFS_ROOT.into(),
            debugfs_root: DEBUGFS_ROOT.into(),
            ..CollectorConfig::default()
        };
        let collector = Collector::new(fs, Arc::new(runner), config);
        App::new(Box::new(LiveProvider::new(collector)))
    }

    #[test]
    fn test_advance_applies_cycle() {
        let mut app = app(MockFs::roce_host(), MockRunner::roce_host());
        app.advance();
        assert_eq!(app.state.device_count(), 2);
        assert!(app.state.last_error.is_none());
        assert!(!app.state.rates.is_empty());
    }

    #[test]
    fn test_event_dispatch() {
        use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

        let mut app = app(MockFs::roce_host(), MockRunner::roce_host());
        app.handle_event(Event::Resize);
        assert!(app.state.current.is_none());
        assert!(!app.should_quit);

        app.handle_event(Event::Tick);
        assert_eq!(app.state.device_count(), 2);

        app.handle_event(Event::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(app.should_quit);
    }

    #[test]
    fn test_paused_tick_does_not_collect() {
        let mut app = app(MockFs::roce_host(), MockRunner::roce_host());
        app.state.toggle_pause();
        app.handle_event(Event::Tick);
        assert!(app.state.current.is_none());
    }

    #[test]
    fn test_advance_keeps_previous_cycle_on_error() {
        let mut app = app(MockFs::new(), MockRunner::new());
        app.advance();
        assert!(app.state.current.is_none());
        assert!(app.state.last_error.as_deref().unwrap().contains("Collection error"));
    }
}
