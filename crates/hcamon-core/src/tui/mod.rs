//! Terminal dashboard for live adapter counters.
//!
//! One table per link layer with one row per adapter, refreshed by running a
//! collection cycle on every tick.

mod app;
mod event;
mod input;
mod render;
pub(crate) mod state;
pub(crate) mod style;
pub mod widgets;

pub use app::App;
pub use state::AppState;
pub use widgets::{build_rows, weighted_widths};
