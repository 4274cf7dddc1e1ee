pub mod devices;
mod header;
mod help;

pub use devices::{build_rows, render_devices, weighted_widths};
pub use header::render_header;
pub use help::render_help;
