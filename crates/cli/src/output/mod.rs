//! Output formatting
//!
//! Human-readable output with optional colors, or strict JSON.

mod formatter;

pub use formatter::Formatter;

/// Output settings shared by every command
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Emit JSON instead of human-readable text
    pub json: bool,
    /// Disable colors
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
