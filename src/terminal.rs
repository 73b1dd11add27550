//! Terminal widget seam.
//!
//! The host UI owns the actual terminal emulator; sessions only need to
//! write into whichever instance is mounted for them.

use std::io::Write;

/// A mounted terminal widget.
///
/// Writes happen while the session registry is locked, so implementations
/// must not call back into the registry.
pub trait Terminal: Send + Sync {
    fn write_text(&self, text: &str);

    fn write_bytes(&self, bytes: &[u8]);

    fn focus(&self) {}

    /// Resize hook, invoked when the terminal is mounted
    fn fit(&self) {}
}

/// Neutral marker written when a stream or socket ends without error
pub fn closed_marker(text: &str) -> String {
    format!("\r\n\x1b[2m[{text}]\x1b[0m\r\n")
}

/// Red marker written when a stream or socket fails
pub fn error_marker(message: &str) -> String {
    format!("\r\n\x1b[31m[error] {message}\x1b[0m\r\n")
}

/// Terminal backed by the process's stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutTerminal;

impl Terminal for StdoutTerminal {
    fn write_text(&self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    fn write_bytes(&self, bytes: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(bytes).and_then(|_| stdout.flush()) {
            tracing::debug!(error = %e, "Failed to write to stdout");
        }
    }
}
