use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Destination for the user-facing protocol lines (start, replies, timeouts, summary).
pub struct Console {
    out: Box<dyn Write + Send>,
}

impl Console {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writes one line. Output failures are logged, never fatal to the session.
    pub fn line(&mut self, line: impl std::fmt::Display) {
        if let Err(e) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            warn!("Failed to write console output: {}", e);
        }
    }

    /// Writes pre-formatted text as-is.
    pub fn write_raw(&mut self, text: &str) {
        if let Err(e) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
        {
            warn!("Failed to write console output: {}", e);
        }
    }
}

/// Clonable in-memory sink, used to capture console output in tests and scenario runs.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn console(&self) -> Console {
        Console::new(self.clone())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
