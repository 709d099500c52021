//! Progress log sink
//!
//! Collection runs are long-lived and callers (CLI, UI) render progress
//! live. Components never print directly; they emit lines through an
//! injected [`LogSink`]. Diagnostic detail still goes through `tracing`.

use std::sync::Mutex;

/// A destination for human-readable progress lines.
pub trait LogSink: Send + Sync {
    fn line(&self, msg: &str);
}

/// Prints every line to standard output.
///
/// This is the CLI's sink: progress lines are plain text, and the final
/// machine-readable JSON line is emitted separately by the caller.
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn line(&self, msg: &str) {
        println!("{msg}");
    }
}

/// Discards every line.
pub struct NullSink;

impl LogSink for NullSink {
    fn line(&self, _msg: &str) {}
}

/// Buffers lines in memory for embedding callers and tests.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// True if any buffered line contains the fragment.
    pub fn contains(&self, fragment: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(fragment))
    }
}

impl LogSink for MemorySink {
    fn line(&self, msg: &str) {
        self.lines.lock().unwrap().push(msg.to_string());
    }
}
