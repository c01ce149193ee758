//! Destination for container output lines.
//!
//! Output lines are not log records; they bypass `tracing` entirely so that
//! log filtering never hides what a container printed.

use parking_lot::Mutex;
use std::io::Write;

/// Receives every output line of every followed container
pub trait OutputSink: Send + Sync {
    fn container_output(&self, container: &str, line: &str);
}

/// Writes `"{container} | {line}"` to stdout
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for ConsoleOutput {
    fn container_output(&self, container: &str, line: &str) {
        let mut stdout = std::io::stdout().lock();
        // a closed stdout must not take the session down
        let _ = writeln!(stdout, "{container} | {line}");
    }
}

/// Collects lines in memory
#[derive(Debug, Default)]
pub struct MemoryOutput {
    lines: Mutex<Vec<(String, String)>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(container, line)` pairs in arrival order
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().clone()
    }

    pub fn lines_for(&self, container: &str) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(name, _)| name == container)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl OutputSink for MemoryOutput {
    fn container_output(&self, container: &str, line: &str) {
        self.lines
            .lock()
            .push((container.to_string(), line.to_string()));
    }
}
