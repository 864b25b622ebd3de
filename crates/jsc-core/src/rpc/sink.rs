//! Destinations for remote output forwarded by the client.

use std::io::Write;
use std::sync::Mutex;

/// Where `stdout`/`stderr` notifications end up.
///
/// Implementations must be safe to share; the client holds one behind an
/// `Arc` and writes from whichever task drives the call.
pub trait OutputSink: Send + Sync {
    fn stdout(&self, data: &[u8]);
    fn stderr(&self, data: &[u8]);
}

/// Writes to the process' own stdout and stderr, flushing every chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl OutputSink for StdioSink {
    fn stdout(&self, data: &[u8]) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(data).and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "failed to write remote stdout");
        }
    }

    fn stderr(&self, data: &[u8]) {
        let mut err = std::io::stderr().lock();
        if let Err(e) = err.write_all(data).and_then(|()| err.flush()) {
            tracing::debug!(error = %e, "failed to write remote stderr");
        }
    }
}

/// Collects output in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout_text(&self) -> String {
        let buf = self.stdout.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        let buf = self.stderr.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl OutputSink for MemorySink {
    fn stdout(&self, data: &[u8]) {
        self.stdout
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(data);
    }

    fn stderr(&self, data: &[u8]) {
        self.stderr
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(data);
    }
}
