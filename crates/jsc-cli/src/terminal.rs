//! Local terminal mode while a remote pty owns the screen.

use std::io::IsTerminal;

use nix::sys::termios::{self, SetArg, Termios};
use tracing::{debug, warn};

/// Puts stdin into raw mode and restores the saved settings on drop.
/// A no-op when stdin is not a terminal.
pub struct TerminalGuard {
    saved: Option<Termios>,
}

impl TerminalGuard {
    pub fn raw_stdin() -> nix::Result<Self> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            debug!("stdin is not a terminal, leaving it alone");
            return Ok(Self { saved: None });
        }
        let saved = termios::tcgetattr(&stdin)?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;
        Ok(Self { saved: Some(saved) })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take()
            && let Err(e) = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &saved)
        {
            warn!(error = %e, "failed to restore terminal settings");
        }
    }
}
