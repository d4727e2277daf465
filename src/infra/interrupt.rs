// ============================================================
// Layer 6 — Interrupt Flag
// ============================================================
// Ctrl-C must not kill the process mid-epoch: the best
// checkpoint still has to be restored and the predictions
// written. The signal handler only flips an atomic flag; the
// training loop polls it before every batch and ends the
// epoch early when it is set. A second Ctrl-C exits at once
// with status 130.

use anyhow::Result;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Exit status for a forced quit (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag that is set when the process receives Ctrl-C.
    /// Can only be called once per process.
    pub fn install_ctrlc() -> Result<Self> {
        let stop    = Self::new();
        let handler = stop.clone();
        ctrlc::set_handler(move || {
            if handler.signal() {
                tracing::warn!("Second interrupt received, exiting without saving");
                std::process::exit(FORCED_EXIT_CODE);
            }
            tracing::warn!("Interrupt received, finishing at the next batch boundary (Ctrl-C again to quit)");
        })
        .map_err(|e| anyhow::anyhow!("Failed to install Ctrl-C handler: {e}"))?;
        Ok(stop)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Set the flag and report whether it was already set.
    pub fn signal(&self) -> bool {
        self.flag.swap(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let stop  = StopFlag::new();
        let other = stop.clone();
        assert!(!stop.is_set());
        other.signal();
        assert!(stop.is_set());
    }

    #[test]
    fn test_second_signal_is_reported() {
        let stop    = StopFlag::new();
        let handler = stop.clone();
        assert!(!handler.signal(), "first interrupt only requests a stop");
        assert!(stop.is_set());
        assert!(handler.signal(), "second interrupt forces the exit");
    }
}
