//! Per-plugin short-circuit signal.

use tokio_util::sync::CancellationToken;

/// One-shot monotone edge that permanently stops a plugin.
///
/// `set` is idempotent; once set the latch stays set forever and every
/// clone observes it. [`signaled`](ShortCircuitLatch::signaled) completes
/// the first time a set is observed, without polling; the worker races it
/// against an in-flight `process_line` call.
#[derive(Debug, Clone, Default)]
pub struct ShortCircuitLatch {
    token: CancellationToken,
}

impl ShortCircuitLatch {
    /// Create a new unset latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Idempotent.
    pub fn set(&self) {
        self.token.cancel();
    }

    /// Check whether the latch has been set
    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes the first time `set()` is observed. Completes immediately
    /// if the latch is already set.
    pub async fn signaled(&self) {
        self.token.cancelled().await;
    }
}
