//! Per-plugin worker task.
//!
//! One worker drives one plugin through its lifecycle: initialize, the
//! steady-state drain, the post-finish drain, and end-of-run reporting.
//! The latch is the only thing allowed to abandon an in-flight
//! `process_line`; cancellation of the run token merely moves the worker
//! from the steady-state drain to the post-finish drain.

use crate::host::PluginState;
use crate::plugin::LogPlugin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long the worker sleeps when its queue runs dry.
const IDLE_BACKOFF: Duration = Duration::from_millis(500);

pub(crate) struct PluginWorker {
    plugin: Arc<dyn LogPlugin>,
    state: Arc<PluginState>,
    run_token: CancellationToken,
}

impl PluginWorker {
    pub(crate) fn new(
        plugin: Arc<dyn LogPlugin>,
        state: Arc<PluginState>,
        run_token: CancellationToken,
    ) -> Self {
        Self {
            plugin,
            state,
            run_token,
        }
    }

    pub(crate) async fn run(self) {
        debug!(plugin = %self.state.type_key, "log plugin worker starting");

        // Initialize. A failure or decline latches the plugin so its queue
        // stops accepting and the drain below is a no-op.
        match self.plugin.initialize(&self.state.context).await {
            Ok(true) => self.state.initialized.store(true, Ordering::Release),
            Ok(false) => {
                self.state
                    .record_error("Plugin declined to process log lines.".to_string());
                self.state
                    .context
                    .output("Skip process outputs based on plugin initialize result.");
                self.state.latch.set();
            }
            Err(e) => {
                self.state.context.trace(&format!("Initialize failed: {e}"));
                self.state.record_error(e.to_string());
                self.state
                    .context
                    .output("Skip process outputs based on plugin initialize result.");
                self.state.latch.set();
            }
        }

        // Steady-state drain: consume until the job finishes or the latch
        // trips, backing off while the queue is dry.
        while !self.state.latch.is_set() && !self.run_token.is_cancelled() {
            self.drain().await;
            if self.state.latch.is_set() || self.run_token.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(IDLE_BACKOFF) => {}
                _ = self.run_token.cancelled() => {}
                _ = self.state.latch.signaled() => {}
            }
        }

        // Post-finish drain: one bounded pass for lines enqueued between
        // finish() and the worker waking up.
        if self.run_token.is_cancelled() && !self.state.latch.is_set() {
            let pending = self.state.queue.depth();
            if pending > 0 {
                self.state
                    .context
                    .output(&format!("Pending process {pending} log lines."));
            }
            self.drain().await;
        }

        self.report();
        debug!(
            plugin = %self.state.type_key,
            stats = ?self.state.queue.stats(),
            "log plugin worker exiting"
        );
    }

    /// Inner dequeue loop: drain until the queue is empty or the latch
    /// trips.
    async fn drain(&self) {
        while !self.state.latch.is_set() {
            let Some(line) = self.state.queue.try_dequeue() else {
                break;
            };
            self.process_line(line).await;
        }
    }

    /// Dispatch one raw line to the plugin, racing the call against the
    /// latch. If the latch fires first the call is left running detached;
    /// the worker must never block on a plugin stuck inside
    /// `process_line`.
    async fn process_line(&self, line: String) {
        let (step_id, message) = split_line(&line);

        // Unknown step ids count as plugin faults, same as a failing
        // process_line call; the drain continues.
        let Some(step) = self.state.context.step(step_id).cloned() else {
            self.state
                .record_error(format!("No step found for log line id '{step_id}'."));
            return;
        };

        let plugin = Arc::clone(&self.plugin);
        let context = Arc::clone(&self.state.context);
        let message = message.to_string();
        let call = tokio::spawn(async move { plugin.process_line(&context, &step, &message).await });

        tokio::select! {
            _ = self.state.latch.signaled() => {
                // Abandoned: the spawned call keeps running unobserved.
            }
            joined = call => match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.state.record_error(e.to_string()),
                Err(e) => self.state.record_error(e.to_string()),
            }
        }
    }

    /// End-of-run reporting and queue cleanup.
    fn report(&self) {
        if self.state.latch.is_set() && self.state.initialized.load(Ordering::Acquire) {
            self.state
                .context
                .output("Plugin has been short circuited due to exceed memory usage limit.");
        }

        let dropped = self.state.queue.clear();
        if dropped > 0 {
            debug!(plugin = %self.state.type_key, dropped, "discarded undelivered log lines");
        }

        for error in self.state.errors() {
            self.state
                .context
                .output(&format!("Fail to process output: {error}"));
        }
    }
}

/// Split a raw line on the first `:` into step id and message.
///
/// `"1:2:hello"` is id `"1"`, message `"2:hello"`. A line with no colon is
/// treated as a bare id with an empty message; the step lookup then fails
/// and the line is recorded as a plugin fault.
fn split_line(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((id, message)) => (id, message),
        None => (line, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_first_colon() {
        assert_eq!(split_line("1:hello"), ("1", "hello"));
        assert_eq!(split_line("1:2:hello"), ("1", "2:hello"));
    }

    #[test]
    fn test_split_edge_shapes() {
        assert_eq!(split_line("no-colon"), ("no-colon", ""));
        assert_eq!(split_line("1:"), ("1", ""));
        assert_eq!(split_line(":message"), ("", "message"));
    }
}
