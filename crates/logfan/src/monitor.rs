//! Queue pressure monitor.
//!
//! A single cooperative task that samples every plugin's queue depth once
//! per period and latches a plugin after sustained overflow. Transient
//! bursts from a single fat step must not trip the valve, so the latch
//! fires only on the [`TRIP_SAMPLES`]th consecutive overflow sample. The
//! monitor never pops a queue and never blocks the producer.

use crate::host::PluginState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Consecutive overflow samples required before a plugin is latched.
const TRIP_SAMPLES: u32 = 10;

pub(crate) struct PressureMonitor {
    states: Vec<Arc<PluginState>>,
    threshold: usize,
    period: Duration,
    token: CancellationToken,
}

impl PressureMonitor {
    pub(crate) fn new(
        states: Vec<Arc<PluginState>>,
        threshold: usize,
        period: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            states,
            threshold,
            period,
            token,
        }
    }

    pub(crate) async fn run(self) {
        let mut counters = vec![0u32; self.states.len()];

        // Cancellation is read only at the top of the loop; a cancel that
        // lands mid-sweep or mid-sleep does not interrupt the sweep in
        // progress.
        loop {
            if self.token.is_cancelled() {
                break;
            }

            self.sweep(&mut counters);

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = self.token.cancelled() => {}
            }
        }

        debug!("pressure monitor exiting");
    }

    /// Sample every live plugin's queue depth once.
    fn sweep(&self, counters: &mut [u32]) {
        for (state, counter) in self.states.iter().zip(counters.iter_mut()) {
            if state.latch.is_set() {
                continue;
            }

            let depth = state.queue.depth();
            if depth > self.threshold {
                *counter += 1;
                state.context.trace(&format!(
                    "Log queue depth {depth} exceeds {} ({} of {TRIP_SAMPLES} samples).",
                    self.threshold, *counter
                ));
                if *counter >= TRIP_SAMPLES {
                    state.latch.set();
                    warn!(
                        plugin = %state.type_key,
                        depth,
                        "short circuiting plugin after sustained queue overflow"
                    );
                }
            } else {
                state.context.trace(&format!(
                    "Log queue depth {depth} at or below {}; pressure counter reset.",
                    self.threshold
                ));
                *counter = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::state_with_trace;
    use crate::trace::PluginTrace;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingTrace {
        diagnostics: Mutex<Vec<String>>,
    }

    impl PluginTrace for CapturingTrace {
        fn trace(&self, message: &str) {
            self.diagnostics.lock().unwrap().push(message.to_string());
        }

        fn output(&self, _message: &str) {}
    }

    fn monitor_over(state: Arc<PluginState>, threshold: usize) -> PressureMonitor {
        PressureMonitor::new(
            vec![state],
            threshold,
            Duration::from_millis(10),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_latch_trips_on_tenth_consecutive_sample() {
        let trace = Arc::new(CapturingTrace::default());
        let state = state_with_trace("Slow Plugin", Arc::clone(&trace) as Arc<dyn PluginTrace>);
        for i in 0..3 {
            state.queue.enqueue(format!("1:line-{i}"));
        }
        let monitor = monitor_over(Arc::clone(&state), 1);
        let mut counters = vec![0u32];

        for _ in 0..9 {
            monitor.sweep(&mut counters);
        }
        assert!(!state.latch.is_set());
        assert_eq!(counters[0], 9);

        monitor.sweep(&mut counters);
        assert!(state.latch.is_set());
        assert_eq!(trace.diagnostics.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_counter_resets_when_depth_recovers() {
        let trace = Arc::new(CapturingTrace::default());
        let state = state_with_trace("Bursty Plugin", Arc::clone(&trace) as Arc<dyn PluginTrace>);
        for i in 0..3 {
            state.queue.enqueue(format!("1:line-{i}"));
        }
        let monitor = monitor_over(Arc::clone(&state), 1);
        let mut counters = vec![0u32];

        for _ in 0..5 {
            monitor.sweep(&mut counters);
        }
        assert_eq!(counters[0], 5);

        state.queue.clear();
        monitor.sweep(&mut counters);
        assert_eq!(counters[0], 0);
        assert!(!state.latch.is_set());

        let diagnostics = trace.diagnostics.lock().unwrap();
        assert_eq!(diagnostics.len(), 6);
        assert!(diagnostics.last().unwrap().contains("pressure counter reset"));
    }

    #[test]
    fn test_every_healthy_sample_traces_a_reset() {
        let trace = Arc::new(CapturingTrace::default());
        let state = state_with_trace("Quiet Plugin", Arc::clone(&trace) as Arc<dyn PluginTrace>);
        let monitor = monitor_over(Arc::clone(&state), 1);
        let mut counters = vec![0u32];

        monitor.sweep(&mut counters);
        monitor.sweep(&mut counters);

        let diagnostics = trace.diagnostics.lock().unwrap();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|line| line.contains("pressure counter reset")));
    }

    #[test]
    fn test_latched_plugins_are_skipped() {
        let trace = Arc::new(CapturingTrace::default());
        let state = state_with_trace("Dead Plugin", Arc::clone(&trace) as Arc<dyn PluginTrace>);
        state.queue.enqueue("1:line".to_string());
        state.latch.set();
        let monitor = monitor_over(Arc::clone(&state), 0);
        let mut counters = vec![0u32];

        monitor.sweep(&mut counters);
        assert_eq!(counters[0], 0);
        assert!(trace.diagnostics.lock().unwrap().is_empty());
    }
}
