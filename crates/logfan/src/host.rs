//! Host orchestration: fan-out, lifecycle, and two-phase shutdown.

use crate::config::HostConfig;
use crate::context::{HostContext, PluginContext, Step};
use crate::error::{HostError, Result};
use crate::latch::ShortCircuitLatch;
use crate::monitor::PressureMonitor;
use crate::plugin::LogPlugin;
use crate::queue::OutputQueue;
use crate::trace::{PluginTrace, StdoutTrace};
use crate::worker::PluginWorker;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cap on recorded errors per plugin; later failures are silently dropped
/// so a flapping plugin cannot grow its own error log without bound.
pub(crate) const MAX_RECORDED_ERRORS: usize = 10;

/// Shared per-plugin state: the queue the producer writes into, the latch
/// that permanently stops the plugin, and the bookkeeping its worker
/// reports from at the end of the run.
pub(crate) struct PluginState {
    pub(crate) friendly_name: String,
    pub(crate) type_key: String,
    pub(crate) queue: OutputQueue,
    pub(crate) latch: ShortCircuitLatch,
    pub(crate) context: Arc<PluginContext>,
    /// Written once by the worker after `initialize`; consulted at the
    /// finalize gate and when deciding whether the short-circuit message
    /// belongs on the job log.
    pub(crate) initialized: AtomicBool,
    pub(crate) errors: Mutex<Vec<String>>,
}

impl PluginState {
    /// Record a plugin fault, up to [`MAX_RECORDED_ERRORS`] entries.
    pub(crate) fn record_error(&self, error: String) {
        let mut errors = self.errors.lock();
        if errors.len() < MAX_RECORDED_ERRORS {
            errors.push(error);
        }
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

/// In-process dispatcher fanning a job's log stream out to log plugins.
///
/// The enclosing runner pushes raw lines with [`enqueue`](Self::enqueue),
/// signals end of job with [`finish`](Self::finish), and drives the whole
/// lifecycle with a single [`run`](Self::run) call. See the crate docs for
/// the shutdown protocol.
pub struct LogPluginHost {
    plugins: Vec<Arc<dyn LogPlugin>>,
    states: Vec<Arc<PluginState>>,
    trace: Arc<dyn PluginTrace>,
    config: HostConfig,
    /// Cancelled when the job finishes; moves workers out of their
    /// steady-state drain.
    run_token: CancellationToken,
    /// The edge `finish()` fires and `run()` awaits.
    job_finished: CancellationToken,
    started: AtomicBool,
}

impl LogPluginHost {
    /// Create a host for the given job context and plugin set.
    ///
    /// `trace` defaults to [`StdoutTrace`]. Construction allocates every
    /// plugin's queue, latch and context; the plugin set is fixed for the
    /// host's lifetime.
    pub fn new(
        host_context: HostContext,
        plugins: Vec<Arc<dyn LogPlugin>>,
        trace: Option<Arc<dyn PluginTrace>>,
        config: HostConfig,
    ) -> Self {
        let trace = trace.unwrap_or_else(|| Arc::new(StdoutTrace));

        let service = Arc::new(host_context.service);
        let steps: Arc<HashMap<String, Arc<Step>>> = Arc::new(
            host_context
                .steps
                .into_iter()
                .map(|(id, step)| (id, Arc::new(step)))
                .collect(),
        );
        let endpoints = Arc::new(host_context.endpoints);
        let repositories = Arc::new(host_context.repositories);
        let variables = Arc::new(host_context.variables);

        let states = plugins
            .iter()
            .map(|plugin| {
                let context = Arc::new(PluginContext::new(
                    Arc::clone(&service),
                    Arc::clone(&steps),
                    Arc::clone(&endpoints),
                    Arc::clone(&repositories),
                    Arc::clone(&variables),
                    Arc::clone(&trace),
                    plugin.friendly_name().to_string(),
                ));
                Arc::new(PluginState {
                    friendly_name: plugin.friendly_name().to_string(),
                    type_key: plugin.type_key().to_string(),
                    queue: OutputQueue::new(),
                    latch: ShortCircuitLatch::new(),
                    context,
                    initialized: AtomicBool::new(false),
                    errors: Mutex::new(Vec::new()),
                })
            })
            .collect();

        Self {
            plugins,
            states,
            trace,
            config,
            run_token: CancellationToken::new(),
            job_finished: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Fan one raw log line out to every plugin still accepting lines.
    ///
    /// Empty lines are dropped. Safe to call from any thread while
    /// [`run`](Self::run) is in flight. A latched plugin's queue stops
    /// accepting; its backlog is already forfeit.
    pub fn enqueue(&self, line: impl Into<String>) {
        let line = line.into();
        if line.is_empty() {
            return;
        }
        for state in &self.states {
            if !state.latch.is_set() {
                state.queue.enqueue(line.clone());
            }
        }
    }

    /// Signal that the job has finished writing lines. Idempotent.
    pub fn finish(&self) {
        self.job_finished.cancel();
    }

    /// Drive the plugin lifecycle to completion.
    ///
    /// Starts the pressure monitor and one worker per plugin, waits for
    /// [`finish`](Self::finish), then runs the two-phase shutdown: workers
    /// drain what is already queued while the monitor stays alive to catch
    /// overflow, and once every worker has settled the monitor is stopped
    /// and `finalize` runs concurrently for every plugin that initialized
    /// and was not short circuited.
    ///
    /// Plugin faults are contained and traced; the only error this returns
    /// is a second `run` call.
    pub async fn run(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyRan);
        }

        info!(plugins = self.plugins.len(), "log plugin host starting");

        let monitor_token = CancellationToken::new();
        let monitor = PressureMonitor::new(
            self.states.clone(),
            self.config.short_circuit_threshold,
            self.config.monitor_frequency,
            monitor_token.clone(),
        );
        let monitor_handle = tokio::spawn(monitor.run());

        let mut worker_handles = Vec::with_capacity(self.plugins.len());
        for (plugin, state) in self.plugins.iter().zip(&self.states) {
            let worker = PluginWorker::new(
                Arc::clone(plugin),
                Arc::clone(state),
                self.run_token.clone(),
            );
            worker_handles.push(tokio::spawn(worker.run()));
        }

        self.job_finished.cancelled().await;

        // Move workers into their post-finish drain. The monitor is NOT
        // stopped here: a worker can still hit overflow while draining,
        // and the latch must remain armable until every worker exits.
        self.run_token.cancel();

        for (state, handle) in self.states.iter().zip(worker_handles) {
            if let Err(e) = handle.await {
                self.trace.trace(&format!(
                    "Worker for plugin '{}' failed: {}",
                    state.friendly_name, e
                ));
                warn!(plugin = %state.type_key, error = %e, "log plugin worker panicked");
            }
        }

        monitor_token.cancel();
        if let Err(e) = monitor_handle.await {
            warn!(error = %e, "pressure monitor task failed");
        }

        // Finalize survivors concurrently so one slow or failing finalizer
        // cannot starve another plugin's upload.
        let mut finalizers = Vec::new();
        for (plugin, state) in self.plugins.iter().zip(&self.states) {
            if state.latch.is_set() || !state.initialized.load(Ordering::Acquire) {
                debug!(plugin = %state.type_key, "skipping finalize");
                continue;
            }
            let plugin = Arc::clone(plugin);
            let context = Arc::clone(&state.context);
            let handle = tokio::spawn(async move { plugin.finalize(&context).await });
            finalizers.push((Arc::clone(state), handle));
        }
        for (state, handle) in finalizers {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.trace.trace(&format!(
                        "Plugin '{}' finalize failed: {}",
                        state.friendly_name, e
                    ));
                    warn!(plugin = %state.type_key, error = %e, "finalize failed");
                }
                Err(e) => {
                    self.trace.trace(&format!(
                        "Plugin '{}' finalize failed: {}",
                        state.friendly_name, e
                    ));
                    warn!(plugin = %state.type_key, error = %e, "finalize task panicked");
                }
            }
        }

        info!("log plugin host finished");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SecretValue, ServiceContext};
    use crate::error::PluginResult;
    use async_trait::async_trait;

    struct NoopPlugin;

    #[async_trait]
    impl LogPlugin for NoopPlugin {
        fn friendly_name(&self) -> &str {
            "Noop"
        }

        fn type_key(&self) -> &str {
            "noop"
        }

        async fn initialize(&self, _ctx: &PluginContext) -> PluginResult<bool> {
            Ok(true)
        }

        async fn process_line(
            &self,
            _ctx: &PluginContext,
            _step: &Step,
            _message: &str,
        ) -> PluginResult<()> {
            Ok(())
        }

        async fn finalize(&self, _ctx: &PluginContext) -> PluginResult<()> {
            Ok(())
        }
    }

    fn empty_host_context() -> HostContext {
        HostContext {
            service: ServiceContext {
                collection_url: "https://svc.example.com/org".to_string(),
                access_token: SecretValue::new("token"),
                proxy_url: None,
                skip_cert_validation: false,
            },
            steps: HashMap::new(),
            endpoints: Vec::new(),
            repositories: Vec::new(),
            variables: HashMap::new(),
        }
    }

    #[test]
    fn test_record_error_caps_at_limit() {
        let state = test_support::state_with_trace("Noop", Arc::new(StdoutTrace));
        for i in 0..25 {
            state.record_error(format!("boom {i}"));
        }
        assert_eq!(state.errors().len(), MAX_RECORDED_ERRORS);
        assert_eq!(state.errors()[0], "boom 0");
        assert_eq!(state.errors()[9], "boom 9");
    }

    #[test]
    fn test_enqueue_drops_empty_lines() {
        let host = LogPluginHost::new(
            empty_host_context(),
            vec![Arc::new(NoopPlugin)],
            None,
            HostConfig::default(),
        );

        host.enqueue("");
        host.enqueue("1:real line");

        assert_eq!(host.states[0].queue.depth(), 1);
    }

    #[test]
    fn test_enqueue_skips_latched_plugins() {
        let host = LogPluginHost::new(
            empty_host_context(),
            vec![Arc::new(NoopPlugin)],
            None,
            HostConfig::default(),
        );

        host.enqueue("1:before");
        host.states[0].latch.set();
        host.enqueue("1:after");

        assert_eq!(host.states[0].queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_run_twice_is_an_error() {
        let host = LogPluginHost::new(
            empty_host_context(),
            Vec::new(),
            None,
            HostConfig::default(),
        );

        host.finish();
        host.run().await.unwrap();
        assert!(matches!(host.run().await, Err(HostError::AlreadyRan)));
    }
}
