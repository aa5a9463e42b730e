//! logfan - in-process log plugin host for job runners
//!
//! Receives the ordered stream of log lines a job runner produces and fans
//! it out concurrently to a static set of log plugins (test result
//! scrapers, artifact uploaders, failure annotators). The host owns plugin
//! lifecycle, isolates plugins from one another, and short circuits a
//! plugin whose backlog would otherwise exhaust host memory.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          LogPluginHost                            │
//! │                                                                   │
//! │  enqueue(line) ──┬──► OutputQueue ──► PluginWorker ──► plugin A   │
//! │                  └──► OutputQueue ──► PluginWorker ──► plugin B   │
//! │                           ▲                                       │
//! │                    PressureMonitor                                │
//! │          (samples depth, latches a plugin after                   │
//! │           sustained overflow instead of blocking)                 │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each plugin sees lines in enqueue order but progresses independently;
//! a slow plugin is sampled, never blocked on. [`finish`] starts a
//! two-phase shutdown: workers drain what is already queued while the
//! monitor keeps watching for overflow, then `finalize` runs concurrently
//! for every plugin that initialized and was not short circuited.
//!
//! [`finish`]: LogPluginHost::finish
//!
//! # Example
//!
//! ```rust,ignore
//! use logfan::{HostConfig, LogPluginHost};
//! use std::sync::Arc;
//!
//! let host = Arc::new(LogPluginHost::new(
//!     host_context,
//!     vec![Arc::new(TestResultParser)],
//!     None, // default stdout trace
//!     HostConfig::default(),
//! ));
//!
//! let lifecycle = {
//!     let host = Arc::clone(&host);
//!     tokio::spawn(async move { host.run().await })
//! };
//!
//! host.enqueue("d3c45017:compiling foo v0.1.0");
//! host.finish();
//! lifecycle.await??;
//! ```

// Host configuration
pub mod config;

// Per-plugin context and the job reference data
pub mod context;

// Error types
pub mod error;

// Host orchestration
pub mod host;

// Short-circuit latch
pub mod latch;

// Plugin contract
pub mod plugin;

// Per-plugin line buffer
pub mod queue;

// Job log output channels
pub mod trace;

// Internal tasks
mod monitor;
mod worker;

pub use config::{HostConfig, HostConfigBuilder};
pub use context::{
    Endpoint, HostContext, PluginContext, Repository, SecretValue, ServiceContext, Step, Variable,
    SECRET_MASK,
};
pub use error::{HostError, PluginError, PluginResult, Result};
pub use host::LogPluginHost;
pub use latch::ShortCircuitLatch;
pub use plugin::LogPlugin;
pub use queue::{OutputQueue, QueueStats};
pub use trace::{PluginTrace, StdoutTrace, TRACE_MARKER};
