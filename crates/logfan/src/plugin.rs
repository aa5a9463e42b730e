//! Log plugin contract.

use crate::context::{PluginContext, Step};
use crate::error::PluginResult;
use async_trait::async_trait;

/// Trait for log plugins
///
/// The host drives each plugin through `initialize` → `process_line` (once
/// per log line, in enqueue order) → `finalize`. A `process_line` failure
/// is isolated to the plugin and never stops the drain; the first ten
/// failures are reported on the job log at the end of the run.
///
/// A plugin that falls far enough behind the log stream is short
/// circuited: its backlog is discarded and `finalize` is skipped. If that
/// happens while a `process_line` call is in flight, the host stops
/// observing the call but does not cancel it; the call keeps running
/// detached, and any resources it allocated are the plugin's
/// responsibility to release.
///
/// # Example
///
/// ```rust,ignore
/// use logfan::{LogPlugin, PluginContext, PluginResult, Step};
///
/// struct TestResultParser;
///
/// #[async_trait::async_trait]
/// impl LogPlugin for TestResultParser {
///     fn friendly_name(&self) -> &str {
///         "Test Result Parser"
///     }
///
///     fn type_key(&self) -> &str {
///         "test-result-parser"
///     }
///
///     async fn initialize(&self, ctx: &PluginContext) -> PluginResult<bool> {
///         // probe the service; return Ok(false) to sit this job out
///         Ok(true)
///     }
///
///     async fn process_line(
///         &self,
///         ctx: &PluginContext,
///         step: &Step,
///         message: &str,
///     ) -> PluginResult<()> {
///         // scrape the line for test results
///         Ok(())
///     }
///
///     async fn finalize(&self, ctx: &PluginContext) -> PluginResult<()> {
///         // bulk-publish whatever was collected
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait LogPlugin: Send + Sync {
    /// Human-readable name used in user-visible messages
    fn friendly_name(&self) -> &str;

    /// Stable identifier used in host diagnostics, distinct from the
    /// friendly name
    fn type_key(&self) -> &str;

    /// Prepare for the job. May perform I/O. Return `Ok(false)` to decline
    /// processing; the plugin is then skipped for the rest of the job.
    async fn initialize(&self, ctx: &PluginContext) -> PluginResult<bool>;

    /// React to one log line. May perform I/O and spawn its own tasks.
    async fn process_line(
        &self,
        ctx: &PluginContext,
        step: &Step,
        message: &str,
    ) -> PluginResult<()>;

    /// Run once after the job finishes; allowed to perform bulk uploads.
    async fn finalize(&self, ctx: &PluginContext) -> PluginResult<()>;
}
