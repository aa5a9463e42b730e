//! Per-plugin execution context and the job reference data.
//!
//! The host hands every plugin an immutable [`PluginContext`]: the opaque
//! service connection bundle, read-only views of the job's steps,
//! endpoints, repositories and variables, and a trace whose every message
//! is prefixed with the plugin's friendly name.

use crate::trace::PluginTrace;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Mask substituted for secret material anywhere it would otherwise show
/// up on the job log or in a debug dump.
pub const SECRET_MASK: &str = "***";

/// Credential material that must never reach the job log in the clear.
///
/// `Debug`, `Display` and serialized output all collapse to
/// [`SECRET_MASK`], and [`PluginContext`] scrubs the clear text out of
/// every line a plugin emits. The value is only reachable through
/// [`SecretValue::expose_secret`], for opening data-plane connections.
#[derive(Clone)]
pub struct SecretValue(SecretString);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Reach the clear text. Anything derived from it is the caller's to
    /// keep off the job log.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(SECRET_MASK)
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(SECRET_MASK)
    }
}

/// Serialize as the mask so a job message echoed back out cannot leak the
/// token.
impl Serialize for SecretValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(SECRET_MASK)
    }
}

/// Deserialize from the clear value the runner's job message carries.
impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Opaque bundle of connection material handed through to plugins.
///
/// The host never reads these fields; they exist so plugins can open their
/// own data-plane connections back to the service.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    /// Base URL of the service collection
    pub collection_url: String,
    /// Access token for the job's service identity
    pub access_token: SecretValue,
    /// Optional proxy to route plugin traffic through
    pub proxy_url: Option<String>,
    /// Skip TLS certificate validation (self-signed service instances)
    pub skip_cert_validation: bool,
}

/// A job step, addressed by the id embedded in each log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identifier matched against the log line prefix
    pub id: String,
    /// Display name of the step
    pub name: String,
}

/// A service connection visible to plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint name
    pub name: String,
    /// Endpoint URL
    pub url: String,
    /// Additional endpoint properties
    #[serde(default)]
    pub data: HashMap<String, String>,
}

/// A source repository of the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Alias the job refers to the repository by
    pub alias: String,
    /// Clone URL
    pub url: String,
}

/// A job variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Variable value
    pub value: String,
    /// Secret variables must not be echoed back into the job log
    #[serde(default)]
    pub is_secret: bool,
}

/// Construction-time bundle for the host: one service context plus the
/// job's reference data, shared read-only by every plugin.
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Opaque service connection bundle
    pub service: ServiceContext,
    /// Steps keyed by the id embedded in log lines
    pub steps: HashMap<String, Step>,
    /// Service connections of the job
    pub endpoints: Vec<Endpoint>,
    /// Source repositories of the job
    pub repositories: Vec<Repository>,
    /// Job variables
    pub variables: HashMap<String, Variable>,
}

/// Immutable per-plugin handle.
///
/// Cheap to clone; all views share the host's allocations. The trace
/// channels prefix every message with the plugin's friendly name so the
/// job log attributes output to the right plugin, and scrub the access
/// token and every secret variable value out of the line first.
#[derive(Clone)]
pub struct PluginContext {
    service: Arc<ServiceContext>,
    steps: Arc<HashMap<String, Arc<Step>>>,
    endpoints: Arc<Vec<Endpoint>>,
    repositories: Arc<Vec<Repository>>,
    variables: Arc<HashMap<String, Variable>>,
    trace: Arc<dyn PluginTrace>,
    friendly_name: String,
    /// Clear-text values to replace with [`SECRET_MASK`] on emission.
    secrets: Vec<String>,
}

impl PluginContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        service: Arc<ServiceContext>,
        steps: Arc<HashMap<String, Arc<Step>>>,
        endpoints: Arc<Vec<Endpoint>>,
        repositories: Arc<Vec<Repository>>,
        variables: Arc<HashMap<String, Variable>>,
        trace: Arc<dyn PluginTrace>,
        friendly_name: String,
    ) -> Self {
        let mut secrets: Vec<String> = variables
            .values()
            .filter(|variable| variable.is_secret && !variable.value.is_empty())
            .map(|variable| variable.value.clone())
            .collect();
        let token = service.access_token.expose_secret();
        if !token.is_empty() {
            secrets.push(token.to_string());
        }

        Self {
            service,
            steps,
            endpoints,
            repositories,
            variables,
            trace,
            friendly_name,
            secrets,
        }
    }

    /// The opaque service connection bundle
    pub fn service(&self) -> &ServiceContext {
        &self.service
    }

    /// Look up a step by the id embedded in a log line
    pub fn step(&self, id: &str) -> Option<&Arc<Step>> {
        self.steps.get(id)
    }

    /// All steps of the job, keyed by id
    pub fn steps(&self) -> &HashMap<String, Arc<Step>> {
        &self.steps
    }

    /// Service connections of the job
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Source repositories of the job
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Look up a job variable by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// All job variables
    pub fn variables(&self) -> &HashMap<String, Variable> {
        &self.variables
    }

    /// Emit a diagnostic trace line attributed to this plugin
    pub fn trace(&self, message: &str) {
        self.trace
            .trace(&format!("{}: {}", self.friendly_name, self.scrub(message)));
    }

    /// Emit a job log line attributed to this plugin
    pub fn output(&self, message: &str) {
        self.trace
            .output(&format!("{}: {}", self.friendly_name, self.scrub(message)));
    }

    /// Replace secret material with [`SECRET_MASK`] before a line leaves
    /// the host.
    fn scrub(&self, message: &str) -> String {
        let mut scrubbed = message.to_string();
        for secret in &self.secrets {
            if scrubbed.contains(secret.as_str()) {
                scrubbed = scrubbed.replace(secret.as_str(), SECRET_MASK);
            }
        }
        scrubbed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingTrace {
        diagnostics: Mutex<Vec<String>>,
        output: Mutex<Vec<String>>,
    }

    impl PluginTrace for CapturingTrace {
        fn trace(&self, message: &str) {
            self.diagnostics.lock().unwrap().push(message.to_string());
        }

        fn output(&self, message: &str) {
            self.output.lock().unwrap().push(message.to_string());
        }
    }

    fn test_context(trace: Arc<CapturingTrace>) -> PluginContext {
        let steps: HashMap<String, Arc<Step>> = [(
            "1".to_string(),
            Arc::new(Step {
                id: "1".to_string(),
                name: "Build".to_string(),
            }),
        )]
        .into_iter()
        .collect();

        let variables: HashMap<String, Variable> = [
            (
                "system.region".to_string(),
                Variable {
                    value: "eu-west-1".to_string(),
                    is_secret: false,
                },
            ),
            (
                "deploy.key".to_string(),
                Variable {
                    value: "hunter2".to_string(),
                    is_secret: true,
                },
            ),
        ]
        .into_iter()
        .collect();

        PluginContext::new(
            Arc::new(ServiceContext {
                collection_url: "https://svc.example.com/org".to_string(),
                access_token: SecretValue::new("job-token-123"),
                proxy_url: None,
                skip_cert_validation: false,
            }),
            Arc::new(steps),
            Arc::new(Vec::new()),
            Arc::new(Vec::new()),
            Arc::new(variables),
            trace,
            "Test Parser".to_string(),
        )
    }

    #[test]
    fn test_secret_value_masked_debug() {
        let secret = SecretValue::new("my-access-token");
        assert_eq!(format!("{:?}", secret), SECRET_MASK);
        assert_eq!(format!("{}", secret), SECRET_MASK);
    }

    #[test]
    fn test_secret_value_expose() {
        let secret = SecretValue::new("my-access-token");
        assert_eq!(secret.expose_secret(), "my-access-token");
    }

    #[test]
    fn test_secret_value_serialize_masked() {
        let secret = SecretValue::new("my-access-token");
        let serialized = serde_json::to_string(&secret).unwrap();
        assert_eq!(serialized, "\"***\"");
    }

    #[test]
    fn test_secret_value_deserialize() {
        let secret: SecretValue = serde_json::from_str("\"my-access-token\"").unwrap();
        assert_eq!(secret.expose_secret(), "my-access-token");
    }

    #[test]
    fn test_step_lookup() {
        let trace = Arc::new(CapturingTrace::default());
        let ctx = test_context(trace);

        assert_eq!(ctx.step("1").unwrap().name, "Build");
        assert!(ctx.step("2").is_none());
    }

    #[test]
    fn test_trace_prefixes_friendly_name() {
        let trace = Arc::new(CapturingTrace::default());
        let ctx = test_context(Arc::clone(&trace));

        ctx.trace("scanning line");
        ctx.output("uploaded 3 artifacts");

        assert_eq!(
            trace.diagnostics.lock().unwrap().as_slice(),
            ["Test Parser: scanning line"]
        );
        assert_eq!(
            trace.output.lock().unwrap().as_slice(),
            ["Test Parser: uploaded 3 artifacts"]
        );
    }

    #[test]
    fn test_output_scrubs_secret_variable_values() {
        let trace = Arc::new(CapturingTrace::default());
        let ctx = test_context(Arc::clone(&trace));

        ctx.output("deploy key hunter2 used in eu-west-1");

        assert_eq!(
            trace.output.lock().unwrap().as_slice(),
            ["Test Parser: deploy key *** used in eu-west-1"]
        );
    }

    #[test]
    fn test_trace_scrubs_access_token() {
        let trace = Arc::new(CapturingTrace::default());
        let ctx = test_context(Arc::clone(&trace));

        ctx.trace("authorizing with job-token-123");

        assert_eq!(
            trace.diagnostics.lock().unwrap().as_slice(),
            ["Test Parser: authorizing with ***"]
        );
    }
}
