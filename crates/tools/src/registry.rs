use crate::{Domain, Tool};
use opsdesk_core::audit::log_audit;
use opsdesk_core::Store;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Per-tool execution metrics.
#[derive(Debug, Clone, Default)]
pub struct ToolMetrics {
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_duration_ms: u64,
}

struct Entry {
    domain: Domain,
    tool: Arc<dyn Tool>,
}

#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<BTreeMap<String, Entry>>>,
    metrics: Arc<RwLock<HashMap<String, ToolMetrics>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn definition(tool: &dyn Tool) -> Value {
    json!({
        "name": tool.name(),
        "description": tool.description(),
        "parameters": tool.parameters()
    })
}

impl ToolRegistry {
    const ALLOW_ALL_MARKER: &'static str = "*";

    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(BTreeMap::new())),
            metrics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(&self, domain: Domain, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        tools.insert(tool.name().to_string(), Entry { domain, tool });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.get(name).map(|e| e.tool.clone())
    }

    pub fn domain_of(&self, name: &str) -> Option<Domain> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.get(name).map(|e| e.domain)
    }

    /// Definitions of every tool, sorted by name.
    pub fn list_definitions(&self) -> Vec<Value> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.values().map(|e| definition(e.tool.as_ref())).collect()
    }

    pub fn list_definitions_for_domain(&self, domain: Domain) -> Vec<Value> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools
            .values()
            .filter(|e| e.domain == domain)
            .map(|e| definition(e.tool.as_ref()))
            .collect()
    }

    /// Return tool definitions filtered by an allowed-tools list.
    /// If `allowed_tools` is empty, returns NO tools (strict default deny).
    pub fn list_definitions_for_permissions(&self, allowed_tools: &[String]) -> Vec<Value> {
        if allowed_tools.is_empty() {
            return Vec::new();
        }

        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools
            .values()
            .filter(|e| Self::is_tool_allowed(e.tool.name(), allowed_tools))
            .map(|e| definition(e.tool.as_ref()))
            .collect()
    }

    /// Check if a tool name is in the allowed list.
    /// If `allowed_tools` is empty, NO tools are allowed.
    pub fn is_tool_allowed(tool_name: &str, allowed_tools: &[String]) -> bool {
        allowed_tools
            .iter()
            .any(|a| a == tool_name || a == Self::ALLOW_ALL_MARKER)
    }

    /// Run a tool and wrap any failure into the `{"success": false, "error": ...}` envelope.
    pub fn dispatch(&self, store: &mut Store, name: &str, args: Value) -> Value {
        let Some(tool) = self.get(name) else {
            warn!("Unknown tool requested: {}", name);
            return json!({ "success": false, "error": format!("Unknown tool: {name}") });
        };

        debug!(tool = name, "Invoking tool");
        let started = Instant::now();
        let result = tool.invoke(store, args.clone());
        let duration_ms = started.elapsed().as_millis() as u64;

        let (output, success) = match result {
            Ok(output) => (output, true),
            Err(e) => {
                warn!(tool = name, "Tool rejected call: {}", e);
                (e.envelope(), false)
            }
        };

        self.record_metrics(name, duration_ms, success);
        log_audit(
            "tool_invocation",
            name,
            success,
            duration_ms,
            json!({ "arguments": args }),
        );
        output
    }

    /// Like [`dispatch`](Self::dispatch), refusing tools outside `allowed_tools`.
    pub fn dispatch_allowed(
        &self,
        store: &mut Store,
        name: &str,
        args: Value,
        allowed_tools: &[String],
    ) -> Value {
        if !Self::is_tool_allowed(name, allowed_tools) {
            warn!("Tool '{}' is not in the allowed list", name);
            return json!({ "success": false, "error": format!("Tool not allowed: {name}") });
        }
        self.dispatch(store, name, args)
    }

    /// Record metrics for a tool execution.
    pub fn record_metrics(&self, tool_name: &str, duration_ms: u64, success: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        let entry = metrics.entry(tool_name.to_string()).or_default();
        entry.execution_count += 1;
        entry.total_duration_ms += duration_ms;
        if success {
            entry.success_count += 1;
        } else {
            entry.failure_count += 1;
        }
    }

    /// Get metrics for all tools.
    pub fn get_metrics(&self) -> HashMap<String, ToolMetrics> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolError;

    struct DummyTool {
        name: &'static str,
        fail: bool,
    }

    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "dummy"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {}
            })
        }

        fn invoke(&self, _store: &mut Store, _args: Value) -> Result<Value, ToolError> {
            if self.fail {
                return Err(ToolError::Halt("stop here".into()));
            }
            Ok(json!({"success": true}))
        }
    }

    fn dummy(name: &'static str) -> Arc<dyn Tool> {
        Arc::new(DummyTool { name, fail: false })
    }

    #[test]
    fn empty_allowed_list_denies_all_tools() {
        assert!(!ToolRegistry::is_tool_allowed("create_employee", &[]));
    }

    #[test]
    fn wildcard_allows_any_tool() {
        assert!(ToolRegistry::is_tool_allowed("create_employee", &["*".to_string()]));
        assert!(ToolRegistry::is_tool_allowed("edit_page", &["*".to_string()]));
    }

    #[test]
    fn register_and_get_tool() {
        let registry = ToolRegistry::new();
        registry.register(Domain::Hr, dummy("dummy"));

        let tool = registry.get("dummy");
        assert!(tool.is_some());
        assert_eq!(tool.expect("tool").name(), "dummy");
        assert_eq!(registry.domain_of("dummy"), Some(Domain::Hr));
    }

    #[test]
    fn list_definitions_respects_permission_filter() {
        let registry = ToolRegistry::new();
        registry.register(Domain::Hr, dummy("a"));
        registry.register(Domain::Wiki, dummy("b"));

        let allowed = vec!["b".to_string()];
        let defs = registry.list_definitions_for_permissions(&allowed);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["name"], "b");
        assert_eq!(registry.list_definitions_for_domain(Domain::Hr).len(), 1);
    }

    #[test]
    fn wildcard_permission_returns_all_registered_definitions() {
        let registry = ToolRegistry::new();
        registry.register(Domain::Hr, dummy("a"));
        registry.register(Domain::Hr, dummy("b"));

        let allowed = vec!["*".to_string()];
        assert_eq!(registry.list_definitions_for_permissions(&allowed).len(), 2);
    }

    #[test]
    fn dispatch_wraps_errors_and_records_metrics() {
        let registry = ToolRegistry::new();
        registry.register(Domain::Incident, dummy("ok"));
        registry.register(
            Domain::Incident,
            Arc::new(DummyTool {
                name: "bad",
                fail: true,
            }),
        );
        let mut store = Store::default();

        assert_eq!(
            registry.dispatch(&mut store, "ok", json!({})),
            json!({"success": true})
        );
        assert_eq!(
            registry.dispatch(&mut store, "bad", json!({})),
            json!({"success": false, "error": "Halt: stop here"})
        );
        assert_eq!(
            registry.dispatch(&mut store, "missing", json!({}))["error"],
            "Unknown tool: missing"
        );

        let metrics = registry.get_metrics();
        assert_eq!(metrics["ok"].success_count, 1);
        assert_eq!(metrics["bad"].failure_count, 1);
        assert!(!metrics.contains_key("missing"));
    }

    #[test]
    fn dispatch_allowed_refuses_unlisted_tools() {
        let registry = ToolRegistry::new();
        registry.register(Domain::Wiki, dummy("a"));
        let mut store = Store::default();
        let out = registry.dispatch_allowed(&mut store, "a", json!({}), &["b".to_string()]);
        assert_eq!(out["error"], "Tool not allowed: a");
    }

    #[test]
    fn metrics_are_recorded() {
        let registry = ToolRegistry::new();
        registry.record_metrics("dummy", 40, true);
        registry.record_metrics("dummy", 20, false);

        let metrics = registry.get_metrics();
        let m = metrics.get("dummy").expect("dummy metrics");
        assert_eq!(m.execution_count, 2);
        assert_eq!(m.success_count, 1);
        assert_eq!(m.failure_count, 1);
        assert_eq!(m.total_duration_ms, 60);
    }
}
