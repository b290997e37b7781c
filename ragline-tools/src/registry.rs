//! Tool registry: the tool-execution capability handed to generation steps.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    core::{Tool, ToolOutput, ToolParameters, ToolSpec},
    error::{Result, ToolError},
};

/// Registry for looking up and executing tools by name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a tool. Re-registering a name is a configuration error.
    pub async fn register(&self, tool: impl Tool + 'static) -> Result<()> {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            return Err(ToolError::configuration(format!(
                "tool '{name}' is already registered"
            )));
        }
        tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Execute a tool by name.
    ///
    /// An unknown name yields [`ToolError::NotFound`], distinct from an
    /// execution failure of a known tool.
    pub async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<ToolOutput> {
        let tool = {
            let tools = self.tools.read().await;
            tools
                .get(tool_name)
                .cloned()
                .ok_or_else(|| ToolError::not_found(tool_name))?
        };

        let params = ToolParameters::new(arguments.clone());
        if let Err(e) = tool.validate_parameters(&params).await {
            warn!(tool = tool_name, error = %e, "tool parameter validation failed");
            return Err(ToolError::invalid_parameters(e.to_string()));
        }

        debug!(tool = tool_name, "executing tool");
        tool.execute(params).await
    }

    /// Execute a tool with a deadline; elapsing yields [`ToolError::Timeout`].
    pub async fn execute_with_timeout(
        &self,
        tool_name: &str,
        arguments: &Value,
        timeout: Duration,
    ) -> Result<ToolOutput> {
        tokio::time::timeout(timeout, self.execute(tool_name, arguments))
            .await
            .map_err(|_| {
                ToolError::timeout(format!(
                    "tool '{tool_name}' did not finish within {timeout:?}"
                ))
            })?
    }

    /// List all registered tool names.
    pub async fn list_tools(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        tools.keys().cloned().collect()
    }

    /// Advertised specs of every registered tool, for the completion port.
    pub async fn specs(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().await;
        let mut specs: Vec<ToolSpec> = tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameter_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    #[derive(Debug)]
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn parameter_schema(&self) -> Value {
            ToolParameters::new_schema()
                .add_required("text", "string", "Text to echo")
                .into()
        }

        async fn execute(&self, params: ToolParameters) -> Result<ToolOutput> {
            Ok(ToolOutput::text(params.get_string("text")?))
        }
    }

    #[derive(Debug)]
    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps longer than any sensible deadline"
        }

        fn parameter_schema(&self) -> Value {
            ToolParameters::new_schema().into()
        }

        async fn execute(&self, _params: ToolParameters) -> Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolOutput::text("done"))
        }
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool).await.unwrap();

        let output = registry
            .execute("echo", &json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(output.content, "hello");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool).await.unwrap();
        let err = registry.register(EchoTool).await.unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_before_execution() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool).await.unwrap();

        let err = registry.execute("echo", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let registry = ToolRegistry::new();
        registry.register(SlowTool).await.unwrap();

        let err = registry
            .execute_with_timeout("slow", &json!({}), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[tokio::test]
    async fn specs_are_sorted_and_complete() {
        let registry = ToolRegistry::new();
        registry.register(SlowTool).await.unwrap();
        registry.register(EchoTool).await.unwrap();

        let specs = registry.specs().await;
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "slow"]);
        assert!(specs[0].parameters.get("properties").is_some());
    }
}
