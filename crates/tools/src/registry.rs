//! Tool trait, registry, and the registry-backed action executor.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use stepwise_core::{
    ActionExecutor, Outcome, Params, PermissionScope, Step, StepValidator, default_effect_class,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

/// One primitive action against the automation surface.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "click", "navigate").
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters. Only `required` and
    /// the primitive `type` of each property are enforced.
    fn parameters_schema(&self) -> Value;

    fn effect_class(&self) -> PermissionScope {
        default_effect_class(self.name())
    }

    /// Perform the action. The returned string is a short human-readable
    /// note for logs.
    async fn execute(&self, params: &Params) -> Result<String, ToolError>;
}

/// Check `params` against a tool's declared schema.
pub fn check_params(schema: &Value, params: &Params) -> Result<(), ToolError> {
    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(Value::as_str) {
            if !params.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing param '{key}'"
                )));
            }
        }
    }

    let properties = schema["properties"].as_object();
    for (key, value) in params {
        let Some(spec) = properties.and_then(|p| p.get(key)) else {
            return Err(ToolError::InvalidArguments(format!("unexpected param '{key}'")));
        };
        let ok = match spec["type"].as_str() {
            Some("string") => value.is_string(),
            Some("integer") => value.is_i64() || value.is_u64(),
            Some("number") => value.is_number(),
            Some("boolean") => value.is_boolean(),
            _ => true,
        };
        if !ok {
            return Err(ToolError::InvalidArguments(format!(
                "param '{key}' must be a {}",
                spec["type"].as_str().unwrap_or("value")
            )));
        }
    }
    Ok(())
}

/// A registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn validate(&self, step: &Step) -> Result<&dyn Tool, ToolError> {
        let tool = self
            .get(&step.tool)
            .ok_or_else(|| ToolError::NotFound(step.tool.clone()))?;
        check_params(&tool.parameters_schema(), &step.params)?;
        Ok(tool)
    }

    /// Validate and run a step.
    pub async fn execute(&self, step: &Step) -> Result<String, ToolError> {
        let tool = self.validate(step)?;
        tool.execute(&step.params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// [`ActionExecutor`] over a [`ToolRegistry`].
#[derive(Clone)]
pub struct RegistryExecutor {
    registry: Arc<ToolRegistry>,
}

impl RegistryExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl StepValidator for RegistryExecutor {
    fn validate(&self, step: &Step) -> Result<(), String> {
        self.registry
            .validate(step)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ActionExecutor for RegistryExecutor {
    async fn act(&self, step: &Step) -> Outcome {
        let started = Instant::now();
        match self.registry.execute(step).await {
            Ok(note) => {
                debug!(
                    tool = %step.tool,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "{note}"
                );
                Outcome::Ok
            }
            Err(e) => {
                warn!(tool = %step.tool, error = %e, "Action failed");
                Outcome::error(e.to_string())
            }
        }
    }

    fn effect_class(&self, step: &Step) -> PermissionScope {
        self.registry
            .get(&step.tool)
            .map(|t| t.effect_class())
            .unwrap_or_else(|| default_effect_class(&step.tool))
    }
}
