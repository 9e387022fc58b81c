// crates/discord-mcp/src/tools.rs
// ============================================================================
// Module: Tool Registry and Router
// Description: Write-once tool registry and the per-call tool pipeline.
// Purpose: Validate, gate and execute tool calls in a fixed order.
// Dependencies: async-trait, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`ToolRegistryBuilder`] collects tool entries at startup and freezes them
//! into a read-only [`ToolRegistry`]. [`ToolRouter::handle_tool_call`] runs the
//! pipeline for one call: lookup, validation, permission checks, execution.
//!
//! ## Invariants
//! - Tool names are unique; the registry is never mutated after `build`.
//! - Validation completes before any permission check runs.
//! - Validation, permission and remote failures are `isError` results, never
//!   [`ToolError`]s.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::catalog::ToolName;
use crate::catalog::tool_schema;
use crate::permissions::PermissionCheck;
use crate::permissions::PermissionGate;
use crate::protocol::ToolCallResult;
use crate::schema::Schema;
use crate::service::ChatService;
use crate::validation::Validator;

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Advertised tool definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Executable bound to a registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Returns the permission checks for validated arguments, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidParams`] when arguments cannot be decoded.
    fn permission_checks(&self, arguments: &Map<String, Value>)
    -> Result<Vec<PermissionCheck>, ToolError>;

    /// Executes the tool with validated, authorized arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for failures outside the tool-result convention.
    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolCallResult, ToolError>;
}

/// One registry entry.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Argument schema.
    pub schema: Schema,
    /// Bound executable.
    pub handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    /// Builds an entry for a catalog tool.
    #[must_use]
    pub fn from_catalog(tool: ToolName, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: tool.as_str().to_string(),
            description: tool.description().to_string(),
            schema: tool_schema(tool),
            handler,
        }
    }

    /// Returns the advertised definition.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.schema.to_json(),
        }
    }
}

/// Returns the definitions of every catalog tool in canonical order, without
/// binding any executable.
#[must_use]
pub fn catalog_definitions() -> Vec<ToolDefinition> {
    ToolName::all()
        .iter()
        .map(|tool| ToolDefinition {
            name: tool.as_str().to_string(),
            description: tool.description().to_string(),
            input_schema: tool_schema(*tool).to_json(),
        })
        .collect()
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registration-phase collector for tool entries.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    /// Entries in registration order.
    tools: Vec<RegisteredTool>,
}

impl ToolRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is already taken.
    pub fn register(&mut self, tool: RegisteredTool) -> Result<&mut Self, RegistryError> {
        if tool.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.tools.iter().any(|existing| existing.name == tool.name) {
            return Err(RegistryError::Duplicate(tool.name));
        }
        self.tools.push(tool);
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        let order = self.tools.iter().map(|tool| tool.name.clone()).collect();
        let tools = self.tools.into_iter().map(|tool| (tool.name.clone(), tool)).collect();
        ToolRegistry {
            tools: Arc::new(tools),
            order: Arc::new(order),
        }
    }
}

/// Read-only, name-keyed tool registry.
#[derive(Clone)]
pub struct ToolRegistry {
    /// Entries by name.
    tools: Arc<BTreeMap<String, RegisteredTool>>,
    /// Registration order used for listing.
    order: Arc<Vec<String>>,
}

impl ToolRegistry {
    /// Returns the entry for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(RegisteredTool::definition)
            .collect()
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Tool router for MCP requests.
#[derive(Clone)]
pub struct ToolRouter {
    /// Frozen tool registry.
    registry: ToolRegistry,
    /// Shared validator with its pattern cache.
    validator: Arc<Validator>,
    /// Capability gate.
    gate: PermissionGate,
    /// Remote service used to resolve the acting identity.
    service: Arc<dyn ChatService>,
}

impl ToolRouter {
    /// Creates a router over a frozen registry.
    #[must_use]
    pub fn new(
        registry: ToolRegistry,
        validator: Arc<Validator>,
        service: Arc<dyn ChatService>,
    ) -> Self {
        Self {
            registry,
            validator,
            gate: PermissionGate::new(Arc::clone(&service)),
            service,
        }
    }

    /// Lists the tools supported by this server.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handles a tool call by name with JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] for unregistered names and
    /// [`ToolError::InvalidParams`] when arguments are not an object.
    pub async fn handle_tool_call(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<ToolCallResult, ToolError> {
        let tool = self.registry.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let arguments = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ToolError::InvalidParams("arguments must be an object".to_string()));
            }
        };
        if let Err(failure) = self.validator.validate(&tool.schema, &arguments) {
            debug!(tool = name, kind = failure.kind.as_str(), "tool arguments rejected");
            return Ok(failure.to_tool_result());
        }
        let checks = tool.handler.permission_checks(&arguments)?;
        if !checks.is_empty() {
            let actor = match self.service.actor_id().await {
                Ok(actor) => actor,
                Err(err) => return Ok(err.to_tool_result("Permission check failed")),
            };
            if let Err(err) = self.gate.authorize_all(&actor, &checks).await {
                info!(tool = name, error = %err, "tool call denied");
                return Ok(err.to_tool_result());
            }
        }
        tool.handler.execute(arguments).await
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool routing errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name not registered.
    #[error("Tool not found: {0}")]
    UnknownTool(String),
    /// Arguments could not be decoded.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// Tool payload serialization failed.
    #[error("serialization failure")]
    Serialization,
    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Tool registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("duplicate tool name: {0}")]
    Duplicate(String),
    /// Tool name is empty.
    #[error("tool name must not be empty")]
    EmptyName,
}

/// Decodes validated arguments into a typed request.
///
/// # Errors
///
/// Returns [`ToolError::InvalidParams`] when the arguments do not match `T`.
pub fn decode<T: for<'de> Deserialize<'de>>(arguments: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| ToolError::InvalidParams(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
