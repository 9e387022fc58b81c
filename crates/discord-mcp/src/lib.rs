// crates/discord-mcp/src/lib.rs
// ============================================================================
// Module: Discord MCP
// Description: MCP tool pipeline and event notifications for Discord.
// Purpose: Expose Discord operations as validated, permission-gated MCP tools.
// Dependencies: discord-mcp-config, reqwest, serde_json, tokio,
// tokio-tungstenite, tracing
// ============================================================================

//! ## Overview
//! Discord MCP serves a fixed catalog of Discord tools over line-delimited
//! JSON-RPC on stdio. Every `tools/call` runs through one pipeline: registry
//! lookup, schema validation, capability checks, then the tool body against
//! a [`ChatService`]. Event notifications share the response writer lock, so
//! output lines never interleave.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod catalog;
pub mod discord;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod notifications;
pub mod output;
pub mod permissions;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod tools;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::McpAuditEvent;
pub use audit::McpAuditSink;
pub use audit::McpFileAuditSink;
pub use audit::McpNoopAuditSink;
pub use audit::McpStderrAuditSink;
pub use catalog::ToolName;
pub use discord::DiscordClient;
pub use events::EventDispatcher;
pub use gateway::GatewayConnector;
pub use gateway::GatewayError;
pub use gateway::WebSocketConnector;
pub use notifications::EmitOutcome;
pub use notifications::NotificationChannel;
pub use output::SharedWriter;
pub use permissions::PermissionGate;
pub use schema::Schema;
pub use server::McpServer;
pub use server::McpServerError;
pub use server::Session;
pub use server::SessionState;
pub use service::ChatService;
pub use service::ServiceError;
pub use telemetry::MCP_LATENCY_BUCKETS_MS;
pub use telemetry::McpMethod;
pub use telemetry::McpMetricEvent;
pub use telemetry::McpMetrics;
pub use telemetry::McpOutcome;
pub use telemetry::NoopMetrics;
pub use tools::ToolDefinition;
pub use tools::ToolRegistry;
pub use tools::ToolRegistryBuilder;
pub use tools::ToolRouter;
pub use validation::Validator;
