// crates/discord-mcp/src/protocol.rs
// ============================================================================
// Module: MCP Protocol Types
// Description: JSON-RPC 2.0 envelopes and MCP payload shapes.
// Purpose: Define the line-delimited wire format shared by responses and
//          notifications.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every line on the wire is one self-contained JSON document: a request
//! (`id` present), a notification (`id` absent) or a response. This module
//! holds the envelope types, the fixed error codes and the tool result shape.
//! Envelopes are created per message and never persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

use crate::tools::ToolDefinition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON-RPC protocol version accepted and emitted.
pub const JSONRPC_VERSION: &str = "2.0";
/// MCP protocol revision negotiated during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request, or the session state rejects it.
pub const INVALID_REQUEST: i64 = -32600;
/// The method (or tool) does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal server error.
pub const INTERNAL_ERROR: i64 = -32603;
/// Outbound content exceeds the configured maximum length.
pub const CONTENT_TOO_LONG: i64 = -32000;

/// Method names in the fixed dispatch table.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification.
    pub const INITIALIZED: &str = "initialized";
    /// Tool listing request.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation request.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Liveness request.
    pub const PING: &str = "ping";
}

// ============================================================================
// SECTION: Envelopes
// ============================================================================

/// Deserializes a member that is present, keeping a JSON `null` as a value.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Incoming JSON-RPC message.
///
/// # Invariants
/// - `id == None` marks a notification, which is never answered.
/// - A present `"id": null` deserializes to `Some(Value::Null)` and is a
///   request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    pub jsonrpc: String,
    /// Request identifier; `None` only when the member is absent.
    #[serde(default, deserialize_with = "present_value")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Optional parameters payload.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Returns true when the message carries no id.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    pub jsonrpc: String,
    /// Request identifier (`null` when it could not be determined).
    pub id: Value,
    /// Successful result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Builds an error without structured detail.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Outbound JSON-RPC notification (no `id`).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC protocol version.
    pub jsonrpc: &'static str,
    /// Notification method (event name).
    pub method: String,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Builds a notification for the given event.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// SECTION: MCP Payloads
// ============================================================================

/// `initialize` request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision requested by the client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capability advertisement.
    #[serde(default)]
    pub capabilities: Option<Value>,
    /// Client identity.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Client identity sent during `initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// `initialize` result payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol revision.
    pub protocol_version: &'static str,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: ServerInfo,
}

/// Server capability advertisement.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool capability flags.
    pub tools: ToolsCapability,
}

/// Tool capability flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the tool list may change at runtime. Always false.
    pub list_changed: bool,
}

/// Server identity reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// `tools/call` request parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Tool name.
    pub name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// `tools/list` result payload.
#[derive(Debug, Clone, Serialize)]
pub struct ToolListResult {
    /// Registered tool definitions.
    pub tools: Vec<ToolDefinition>,
}

/// Tool call result payload.
///
/// # Invariants
/// - `isError` is omitted from the wire form when false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Tool output content.
    pub content: Vec<ToolContent>,
    /// Marks a tool-level failure delivered as a successful response.
    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Builds a successful result with text and structured data.
    #[must_use]
    pub fn success(text: impl Into<String>, data: Value) -> Self {
        Self {
            content: vec![ToolContent::text(text, Some(data))],
            is_error: false,
        }
    }

    /// Builds a tool-level failure with text and structured data.
    #[must_use]
    pub fn error(text: impl Into<String>, data: Value) -> Self {
        Self {
            content: vec![ToolContent::text(text, Some(data))],
            is_error: true,
        }
    }

    /// Returns the structured data of the first content item.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.content.first().and_then(|content| content.data.as_ref())
    }

    /// Returns the text of the first content item.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.first().map(|content| content.text.as_str())
    }
}

/// One tool output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    /// Content type label; always `text`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable text.
    pub text: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolContent {
    /// Builds a text content item.
    #[must_use]
    pub fn text(text: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
            data,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serde predicate used to skip false flags.
#[allow(clippy::trivially_copy_pass_by_ref, reason = "Serde skip predicates take references.")]
const fn is_false(value: &bool) -> bool {
    !*value
}
