// crates/discord-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Line-delimited JSON-RPC session over stdio.
// Purpose: Expose the Discord tools via JSON-RPC 2.0.
// Dependencies: discord-mcp-config, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`Session`] owns the handshake state machine and dispatches one input line
//! at a time through [`crate::tools::ToolRouter`]. [`McpServer`] wires the
//! configuration, the Discord client, the frozen tool registry and the audit
//! sink together and serves the session on stdin/stdout. With events enabled
//! it also runs the gateway event source for the lifetime of the session.
//!
//! ## Invariants
//! - Lines are processed strictly sequentially; a tool call completes before
//!   the next line is read.
//! - Notifications (messages without `id`) are never answered.
//! - `tools/list` and `tools/call` are rejected until `initialized` arrives.
//! - Every response goes through the same [`SharedWriter`] lock as event
//!   notifications.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use discord_mcp_config::DiscordMcpConfig;
use discord_mcp_config::McpConfig;
use discord_mcp_config::ServerConfig;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::audit::McpAuditEvent;
use crate::audit::McpAuditEventParams;
use crate::audit::McpAuditSink;
use crate::audit::McpFileAuditSink;
use crate::audit::McpNoopAuditSink;
use crate::audit::McpStderrAuditSink;
use crate::discord::DiscordClient;
use crate::events::EventDispatcher;
use crate::gateway::GatewayConnector;
use crate::gateway::WebSocketConnector;
use crate::gateway::run_event_source;
use crate::handlers::register_discord_tools;
use crate::notifications::NotificationChannel;
use crate::output::SharedWriter;
use crate::protocol::INTERNAL_ERROR;
use crate::protocol::INVALID_PARAMS;
use crate::protocol::INVALID_REQUEST;
use crate::protocol::InitializeParams;
use crate::protocol::InitializeResult;
use crate::protocol::JSONRPC_VERSION;
use crate::protocol::JsonRpcError;
use crate::protocol::JsonRpcRequest;
use crate::protocol::JsonRpcResponse;
use crate::protocol::METHOD_NOT_FOUND;
use crate::protocol::PARSE_ERROR;
use crate::protocol::PROTOCOL_VERSION;
use crate::protocol::ServerCapabilities;
use crate::protocol::ServerInfo;
use crate::protocol::ToolCallParams;
use crate::protocol::ToolListResult;
use crate::protocol::ToolsCapability;
use crate::protocol::methods;
use crate::service::ChatService;
use crate::telemetry::McpMethod;
use crate::telemetry::McpMetricEvent;
use crate::telemetry::McpMetrics;
use crate::telemetry::McpOutcome;
use crate::telemetry::NoopMetrics;
use crate::tools::ToolError;
use crate::tools::ToolRegistryBuilder;
use crate::tools::ToolRouter;
use crate::validation::Validator;

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Server configuration.
    config: DiscordMcpConfig,
    /// Discord REST client.
    client: Arc<DiscordClient>,
    /// Shared protocol output sink.
    writer: SharedWriter,
    /// Request audit sink.
    audit: Arc<dyn McpAuditSink>,
    /// Gateway connector for the event source.
    gateway: Arc<dyn GatewayConnector>,
}

impl McpServer {
    /// Builds a new MCP server from configuration. No remote call is made.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when validation or initialization fails.
    pub fn from_config(config: DiscordMcpConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let client = DiscordClient::from_config(&config.discord)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        let audit = build_audit_sink(&config.server)?;
        let gateway = Arc::new(WebSocketConnector::new(&config.discord.gateway_url));
        Ok(Self {
            config,
            client: Arc::new(client),
            writer: SharedWriter::stdout(),
            audit,
            gateway,
        })
    }

    /// Replaces the protocol output sink.
    #[must_use]
    pub fn with_writer(mut self, writer: SharedWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Replaces the gateway connector.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn GatewayConnector>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Returns an event dispatcher that writes through the session output.
    #[must_use]
    pub fn event_dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(NotificationChannel::new(
            self.config.events.clone(),
            self.writer.clone(),
        ))
    }

    /// Spawns the gateway event source when events are enabled.
    ///
    /// The task ends with the gateway connection; failures are logged and do
    /// not affect the stdio session.
    #[must_use]
    pub fn start_event_source(&self) -> Option<JoinHandle<()>> {
        if !self.config.events.enabled {
            debug!("event notifications disabled; gateway not started");
            return None;
        }
        let gateway = Arc::clone(&self.gateway);
        let token = self.config.discord.token.trim().to_string();
        let dispatcher = self.event_dispatcher();
        Some(tokio::spawn(async move {
            match run_event_source(gateway.as_ref(), token, &dispatcher).await {
                Ok(()) => info!("gateway stream ended"),
                Err(err) => warn!(error = %err, "gateway event source stopped"),
            }
        }))
    }

    /// Connects to Discord and serves the stdio session until input closes.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the connection or the transport fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        self.client
            .connect()
            .await
            .map_err(|err| McpServerError::Init(format!("discord connection failed: {err}")))?;
        let service: Arc<dyn ChatService> = self.client.clone();
        let router = build_router(service)?;
        info!(
            server = self.config.mcp.server_name.as_str(),
            tools = router.registry().len(),
            events = self.config.events.enabled,
            "mcp server ready on stdio"
        );
        let events = self.start_event_source();
        let mut session = Session::new(router, self.writer.clone(), server_info(&self.config.mcp))
            .with_audit(Arc::clone(&self.audit));
        let result = session.run(BufReader::new(tokio::io::stdin())).await;
        if let Some(events) = events {
            events.abort();
        }
        self.client.disconnect();
        result
    }
}

/// Registers every Discord tool against `service` and freezes the registry.
///
/// # Errors
///
/// Returns [`McpServerError::Init`] when registration fails.
pub fn build_router(service: Arc<dyn ChatService>) -> Result<ToolRouter, McpServerError> {
    let mut builder = ToolRegistryBuilder::new();
    register_discord_tools(&mut builder, Arc::clone(&service))
        .map_err(|err| McpServerError::Init(err.to_string()))?;
    Ok(ToolRouter::new(builder.build(), Arc::new(Validator::new()), service))
}

/// Returns the server identity advertised during `initialize`.
#[must_use]
pub fn server_info(config: &McpConfig) -> ServerInfo {
    ServerInfo {
        name: config.server_name.clone(),
        version: config.version.clone(),
    }
}

/// Selects the audit sink: a file when configured, stderr in debug mode,
/// otherwise none.
fn build_audit_sink(config: &ServerConfig) -> Result<Arc<dyn McpAuditSink>, McpServerError> {
    if let Some(path) = &config.audit_log {
        let sink = McpFileAuditSink::new(Path::new(path))
            .map_err(|err| McpServerError::Init(format!("audit log open failed: {err}")))?;
        return Ok(Arc::new(sink));
    }
    if config.debug {
        return Ok(Arc::new(McpStderrAuditSink));
    }
    Ok(Arc::new(McpNoopAuditSink))
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Handshake state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the `initialized` notification.
    Uninitialized,
    /// Tool methods are available.
    Initialized,
    /// Input ended or output failed. Terminal.
    Closed,
}

/// One answered request awaiting its write.
struct Exchange {
    /// Response envelope.
    response: JsonRpcResponse,
    /// Method classification for audit and metrics.
    method: McpMethod,
    /// Tool name for `tools/call`.
    tool: Option<String>,
}

impl Exchange {
    /// Builds an exchange without a tool label.
    const fn new(response: JsonRpcResponse, method: McpMethod) -> Self {
        Self {
            response,
            method,
            tool: None,
        }
    }
}

/// Sequential JSON-RPC session bound to one output sink.
pub struct Session {
    /// Handshake state.
    state: SessionState,
    /// Tool router.
    router: ToolRouter,
    /// Shared protocol output sink.
    writer: SharedWriter,
    /// Identity reported by `initialize`.
    info: ServerInfo,
    /// Request audit sink.
    audit: Arc<dyn McpAuditSink>,
    /// Request metrics sink.
    metrics: Arc<dyn McpMetrics>,
}

impl Session {
    /// Creates an uninitialized session with no-op audit and metrics sinks.
    #[must_use]
    pub fn new(router: ToolRouter, writer: SharedWriter, info: ServerInfo) -> Self {
        Self {
            state: SessionState::Uninitialized,
            router,
            writer,
            info,
            audit: Arc::new(McpNoopAuditSink),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn McpAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn McpMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the handshake state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Reads lines until end of input, answering each request in order.
    ///
    /// The session is [`SessionState::Closed`] when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Transport`] when reading input or writing a
    /// response fails.
    pub async fn run<R>(&mut self, mut reader: R) -> Result<(), McpServerError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = match reader.read_until(b'\n', &mut buf).await {
                Ok(read) => read,
                Err(err) => {
                    self.state = SessionState::Closed;
                    return Err(McpServerError::Transport(format!("stdin read failed: {err}")));
                }
            };
            if read == 0 {
                info!("input closed; ending session");
                break;
            }
            let started = Instant::now();
            let line = String::from_utf8_lossy(&buf);
            let Some(exchange) = self.process_line(&line).await else {
                continue;
            };
            match self.writer.write_envelope(&exchange.response) {
                Ok(written) => self.record(&exchange, line.len(), written, started.elapsed()),
                Err(err) => {
                    error!(error = %err, "response write failed; closing session");
                    self.state = SessionState::Closed;
                    return Err(McpServerError::Transport(err.to_string()));
                }
            }
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    /// Handles one input line and returns the response, if any. The response
    /// is neither written nor audited.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        self.process_line(line).await.map(|exchange| exchange.response)
    }

    /// Parses and dispatches one line.
    async fn process_line(&mut self, line: &str) -> Option<Exchange> {
        if self.state == SessionState::Closed {
            return None;
        }
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "unparseable input line");
                let error =
                    JsonRpcError::new(PARSE_ERROR, "Parse error").with_data(json!(err.to_string()));
                return Some(Exchange::new(
                    JsonRpcResponse::failure(Value::Null, error),
                    McpMethod::Invalid,
                ));
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(err) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                let error = JsonRpcError::new(INVALID_REQUEST, "Invalid Request")
                    .with_data(json!(err.to_string()));
                return Some(Exchange::new(JsonRpcResponse::failure(id, error), McpMethod::Invalid));
            }
        };
        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        if request.jsonrpc != JSONRPC_VERSION {
            let error = JsonRpcError::new(INVALID_REQUEST, "Invalid JSON-RPC version");
            return Some(Exchange::new(JsonRpcResponse::failure(id, error), McpMethod::Invalid));
        }
        Some(self.dispatch(id, request).await)
    }

    /// Applies a notification. Only `initialized` has an effect.
    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        if request.method == methods::INITIALIZED {
            self.mark_initialized();
        } else {
            debug!(method = request.method.as_str(), "ignoring notification");
        }
    }

    /// Moves the session to [`SessionState::Initialized`].
    fn mark_initialized(&mut self) {
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Initialized;
            info!("client initialized");
        }
    }

    /// Dispatches a request by method name.
    async fn dispatch(&mut self, id: Value, request: JsonRpcRequest) -> Exchange {
        let method = McpMethod::classify(&request.method);
        match request.method.as_str() {
            methods::INITIALIZE => Exchange::new(self.initialize(id, request.params), method),
            methods::INITIALIZED => {
                self.mark_initialized();
                Exchange::new(JsonRpcResponse::success(id, json!({})), method)
            }
            methods::PING => {
                Exchange::new(JsonRpcResponse::success(id, json!({"status": "pong"})), method)
            }
            methods::TOOLS_LIST | methods::TOOLS_CALL
                if self.state != SessionState::Initialized =>
            {
                let error = JsonRpcError::new(INVALID_REQUEST, "Server not initialized");
                Exchange::new(JsonRpcResponse::failure(id, error), method)
            }
            methods::TOOLS_LIST => {
                let result = ToolListResult {
                    tools: self.router.list_tools(),
                };
                let response = match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(_) => jsonrpc_error(id, ToolError::Serialization),
                };
                Exchange::new(response, method)
            }
            methods::TOOLS_CALL => self.call_tool(id, request.params).await,
            other => {
                let error = JsonRpcError::new(METHOD_NOT_FOUND, format!("Method not found: {other}"));
                Exchange::new(JsonRpcResponse::failure(id, error), method)
            }
        }
    }

    /// Answers `initialize`.
    fn initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            None | Some(Value::Null) => InitializeParams::default(),
            Some(value) => match serde_json::from_value::<InitializeParams>(value) {
                Ok(params) => params,
                Err(err) => return invalid_params(id, &err.to_string()),
            },
        };
        if let Some(client) = &params.client_info {
            info!(
                client = client.name.as_str(),
                client_version = client.version.as_deref().unwrap_or("unknown"),
                protocol_version = params.protocol_version.as_deref().unwrap_or(PROTOCOL_VERSION),
                "initialize received"
            );
        } else {
            info!("initialize received without client info");
        }
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION,
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: self.info.clone(),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(_) => jsonrpc_error(id, ToolError::Serialization),
        }
    }

    /// Answers `tools/call`.
    async fn call_tool(&self, id: Value, params: Option<Value>) -> Exchange {
        let params = match params.map(serde_json::from_value::<ToolCallParams>) {
            Some(Ok(params)) => params,
            Some(Err(err)) => {
                return Exchange::new(invalid_params(id, &err.to_string()), McpMethod::ToolsCall);
            }
            None => {
                return Exchange::new(
                    invalid_params(id, "missing tools/call params"),
                    McpMethod::ToolsCall,
                );
            }
        };
        let response = match self.router.handle_tool_call(&params.name, params.arguments).await {
            Ok(result) => match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(_) => jsonrpc_error(id, ToolError::Serialization),
            },
            Err(err) => {
                warn!(tool = params.name.as_str(), error = %err, "tool call failed");
                jsonrpc_error(id, err)
            }
        };
        Exchange {
            response,
            method: McpMethod::ToolsCall,
            tool: Some(params.name),
        }
    }

    /// Records audit and metrics for a written response.
    fn record(
        &self,
        exchange: &Exchange,
        request_bytes: usize,
        response_bytes: usize,
        latency: Duration,
    ) {
        let response = &exchange.response;
        let error_code = response.error.as_ref().map(|error| error.code);
        let outcome = if error_code.is_some() { McpOutcome::Error } else { McpOutcome::Success };
        let tool_error = response
            .result
            .as_ref()
            .and_then(|result| result.get("isError"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.audit.record(&McpAuditEvent::new(McpAuditEventParams {
            request_id: render_id(&response.id),
            method: exchange.method,
            tool: exchange.tool.clone(),
            outcome,
            error_code,
            tool_error,
            request_bytes,
            response_bytes,
        }));
        let event = McpMetricEvent {
            method: exchange.method,
            tool: exchange.tool.clone(),
            outcome,
            error_code,
            request_bytes,
            response_bytes,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, latency);
    }
}

/// Renders a request id for audit records.
fn render_id(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Builds an `InvalidParams` response carrying the decoder message.
fn invalid_params(id: Value, detail: &str) -> JsonRpcResponse {
    jsonrpc_error(id, ToolError::InvalidParams(detail.to_string()))
}

/// Builds a JSON-RPC error response for a tool failure.
#[must_use]
pub fn jsonrpc_error(id: Value, error: ToolError) -> JsonRpcResponse {
    let error = match error {
        ToolError::UnknownTool(name) => {
            JsonRpcError::new(METHOD_NOT_FOUND, format!("Tool not found: {name}"))
        }
        ToolError::InvalidParams(detail) => {
            JsonRpcError::new(INVALID_PARAMS, "Invalid parameters").with_data(json!(detail))
        }
        ToolError::Serialization => {
            JsonRpcError::new(INTERNAL_ERROR, "Tool execution failed: serialization failure")
        }
        ToolError::Internal(detail) => {
            JsonRpcError::new(INTERNAL_ERROR, format!("Tool execution failed: {detail}"))
        }
    };
    JsonRpcResponse::failure(id, error)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
