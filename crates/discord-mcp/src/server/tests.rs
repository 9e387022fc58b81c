// crates/discord-mcp/src/server/tests.rs
// ============================================================================
// Module: MCP Server Unit Tests
// Description: Unit tests for the session state machine and error mapping.
// Purpose: Pin handshake gating, protocol error codes and loop termination.
// Dependencies: serde_json, tokio
// ============================================================================

//! ## Overview
//! Drives [`Session`] line by line over a stub service with no remote I/O.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::VecDeque;
use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use discord_mcp_config::DiscordMcpConfig;
use discord_mcp_config::EVENT_MESSAGE_CREATED;
use discord_mcp_config::KNOWN_EVENTS;
use serde_json::Value;
use serde_json::json;

use super::McpServer;
use super::Session;
use super::SessionState;
use super::build_router;
use super::jsonrpc_error;
use crate::audit::McpAuditEvent;
use crate::audit::McpAuditSink;
use crate::gateway::GatewayConnection;
use crate::gateway::GatewayConnector;
use crate::gateway::GatewayError;
use crate::output::SharedWriter;
use crate::protocol::INTERNAL_ERROR;
use crate::protocol::INVALID_PARAMS;
use crate::protocol::INVALID_REQUEST;
use crate::protocol::METHOD_NOT_FOUND;
use crate::protocol::PARSE_ERROR;
use crate::protocol::ServerInfo;
use crate::service::ChatService;
use crate::service::EntityRef;
use crate::service::MutationOp;
use crate::service::Scope;
use crate::service::ScopeGrants;
use crate::service::ServiceError;
use crate::telemetry::McpMethod;
use crate::telemetry::McpMetricEvent;
use crate::telemetry::McpMetrics;
use crate::telemetry::McpOutcome;
use crate::tools::ToolError;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Service with a fixed bot user and no capabilities.
struct StubService;

#[async_trait]
impl ChatService for StubService {
    fn is_connected(&self) -> bool {
        true
    }

    async fn fetch(&self, entity: &EntityRef) -> Result<Value, ServiceError> {
        match entity {
            EntityRef::CurrentUser => {
                Ok(json!({"id": "100", "username": "relay", "discriminator": "0001"}))
            }
            other => Err(ServiceError::RemoteNotFound(other.kind().to_string())),
        }
    }

    async fn mutate(
        &self,
        entity: &EntityRef,
        _op: MutationOp,
        _payload: Value,
    ) -> Result<Value, ServiceError> {
        Err(ServiceError::Unsupported(entity.kind().to_string()))
    }

    async fn capability_grants(
        &self,
        _actor_id: &str,
        _scope: &Scope,
    ) -> Result<ScopeGrants, ServiceError> {
        Ok(ScopeGrants::Granted(vec![0]))
    }
}

/// Audit sink that keeps every event.
#[derive(Default)]
struct RecordingAudit {
    events: Mutex<Vec<McpAuditEvent>>,
}

impl McpAuditSink for RecordingAudit {
    fn record(&self, event: &McpAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Metrics sink that keeps every observation.
#[derive(Default)]
struct RecordingMetrics {
    requests: Mutex<Vec<McpMetricEvent>>,
    latencies: Mutex<Vec<(McpMethod, Duration)>>,
}

impl McpMetrics for RecordingMetrics {
    fn record_request(&self, event: McpMetricEvent) {
        self.requests.lock().unwrap().push(event);
    }

    fn record_latency(&self, event: McpMetricEvent, latency: Duration) {
        self.latencies.lock().unwrap().push((event.method, latency));
    }
}

/// Gateway connection replaying fixed frames and recording sends.
struct ReplayConnection {
    frames: VecDeque<String>,
    sent: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl GatewayConnection for ReplayConnection {
    async fn next_frame(&mut self) -> Option<Result<String, GatewayError>> {
        self.frames.pop_front().map(Ok)
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), GatewayError> {
        self.sent.lock().unwrap().push(serde_json::from_str(&frame).unwrap());
        Ok(())
    }
}

/// Connector returning a fresh replay of the same frames on every connect.
struct ReplayConnector {
    frames: Vec<Value>,
    sent: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl GatewayConnector for ReplayConnector {
    async fn connect(&self) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        Ok(Box::new(ReplayConnection {
            frames: self.frames.iter().map(Value::to_string).collect(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

/// Writer that always fails.
struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn session_with(writer: SharedWriter) -> Session {
    let service: Arc<dyn ChatService> = Arc::new(StubService);
    let router = build_router(service).unwrap();
    Session::new(
        router,
        writer,
        ServerInfo {
            name: "discord-mcp".to_string(),
            version: "1.0.0".to_string(),
        },
    )
}

fn session() -> Session {
    session_with(SharedWriter::in_memory().0)
}

async fn initialized_session() -> Session {
    let mut session = session();
    let response = session.handle_line(r#"{"jsonrpc":"2.0","method":"initialized"}"#).await;
    assert!(response.is_none());
    assert_eq!(session.state(), SessionState::Initialized);
    session
}

fn server_config(events_enabled: bool) -> DiscordMcpConfig {
    let mut config = DiscordMcpConfig::default();
    config.discord.token = "server-token".to_string();
    config.events.enabled = events_enabled;
    config.events.allowed_events = KNOWN_EVENTS.iter().map(|event| (*event).to_string()).collect();
    config
}

fn error_code(response: &crate::protocol::JsonRpcResponse) -> i64 {
    response.error.as_ref().unwrap().code
}

// ============================================================================
// SECTION: Handshake
// ============================================================================

#[tokio::test]
async fn initialize_reports_server_identity_without_changing_state() {
    let mut session = session();
    let response = session
        .handle_line(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"inspector","version":"0.3"}}}"#,
        )
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(response.id, json!(1));
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "discord-mcp");
    assert_eq!(result["serverInfo"]["version"], "1.0.0");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn initialize_rejects_malformed_params() {
    let mut session = session();
    let response = session
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"initialize","params":{"clientInfo":7}}"#)
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_PARAMS);
    assert_eq!(error.message, "Invalid parameters");
    assert!(error.data.is_some());
}

#[tokio::test]
async fn tool_methods_are_rejected_before_initialized() {
    let mut session = session();
    for line in [
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/list"}"#,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"ping"}}"#,
        r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"no_such_tool"}}"#,
    ] {
        let response = session.handle_line(line).await.unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_REQUEST);
        assert_eq!(error.message, "Server not initialized");
    }
}

#[tokio::test]
async fn ping_is_answered_in_any_state() {
    let mut session = session();
    let before = session.handle_line(r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#).await;
    assert_eq!(before.unwrap().result.unwrap(), json!({"status": "pong"}));
    let mut session = initialized_session().await;
    let after = session.handle_line(r#"{"jsonrpc":"2.0","id":"b","method":"ping"}"#).await;
    assert_eq!(after.unwrap().id, json!("b"));
}

#[tokio::test]
async fn tools_list_returns_every_registered_tool_once() {
    let mut session = initialized_session().await;
    let response =
        session.handle_line(r#"{"jsonrpc":"2.0","id":6,"method":"tools/list"}"#).await.unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    let mut names: Vec<&str> = tools.iter().map(|tool| tool["name"].as_str().unwrap()).collect();
    assert_eq!(names.len(), 16);
    assert_eq!(names[0], "ping");
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 16);
    assert!(tools.iter().all(|tool| tool["inputSchema"]["type"] == "object"));
}

// ============================================================================
// SECTION: Protocol Errors
// ============================================================================

#[tokio::test]
async fn unparseable_line_yields_parse_error_with_null_id() {
    let mut session = session();
    let response = session.handle_line("{not json").await.unwrap();
    assert_eq!(response.id, Value::Null);
    let error = response.error.unwrap();
    assert_eq!(error.code, PARSE_ERROR);
    assert_eq!(error.message, "Parse error");
    assert!(error.data.is_some());
}

#[tokio::test]
async fn blank_lines_and_notifications_get_no_response() {
    let mut session = session();
    assert!(session.handle_line("   ").await.is_none());
    assert!(session.handle_line(r#"{"jsonrpc":"2.0","method":"tools/list"}"#).await.is_none());
    assert!(
        session.handle_line(r#"{"jsonrpc":"2.0","method":"notifications/cancelled"}"#).await.is_none()
    );
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn wrong_version_is_an_invalid_request() {
    let mut session = session();
    let response =
        session.handle_line(r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#).await.unwrap();
    assert_eq!(response.id, json!(7));
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_REQUEST);
    assert_eq!(error.message, "Invalid JSON-RPC version");
}

#[tokio::test]
async fn non_request_object_is_an_invalid_request() {
    let mut session = session();
    let response = session.handle_line(r#"{"jsonrpc":"2.0","id":8}"#).await.unwrap();
    assert_eq!(response.id, json!(8));
    assert_eq!(error_code(&response), INVALID_REQUEST);
}

#[tokio::test]
async fn unknown_method_echoes_id() {
    let mut session = initialized_session().await;
    let response =
        session.handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"resources/list"}"#).await.unwrap();
    assert_eq!(response.id, json!(9));
    let error = response.error.unwrap();
    assert_eq!(error.code, METHOD_NOT_FOUND);
    assert_eq!(error.message, "Method not found: resources/list");
}

#[tokio::test]
async fn unknown_tool_is_method_not_found_scoped_to_the_name() {
    let mut session = initialized_session().await;
    let response = session
        .handle_line(r#"{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"shout"}}"#)
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, METHOD_NOT_FOUND);
    assert_eq!(error.message, "Tool not found: shout");
}

#[tokio::test]
async fn tools_call_without_params_is_invalid_params() {
    let mut session = initialized_session().await;
    let response =
        session.handle_line(r#"{"jsonrpc":"2.0","id":11,"method":"tools/call"}"#).await.unwrap();
    assert_eq!(error_code(&response), INVALID_PARAMS);
}

#[test]
fn tool_errors_map_to_jsonrpc_codes() {
    let internal = jsonrpc_error(json!(1), ToolError::Internal("boom".to_string()));
    let error = internal.error.unwrap();
    assert_eq!(error.code, INTERNAL_ERROR);
    assert_eq!(error.message, "Tool execution failed: boom");
    let params = jsonrpc_error(json!(2), ToolError::InvalidParams("bad".to_string()));
    let error = params.error.unwrap();
    assert_eq!(error.code, INVALID_PARAMS);
    assert_eq!(error.data, Some(json!("bad")));
}

// ============================================================================
// SECTION: Tool Calls
// ============================================================================

#[tokio::test]
async fn ping_tool_reports_bot_identity() {
    let mut session = initialized_session().await;
    let response = session
        .handle_line(r#"{"jsonrpc":"2.0","id":12,"method":"tools/call","params":{"name":"ping","arguments":{}}}"#)
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert!(result.get("isError").is_none());
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("✅ Discord MCP Server is healthy!"));
    assert!(text.contains("relay#0001"));
}

#[tokio::test]
async fn validation_failure_precedes_permission_check() {
    let mut session = initialized_session().await;
    let response = session
        .handle_line(r#"{"jsonrpc":"2.0","id":13,"method":"tools/call","params":{"name":"send_message","arguments":{"channel_id":"5"}}}"#)
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    let data = &result["content"][0]["data"];
    assert_eq!(data["error_type"], "missing required parameter");
    assert_eq!(data["field"], "content");
}

#[tokio::test]
async fn valid_call_without_capabilities_is_a_permission_result() {
    let mut session = initialized_session().await;
    let response = session
        .handle_line(r#"{"jsonrpc":"2.0","id":14,"method":"tools/call","params":{"name":"send_message","arguments":{"channel_id":"5","content":"hi"}}}"#)
        .await
        .unwrap();
    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    let data = &result["content"][0]["data"];
    assert_eq!(data["error_type"], "permission");
    assert_eq!(data["permission"], "VIEW_CHANNEL");
    assert_eq!(data["resource"], "channel:5");
}

// ============================================================================
// SECTION: Serving Loop
// ============================================================================

#[tokio::test]
async fn run_answers_requests_in_order_and_closes_on_eof() {
    let (writer, buffer) = SharedWriter::in_memory();
    let audit = Arc::new(RecordingAudit::default());
    let mut session = session_with(writer).with_audit(Arc::clone(&audit) as Arc<dyn McpAuditSink>);
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"initialized"}"#,
        "\n",
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
        "garbage\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
    );
    session.run(tokio::io::BufReader::new(input.as_bytes())).await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let lines = buffer.lines();
    assert_eq!(lines.len(), 4);
    let ids: Vec<Value> = lines
        .iter()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!(1), json!(2), Value::Null, json!(3)]);

    let events = audit.events.lock().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[1].method, McpMethod::ToolsList);
    assert_eq!(events[2].method, McpMethod::Invalid);
    assert_eq!(events[2].outcome, McpOutcome::Error);
    assert_eq!(events[2].error_code, Some(PARSE_ERROR));
    assert_eq!(events[3].request_id.as_deref(), Some("3"));
    assert!(events.iter().all(|event| event.response_bytes > 0));
}

#[tokio::test]
async fn run_stops_on_write_failure() {
    let mut session = session_with(SharedWriter::new(BrokenPipe));
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        "\n",
    );
    let result = session.run(tokio::io::BufReader::new(input.as_bytes())).await;
    assert!(result.is_err());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).await.is_none());
}

#[tokio::test]
async fn run_records_metrics_for_every_written_response() {
    let metrics = Arc::new(RecordingMetrics::default());
    let mut session = session().with_metrics(Arc::clone(&metrics) as Arc<dyn McpMetrics>);
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"initialized"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"nope"}}"#,
        "\n",
    );
    session.run(tokio::io::BufReader::new(input.as_bytes())).await.unwrap();

    let requests = metrics.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, McpMethod::Ping);
    assert_eq!(requests[0].outcome, McpOutcome::Success);
    assert_eq!(requests[1].method, McpMethod::ToolsCall);
    assert_eq!(requests[1].tool.as_deref(), Some("nope"));
    assert_eq!(requests[1].error_code, Some(METHOD_NOT_FOUND));
    assert!(requests.iter().all(|event| event.request_bytes > 0 && event.response_bytes > 0));

    let latencies = metrics.latencies.lock().unwrap();
    assert_eq!(
        latencies.iter().map(|(method, _)| *method).collect::<Vec<_>>(),
        vec![McpMethod::Ping, McpMethod::ToolsCall]
    );
}

// ============================================================================
// SECTION: Request Identifiers
// ============================================================================

#[tokio::test]
async fn null_id_is_a_request_and_is_answered() {
    let mut session = initialized_session().await;
    let response = session
        .handle_line(r#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#)
        .await
        .expect("null id must be answered");
    assert_eq!(response.id, Value::Null);
    assert!(response.error.is_none());
    assert!(response.result.is_some());
}

#[tokio::test]
async fn null_id_is_answered_before_initialized() {
    let mut session = session();
    let response =
        session.handle_line(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).await.unwrap();
    assert_eq!(response.id, Value::Null);
    assert_eq!(response.result, Some(json!({"status": "pong"})));
}

// ============================================================================
// SECTION: Server Assembly
// ============================================================================

#[test]
fn from_config_builds_without_remote_calls() {
    assert!(McpServer::from_config(server_config(false)).is_ok());
}

#[test]
fn from_config_rejects_missing_token() {
    let result = McpServer::from_config(DiscordMcpConfig::default());
    assert!(matches!(result, Err(super::McpServerError::Config(_))));
}

#[tokio::test]
async fn event_source_is_not_started_when_events_are_disabled() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let server = McpServer::from_config(server_config(false)).unwrap().with_gateway(Arc::new(
        ReplayConnector {
            frames: vec![json!({"op": 10, "d": {"heartbeat_interval": 45_000}})],
            sent: Arc::clone(&sent),
        },
    ));
    assert!(server.start_event_source().is_none());
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn event_source_writes_gateway_dispatches_through_session_output() {
    let (writer, buffer) = SharedWriter::in_memory();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let connector = ReplayConnector {
        frames: vec![
            json!({"op": 10, "d": {"heartbeat_interval": 45_000}}),
            json!({"op": 0, "s": 1, "t": "READY", "d": {"session_id": "abc"}}),
            json!({
                "op": 0,
                "s": 2,
                "t": "MESSAGE_CREATE",
                "d": {
                    "id": "10",
                    "channel_id": "20",
                    "guild_id": "30",
                    "author": {"id": "40", "username": "ada"},
                    "content": "hello",
                },
            }),
        ],
        sent: Arc::clone(&sent),
    };
    let server = McpServer::from_config(server_config(true))
        .unwrap()
        .with_writer(writer)
        .with_gateway(Arc::new(connector));

    let handle = server.start_event_source().expect("events enabled");
    handle.await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["op"], 2);
    assert_eq!(sent[0]["d"]["token"], "server-token");

    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    let envelope: Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(envelope["jsonrpc"], "2.0");
    assert_eq!(envelope["method"], EVENT_MESSAGE_CREATED);
    assert_eq!(envelope["params"]["message_id"], "10");
}
