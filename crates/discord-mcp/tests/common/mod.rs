// crates/discord-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: In-memory chat service and session helpers for MCP tests.
// Purpose: Drive the full tool pipeline without a network.
// Dependencies: discord-mcp, async-trait, serde_json
// ============================================================================

//! ## Overview
//! [`FakeChatService`] keeps channels, guild grants and messages in memory and
//! records every mutation so tests can assert which remote calls ran.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use discord_mcp::ChatService;
use discord_mcp::ServiceError;
use discord_mcp::Session;
use discord_mcp::SharedWriter;
use discord_mcp::protocol::JsonRpcResponse;
use discord_mcp::protocol::ServerInfo;
use discord_mcp::server::build_router;
use discord_mcp::service::EntityRef;
use discord_mcp::service::MutationOp;
use discord_mcp::service::Scope;
use discord_mcp::service::ScopeGrants;
use serde_json::Value;
use serde_json::json;

/// Test result alias used across suites.
pub type TestResult = Result<(), String>;

/// Bot user id reported by the fake service.
pub const BOT_ID: &str = "900";

// ============================================================================
// SECTION: Fake Service
// ============================================================================

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMutation {
    /// Entity kind label.
    pub kind: &'static str,
    /// Mutation label.
    pub op: &'static str,
    /// Request payload.
    pub payload: Value,
}

/// Channel access configured on the fake.
#[derive(Debug, Clone)]
pub enum ChannelAccess {
    /// Guild channel with the given aggregate mask.
    Guild(u64),
    /// Direct-message channel.
    Private,
}

/// In-memory chat service.
pub struct FakeChatService {
    /// Connection flag.
    connected: AtomicBool,
    /// Channel access by channel id.
    channels: Mutex<BTreeMap<String, ChannelAccess>>,
    /// Role masks by guild id.
    guilds: Mutex<BTreeMap<String, Vec<u64>>>,
    /// Message authors by `(channel, message)`.
    messages: Mutex<BTreeMap<(String, String), String>>,
    /// Mutations in call order.
    mutations: Mutex<Vec<RecordedMutation>>,
}

impl Default for FakeChatService {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            channels: Mutex::new(BTreeMap::new()),
            guilds: Mutex::new(BTreeMap::new()),
            messages: Mutex::new(BTreeMap::new()),
            mutations: Mutex::new(Vec::new()),
        }
    }
}

impl FakeChatService {
    /// Creates an empty, connected fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `mask` in a guild channel.
    pub fn with_channel(self, channel_id: &str, mask: u64) -> Self {
        self.channels.lock().unwrap().insert(channel_id.to_string(), ChannelAccess::Guild(mask));
        self
    }

    /// Registers a direct-message channel.
    pub fn with_private_channel(self, channel_id: &str) -> Self {
        self.channels.lock().unwrap().insert(channel_id.to_string(), ChannelAccess::Private);
        self
    }

    /// Grants role masks in a guild.
    pub fn with_guild(self, guild_id: &str, masks: &[u64]) -> Self {
        self.guilds.lock().unwrap().insert(guild_id.to_string(), masks.to_vec());
        self
    }

    /// Stores a message written by `author_id`.
    pub fn with_message(self, channel_id: &str, message_id: &str, author_id: &str) -> Self {
        self.messages
            .lock()
            .unwrap()
            .insert((channel_id.to_string(), message_id.to_string()), author_id.to_string());
        self
    }

    /// Sets the connection flag.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns recorded mutations.
    pub fn mutations(&self) -> Vec<RecordedMutation> {
        self.mutations.lock().unwrap().clone()
    }

    fn message(&self, channel_id: &str, message_id: &str) -> Result<Value, ServiceError> {
        let messages = self.messages.lock().unwrap();
        let author = messages
            .get(&(channel_id.to_string(), message_id.to_string()))
            .ok_or_else(|| ServiceError::RemoteNotFound(format!("message {message_id}")))?;
        Ok(json!({
            "id": message_id,
            "channel_id": channel_id,
            "content": format!("message {message_id}"),
            "timestamp": "2026-01-01T00:00:00+00:00",
            "author": {"id": author, "username": format!("user{author}"), "discriminator": "0"},
        }))
    }
}

#[async_trait]
impl ChatService for FakeChatService {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn fetch(&self, entity: &EntityRef) -> Result<Value, ServiceError> {
        if !self.is_connected() {
            return Err(ServiceError::NotConnected);
        }
        match entity {
            EntityRef::CurrentUser => {
                Ok(json!({"id": BOT_ID, "username": "relay", "discriminator": "0001", "bot": true}))
            }
            EntityRef::Message {
                channel_id,
                message_id,
            } => self.message(channel_id, message_id),
            EntityRef::ChannelMessages {
                channel_id,
                query,
            } => {
                let messages = self.messages.lock().unwrap();
                let mut items: Vec<Value> = messages
                    .keys()
                    .filter(|(channel, _)| channel == channel_id)
                    .map(|(_, message)| json!({"id": message, "content": "stored"}))
                    .collect();
                items.truncate(usize::try_from(query.limit).unwrap());
                Ok(Value::Array(items))
            }
            EntityRef::Channel {
                channel_id,
            } => match self.channels.lock().unwrap().get(channel_id) {
                Some(ChannelAccess::Guild(_)) => {
                    Ok(json!({"id": channel_id, "name": "general", "type": 0, "guild_id": "1"}))
                }
                Some(ChannelAccess::Private) => Ok(json!({"id": channel_id, "type": 1})),
                None => Err(ServiceError::RemoteNotFound(format!("channel {channel_id}"))),
            },
            other => Err(ServiceError::RemoteNotFound(other.kind().to_string())),
        }
    }

    async fn mutate(
        &self,
        entity: &EntityRef,
        op: MutationOp,
        payload: Value,
    ) -> Result<Value, ServiceError> {
        if !self.is_connected() {
            return Err(ServiceError::NotConnected);
        }
        self.mutations.lock().unwrap().push(RecordedMutation {
            kind: entity.kind(),
            op: op.as_str(),
            payload: payload.clone(),
        });
        match (entity, op) {
            (
                EntityRef::ChannelMessages {
                    channel_id, ..
                },
                MutationOp::Create,
            ) => Ok(json!({
                "id": "5000",
                "channel_id": channel_id,
                "guild_id": "1",
                "content": payload["content"],
                "timestamp": "2026-01-01T00:00:00+00:00",
                "tts": payload["tts"],
                "embeds": payload.get("embeds").cloned().unwrap_or_else(|| json!([])),
            })),
            (
                EntityRef::Message {
                    channel_id,
                    message_id,
                },
                MutationOp::Update,
            ) => Ok(json!({
                "id": message_id,
                "channel_id": channel_id,
                "content": payload["content"],
                "edited_timestamp": "2026-01-02T00:00:00+00:00",
                "embeds": [],
            })),
            _ => Ok(Value::Null),
        }
    }

    async fn capability_grants(
        &self,
        _actor_id: &str,
        scope: &Scope,
    ) -> Result<ScopeGrants, ServiceError> {
        match scope {
            Scope::Channel(channel_id) => match self.channels.lock().unwrap().get(channel_id) {
                Some(ChannelAccess::Guild(mask)) => Ok(ScopeGrants::Granted(vec![*mask])),
                Some(ChannelAccess::Private) => Ok(ScopeGrants::Private),
                None => Err(ServiceError::RemoteNotFound(format!("channel {channel_id}"))),
            },
            Scope::Guild(guild_id) => match self.guilds.lock().unwrap().get(guild_id) {
                Some(masks) => Ok(ScopeGrants::Granted(masks.clone())),
                None => Err(ServiceError::RemoteForbidden(format!("guild {guild_id}"))),
            },
        }
    }
}

// ============================================================================
// SECTION: Session Helpers
// ============================================================================

/// Builds a session over `service` writing to `writer`.
pub fn session(service: Arc<FakeChatService>, writer: SharedWriter) -> Session {
    let router = build_router(service as Arc<dyn ChatService>).unwrap();
    Session::new(
        router,
        writer,
        ServerInfo {
            name: "discord-mcp".to_string(),
            version: "1.0.0".to_string(),
        },
    )
}

/// Builds a session that has completed the handshake.
pub async fn ready_session(service: Arc<FakeChatService>) -> Session {
    let mut session = session(service, SharedWriter::in_memory().0);
    let _ = session.handle_line(r#"{"jsonrpc":"2.0","id":0,"method":"initialize"}"#).await;
    let _ = session.handle_line(r#"{"jsonrpc":"2.0","method":"initialized"}"#).await;
    session
}

/// Issues a `tools/call` and returns the response.
pub async fn call_tool(session: &mut Session, name: &str, arguments: Value) -> JsonRpcResponse {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments},
    });
    session.handle_line(&request.to_string()).await.unwrap()
}

/// Returns the tool result payload of a successful response.
pub fn tool_result(response: &JsonRpcResponse) -> Value {
    assert!(response.error.is_none(), "unexpected protocol error");
    response.result.clone().unwrap()
}

/// Returns the structured data of a tool result.
pub fn result_data(result: &Value) -> &Value {
    &result["content"][0]["data"]
}

/// Returns true when the tool result is flagged as an error.
pub fn is_error(result: &Value) -> bool {
    result.get("isError").and_then(Value::as_bool).unwrap_or(false)
}
