// crates/discord-mcp/src/handlers.rs
// ============================================================================
// Module: Discord Tool Handlers
// Description: Executables bound to the catalog tools.
// Purpose: Map validated arguments onto remote calls and shape tool results.
// Dependencies: async-trait, bigdecimal, serde, serde_json, time, tracing
// ============================================================================

//! ## Overview
//! [`register_discord_tools`] binds every catalog tool to a [`DiscordTool`]
//! handler over a shared [`ChatService`]. Handlers decode arguments into
//! typed requests, declare their permission checks and render remote failures
//! as `isError` results labelled with the failed action.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use bigdecimal::ToPrimitive;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use tracing::warn;

use crate::catalog::DEFAULT_HISTORY_LIMIT;
use crate::catalog::ToolName;
use crate::permissions::Operation;
use crate::permissions::PermissionCheck;
use crate::permissions::PermissionGate;
use crate::protocol::ToolCallResult;
use crate::service::ChatService;
use crate::service::EntityRef;
use crate::service::MessageQuery;
use crate::service::MutationOp;
use crate::service::ServiceError;
use crate::service::string_field;
use crate::tools::RegisteredTool;
use crate::tools::RegistryError;
use crate::tools::ToolError;
use crate::tools::ToolHandler;
use crate::tools::ToolRegistryBuilder;
use crate::tools::decode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Base URL for message links.
const MESSAGE_LINK_BASE: &str = "https://discord.com/channels";
/// Page size used when listing guild members.
const MEMBER_PAGE_SIZE: u32 = 1000;

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Shared state behind every Discord tool handler.
pub struct DiscordTools {
    /// Remote service.
    service: Arc<dyn ChatService>,
    /// Gate used for informational permission summaries.
    gate: PermissionGate,
}

impl DiscordTools {
    /// Creates handler state over a service.
    #[must_use]
    pub fn new(service: Arc<dyn ChatService>) -> Self {
        Self {
            gate: PermissionGate::new(Arc::clone(&service)),
            service,
        }
    }
}

/// Handler bound to one catalog tool.
pub struct DiscordTool {
    /// Bound tool.
    tool: ToolName,
    /// Shared handler state.
    tools: Arc<DiscordTools>,
}

/// Registers every catalog tool against the service.
///
/// # Errors
///
/// Returns [`RegistryError`] when a tool name is already registered.
pub fn register_discord_tools(
    builder: &mut ToolRegistryBuilder,
    service: Arc<dyn ChatService>,
) -> Result<(), RegistryError> {
    let tools = Arc::new(DiscordTools::new(service));
    for tool in ToolName::all() {
        let handler = Arc::new(DiscordTool {
            tool: *tool,
            tools: Arc::clone(&tools),
        });
        builder.register(RegisteredTool::from_catalog(*tool, handler))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// `send_message` arguments.
#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    /// Target channel.
    channel_id: String,
    /// Message content.
    content: String,
    /// Text-to-speech flag.
    #[serde(default)]
    tts: bool,
    /// Message being replied to.
    #[serde(default)]
    reply_to: Option<String>,
    /// Embed documents.
    #[serde(default)]
    embeds: Option<Vec<Value>>,
}

/// `get_channel_messages` arguments.
#[derive(Debug, Deserialize)]
struct ChannelMessagesRequest {
    /// Source channel.
    channel_id: String,
    /// Page size.
    #[serde(default)]
    limit: Option<Number>,
    /// Cursor: before this id.
    #[serde(default)]
    before: Option<String>,
    /// Cursor: after this id.
    #[serde(default)]
    after: Option<String>,
    /// Cursor: around this id.
    #[serde(default)]
    around: Option<String>,
}

/// `edit_message` arguments.
#[derive(Debug, Deserialize)]
struct EditMessageRequest {
    /// Channel holding the message.
    channel_id: String,
    /// Message to edit.
    message_id: String,
    /// Replacement content.
    #[serde(default)]
    content: Option<String>,
    /// Replacement embeds.
    #[serde(default)]
    embeds: Option<Vec<Value>>,
}

/// `delete_message` arguments.
#[derive(Debug, Deserialize)]
struct DeleteMessageRequest {
    /// Channel holding the message.
    channel_id: String,
    /// Message to delete.
    message_id: String,
    /// Audit-log reason.
    #[serde(default)]
    reason: Option<String>,
}

/// `add_reaction` arguments.
#[derive(Debug, Deserialize)]
struct AddReactionRequest {
    /// Channel holding the message.
    channel_id: String,
    /// Message to react to.
    message_id: String,
    /// Unicode or custom emoji.
    emoji: String,
}

/// Channel-addressed arguments.
#[derive(Debug, Deserialize)]
struct ChannelRequest {
    /// Channel id.
    channel_id: String,
    /// Include the permission summary.
    #[serde(default)]
    include_permissions: Option<bool>,
}

/// `list_channels` arguments.
#[derive(Debug, Deserialize)]
struct ListChannelsRequest {
    /// Guild id.
    guild_id: String,
    /// Channel type labels to keep.
    #[serde(default)]
    type_filter: Vec<String>,
    /// Include per-channel permission summaries.
    #[serde(default)]
    include_permissions: bool,
}

/// Guild-addressed arguments.
#[derive(Debug, Deserialize)]
struct GuildRequest {
    /// Guild id.
    guild_id: String,
    /// Include approximate member counts.
    #[serde(default)]
    include_counts: bool,
}

/// Role-addressed arguments.
#[derive(Debug, Deserialize)]
struct RoleRequest {
    /// Guild id.
    guild_id: String,
    /// Role id.
    role_id: String,
}

/// `create_role` arguments.
#[derive(Debug, Deserialize)]
struct CreateRoleRequest {
    /// Guild id.
    guild_id: String,
    /// Role name.
    name: String,
}

/// Role assignment arguments.
#[derive(Debug, Deserialize)]
struct RoleAssignmentRequest {
    /// Guild id.
    guild_id: String,
    /// Role id.
    role_id: String,
    /// Member user id.
    user_id: String,
}

// ============================================================================
// SECTION: Handler
// ============================================================================

#[async_trait]
impl ToolHandler for DiscordTool {
    fn permission_checks(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<PermissionCheck>, ToolError> {
        let arguments = arguments.clone();
        let checks = match self.tool {
            ToolName::Ping => Vec::new(),
            ToolName::SendMessage => {
                let request = decode::<SendMessageRequest>(arguments)?;
                let channel = request.channel_id.as_str();
                let mut checks = vec![
                    PermissionCheck::channel(Operation::ViewChannel, channel),
                    PermissionCheck::channel(Operation::SendMessage, channel),
                ];
                if request.tts {
                    checks.push(PermissionCheck::channel(Operation::SendTtsMessage, channel));
                }
                checks
            }
            ToolName::GetChannelMessages => {
                let request = decode::<ChannelMessagesRequest>(arguments)?;
                vec![
                    PermissionCheck::channel(Operation::ViewChannel, &request.channel_id),
                    PermissionCheck::channel(Operation::ReadMessages, &request.channel_id),
                ]
            }
            ToolName::EditMessage => {
                let request = decode::<EditMessageRequest>(arguments)?;
                owned_message_checks(Operation::EditMessage, request.channel_id, request.message_id)
            }
            ToolName::DeleteMessage => {
                let request = decode::<DeleteMessageRequest>(arguments)?;
                owned_message_checks(
                    Operation::DeleteMessage,
                    request.channel_id,
                    request.message_id,
                )
            }
            ToolName::AddReaction => {
                let request = decode::<AddReactionRequest>(arguments)?;
                let channel = request.channel_id.as_str();
                let mut checks = vec![
                    PermissionCheck::channel(Operation::ViewChannel, channel),
                    PermissionCheck::channel(Operation::AddReaction, channel),
                ];
                if is_custom_emoji(&request.emoji) {
                    checks.push(PermissionCheck::channel(Operation::UseExternalEmoji, channel));
                }
                checks
            }
            ToolName::GetChannelInfo => {
                let request = decode::<ChannelRequest>(arguments)?;
                vec![PermissionCheck::channel(Operation::ViewChannel, &request.channel_id)]
            }
            ToolName::ListChannels | ToolName::GetGuildInfo | ToolName::ListGuildMembers => {
                let guild_id = required_string(&arguments, "guild_id")?;
                vec![PermissionCheck::guild(Operation::ViewGuild, &guild_id)]
            }
            ToolName::ListRoles
            | ToolName::GetRoleInfo
            | ToolName::CreateRole
            | ToolName::DeleteRole
            | ToolName::AssignRole
            | ToolName::UnassignRole => {
                let guild_id = required_string(&arguments, "guild_id")?;
                vec![PermissionCheck::guild(Operation::ManageRoles, &guild_id)]
            }
        };
        Ok(checks)
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolCallResult, ToolError> {
        debug!(tool = self.tool.as_str(), "executing tool");
        let tools = &self.tools;
        match self.tool {
            ToolName::Ping => Ok(tools.ping().await),
            ToolName::SendMessage => Ok(tools.send_message(decode(arguments)?).await),
            ToolName::GetChannelMessages => Ok(tools.channel_messages(decode(arguments)?).await),
            ToolName::EditMessage => Ok(tools.edit_message(decode(arguments)?).await),
            ToolName::DeleteMessage => Ok(tools.delete_message(decode(arguments)?).await),
            ToolName::AddReaction => Ok(tools.add_reaction(decode(arguments)?).await),
            ToolName::ListChannels => Ok(tools.list_channels(decode(arguments)?).await),
            ToolName::GetChannelInfo => Ok(tools.channel_info(decode(arguments)?).await),
            ToolName::GetGuildInfo => Ok(tools.guild_info(decode(arguments)?).await),
            ToolName::ListGuildMembers => Ok(tools.list_members(decode(arguments)?).await),
            ToolName::ListRoles => Ok(tools.list_roles(decode(arguments)?).await),
            ToolName::GetRoleInfo => Ok(tools.role_info(decode(arguments)?).await),
            ToolName::CreateRole => Ok(tools.create_role(decode(arguments)?).await),
            ToolName::DeleteRole => Ok(tools.delete_role(decode(arguments)?).await),
            ToolName::AssignRole => Ok(tools.assign_role(decode(arguments)?, true).await),
            ToolName::UnassignRole => Ok(tools.assign_role(decode(arguments)?, false).await),
        }
    }
}

// ============================================================================
// SECTION: Tool Bodies
// ============================================================================

impl DiscordTools {
    /// Health check.
    async fn ping(&self) -> ToolCallResult {
        let started = Instant::now();
        if !self.service.is_connected() {
            return failure("Discord connection failed", &ServiceError::NotConnected);
        }
        let user = match self.service.current_user().await {
            Ok(user) => user,
            Err(err) => return failure("Failed to get bot user info", &err),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let timestamp = now_rfc3339();
        let id = text_field(&user, "id");
        let username = text_field(&user, "username");
        let discriminator = text_field(&user, "discriminator");
        let text = format!(
            "✅ Discord MCP Server is healthy!\n\n🤖 Bot: {username}#{discriminator} (ID: {id})\n📡 \
             Connected: true\n⏱️ Response time: {elapsed_ms}ms\n🕒 Timestamp: {timestamp}"
        );
        ToolCallResult::success(
            text,
            json!({
                "bot_id": id,
                "bot_username": username,
                "connected": true,
                "response_time_ms": elapsed_ms,
                "timestamp": timestamp,
            }),
        )
    }

    /// Sends a message.
    async fn send_message(&self, request: SendMessageRequest) -> ToolCallResult {
        let mut payload = json!({
            "content": request.content,
            "tts": request.tts,
        });
        if let Some(embeds) = &request.embeds {
            payload["embeds"] = Value::Array(embeds.clone());
        }
        if let Some(reply_to) = &request.reply_to {
            payload["message_reference"] = json!({
                "message_id": reply_to,
                "channel_id": request.channel_id,
            });
        }
        let entity = EntityRef::ChannelMessages {
            channel_id: request.channel_id.clone(),
            query: MessageQuery::default(),
        };
        let message = match self.service.mutate(&entity, MutationOp::Create, payload).await {
            Ok(message) => message,
            Err(err) => return failure("Failed to send message", &err),
        };
        let message_id = text_field(&message, "id");
        ToolCallResult::success(
            format!("✅ Message sent successfully to <#{}>", request.channel_id),
            json!({
                "message_id": message_id,
                "channel_id": request.channel_id,
                "content": field(&message, "content"),
                "timestamp": field(&message, "timestamp"),
                "tts": message.get("tts").and_then(Value::as_bool).unwrap_or(request.tts),
                "embed_count": array_len(&message, "embeds"),
                "has_reply": request.reply_to.is_some(),
                "message_url": message_url(&message, &request.channel_id, &message_id),
            }),
        )
    }

    /// Reads channel history.
    async fn channel_messages(&self, request: ChannelMessagesRequest) -> ToolCallResult {
        let limit = request.limit.as_ref().and_then(whole_u32).unwrap_or(DEFAULT_HISTORY_LIMIT);
        let query = MessageQuery {
            limit,
            before: request.before.clone(),
            after: request.after.clone(),
            around: request.around.clone(),
        };
        let entity = EntityRef::ChannelMessages {
            channel_id: request.channel_id.clone(),
            query,
        };
        let messages = match self.service.fetch(&entity).await {
            Ok(messages) => messages,
            Err(err) => return failure("Failed to get channel messages", &err),
        };
        let messages: Vec<Value> = as_items(&messages).iter().map(format_message).collect();
        ToolCallResult::success(
            format!("📨 Retrieved {} messages from <#{}>", messages.len(), request.channel_id),
            json!({
                "channel_id": request.channel_id,
                "message_count": messages.len(),
                "messages": messages,
                "query": {
                    "limit": limit,
                    "before": request.before.unwrap_or_default(),
                    "after": request.after.unwrap_or_default(),
                    "around": request.around.unwrap_or_default(),
                },
            }),
        )
    }

    /// Edits a message.
    async fn edit_message(&self, request: EditMessageRequest) -> ToolCallResult {
        let mut payload = Map::new();
        if let Some(content) = &request.content {
            payload.insert("content".to_string(), Value::String(content.clone()));
        }
        if let Some(embeds) = &request.embeds {
            payload.insert("embeds".to_string(), Value::Array(embeds.clone()));
        }
        let entity = EntityRef::Message {
            channel_id: request.channel_id.clone(),
            message_id: request.message_id.clone(),
        };
        let message =
            match self.service.mutate(&entity, MutationOp::Update, Value::Object(payload)).await {
                Ok(message) => message,
                Err(err) => return failure("Failed to edit message", &err),
            };
        ToolCallResult::success(
            format!("✏️ Message edited successfully in <#{}>", request.channel_id),
            json!({
                "message_id": request.message_id,
                "channel_id": request.channel_id,
                "new_content": field(&message, "content"),
                "edited_timestamp": field(&message, "edited_timestamp"),
                "embed_count": array_len(&message, "embeds"),
                "message_url": message_url(&message, &request.channel_id, &request.message_id),
            }),
        )
    }

    /// Deletes a message after capturing its content.
    async fn delete_message(&self, request: DeleteMessageRequest) -> ToolCallResult {
        let entity = EntityRef::Message {
            channel_id: request.channel_id.clone(),
            message_id: request.message_id.clone(),
        };
        let message = match self.service.fetch(&entity).await {
            Ok(message) => message,
            Err(err) => return failure("Failed to get message info before deletion", &err),
        };
        let payload = request
            .reason
            .as_ref()
            .map_or(Value::Null, |reason| json!({ "reason": reason }));
        if let Err(err) = self.service.mutate(&entity, MutationOp::Delete, payload).await {
            return failure("Failed to delete message", &err);
        }
        ToolCallResult::success(
            format!("🗑️ Message deleted successfully from <#{}>", request.channel_id),
            json!({
                "deleted_message_id": request.message_id,
                "channel_id": request.channel_id,
                "deleted_content": field(&message, "content"),
                "author_id": string_field(&message, &["author", "id"]),
                "author_username": string_field(&message, &["author", "username"]),
                "deletion_reason": request.reason.unwrap_or_default(),
                "deleted_at": now_rfc3339(),
            }),
        )
    }

    /// Adds the bot's reaction to a message.
    async fn add_reaction(&self, request: AddReactionRequest) -> ToolCallResult {
        let formatted = format_emoji(&request.emoji);
        let entity = EntityRef::Reaction {
            channel_id: request.channel_id.clone(),
            message_id: request.message_id.clone(),
            emoji: formatted.clone(),
        };
        if let Err(err) = self.service.mutate(&entity, MutationOp::Create, Value::Null).await {
            return failure("Failed to add reaction", &err);
        }
        ToolCallResult::success(
            format!("👍 Added reaction {} to message in <#{}>", request.emoji, request.channel_id),
            json!({
                "message_id": request.message_id,
                "channel_id": request.channel_id,
                "emoji": request.emoji,
                "formatted_emoji": formatted,
                "is_custom_emoji": is_custom_emoji(&request.emoji),
                "added_at": now_rfc3339(),
                "message_url": format!(
                    "{MESSAGE_LINK_BASE}/@me/{}/{}",
                    request.channel_id, request.message_id
                ),
            }),
        )
    }

    /// Lists guild channels.
    async fn list_channels(&self, request: ListChannelsRequest) -> ToolCallResult {
        let entity = EntityRef::GuildChannels {
            guild_id: request.guild_id.clone(),
        };
        let channels = match self.service.fetch(&entity).await {
            Ok(channels) => channels,
            Err(err) => return failure("Failed to list channels", &err),
        };
        let actor = if request.include_permissions {
            match self.service.actor_id().await {
                Ok(actor) => Some(actor),
                Err(err) => return failure("Failed to list channels", &err),
            }
        } else {
            None
        };
        let mut formatted = Vec::new();
        for channel in as_items(&channels) {
            let label = channel_type_label(&channel);
            if !request.type_filter.is_empty() && !request.type_filter.iter().any(|t| t == label) {
                continue;
            }
            let mut entry = format_channel(&channel);
            if let Some(actor) = &actor {
                let summary = self.permission_summary(actor, &text_field(&channel, "id")).await;
                entry["permissions"] = summary;
            }
            formatted.push(entry);
        }
        ToolCallResult::success(
            format!("Found {} channels in guild {}", formatted.len(), request.guild_id),
            json!({
                "guild_id": request.guild_id,
                "channel_count": formatted.len(),
                "channels": formatted,
            }),
        )
    }

    /// Describes one channel.
    async fn channel_info(&self, request: ChannelRequest) -> ToolCallResult {
        let entity = EntityRef::Channel {
            channel_id: request.channel_id.clone(),
        };
        let channel = match self.service.fetch(&entity).await {
            Ok(channel) => channel,
            Err(err) => return failure("Failed to get channel info", &err),
        };
        let mut data = format_channel(&channel);
        if request.include_permissions.unwrap_or(true) {
            data["permissions"] = match self.service.actor_id().await {
                Ok(actor) => self.permission_summary(&actor, &request.channel_id).await,
                Err(_) => Value::String("error".to_string()),
            };
        }
        ToolCallResult::success(format!("Channel: {}", text_field(&channel, "name")), data)
    }

    /// Describes one guild.
    async fn guild_info(&self, request: GuildRequest) -> ToolCallResult {
        let entity = EntityRef::Guild {
            guild_id: request.guild_id.clone(),
            with_counts: request.include_counts,
        };
        let guild = match self.service.fetch(&entity).await {
            Ok(guild) => guild,
            Err(err) => return failure("Failed to get guild info", &err),
        };
        let mut data =
            pick(&guild, &["id", "name", "description", "icon", "splash", "banner", "owner_id"]);
        if request.include_counts {
            data["member_count"] = field(&guild, "approximate_member_count");
        }
        ToolCallResult::success(format!("Guild: {}", text_field(&guild, "name")), data)
    }

    /// Lists guild members.
    async fn list_members(&self, request: GuildRequest) -> ToolCallResult {
        let entity = EntityRef::GuildMembers {
            guild_id: request.guild_id.clone(),
            limit: MEMBER_PAGE_SIZE,
        };
        let members = match self.service.fetch(&entity).await {
            Ok(members) => members,
            Err(err) => return failure("Failed to list guild members", &err),
        };
        let members: Vec<Value> = as_items(&members).iter().map(format_member).collect();
        ToolCallResult::success(
            format!("Found {} members in guild {}", members.len(), request.guild_id),
            json!({
                "guild_id": request.guild_id,
                "member_count": members.len(),
                "members": members,
            }),
        )
    }

    /// Lists guild roles.
    async fn list_roles(&self, request: GuildRequest) -> ToolCallResult {
        let entity = EntityRef::GuildRoles {
            guild_id: request.guild_id.clone(),
        };
        let roles = match self.service.fetch(&entity).await {
            Ok(roles) => roles,
            Err(err) => return failure("Failed to list roles", &err),
        };
        let roles: Vec<Value> = as_items(&roles).iter().map(format_role).collect();
        ToolCallResult::success(
            format!("Found {} roles in guild {}", roles.len(), request.guild_id),
            json!({
                "guild_id": request.guild_id,
                "role_count": roles.len(),
                "roles": roles,
            }),
        )
    }

    /// Describes one role.
    async fn role_info(&self, request: RoleRequest) -> ToolCallResult {
        let entity = EntityRef::Role {
            guild_id: request.guild_id,
            role_id: request.role_id,
        };
        match self.service.fetch(&entity).await {
            Ok(role) => ToolCallResult::success(
                format!("Role: {}", text_field(&role, "name")),
                format_role(&role),
            ),
            Err(err) => failure("Failed to get role info", &err),
        }
    }

    /// Creates a role.
    async fn create_role(&self, request: CreateRoleRequest) -> ToolCallResult {
        let entity = EntityRef::GuildRoles {
            guild_id: request.guild_id,
        };
        let payload = json!({ "name": request.name });
        match self.service.mutate(&entity, MutationOp::Create, payload).await {
            Ok(role) => ToolCallResult::success(
                format!("Created role: {}", text_field(&role, "name")),
                format_role(&role),
            ),
            Err(err) => failure("Failed to create role", &err),
        }
    }

    /// Deletes a role.
    async fn delete_role(&self, request: RoleRequest) -> ToolCallResult {
        let entity = EntityRef::Role {
            guild_id: request.guild_id.clone(),
            role_id: request.role_id.clone(),
        };
        match self.service.mutate(&entity, MutationOp::Delete, Value::Null).await {
            Ok(_) => ToolCallResult::success(
                format!("Deleted role with ID: {}", request.role_id),
                json!({ "guild_id": request.guild_id, "role_id": request.role_id }),
            ),
            Err(err) => failure("Failed to delete role", &err),
        }
    }

    /// Adds or removes a member role.
    async fn assign_role(&self, request: RoleAssignmentRequest, assign: bool) -> ToolCallResult {
        let entity = EntityRef::MemberRole {
            guild_id: request.guild_id.clone(),
            user_id: request.user_id.clone(),
            role_id: request.role_id.clone(),
        };
        let (op, action, text) = if assign {
            (
                MutationOp::Create,
                "Failed to assign role",
                format!("Assigned role {} to user {}", request.role_id, request.user_id),
            )
        } else {
            (
                MutationOp::Delete,
                "Failed to unassign role",
                format!("Unassigned role {} from user {}", request.role_id, request.user_id),
            )
        };
        match self.service.mutate(&entity, op, Value::Null).await {
            Ok(_) => ToolCallResult::success(
                text,
                json!({
                    "guild_id": request.guild_id,
                    "role_id": request.role_id,
                    "user_id": request.user_id,
                }),
            ),
            Err(err) => failure(action, &err),
        }
    }

    /// Returns the capability summary for a channel, or `"error"`.
    async fn permission_summary(&self, actor: &str, channel_id: &str) -> Value {
        match self.gate.channel_summary(actor, channel_id).await {
            Ok(summary) => json!(summary),
            Err(err) => {
                warn!(channel_id, error = %err, "permission summary unavailable");
                Value::String("error".to_string())
            }
        }
    }
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Renders a remote failure as an `isError` result.
fn failure(action: &str, err: &ServiceError) -> ToolCallResult {
    warn!(action, error = %err, "tool call failed");
    err.to_tool_result(action)
}

/// Builds ownership-aware message checks.
fn owned_message_checks(
    operation: Operation,
    channel_id: String,
    message_id: String,
) -> Vec<PermissionCheck> {
    let view = PermissionCheck::channel(Operation::ViewChannel, &channel_id);
    let gated = PermissionCheck::channel(operation, &channel_id).on_target(EntityRef::Message {
        channel_id,
        message_id,
    });
    vec![view, gated]
}

/// Reads a required string argument.
fn required_string(arguments: &Map<String, Value>, name: &str) -> Result<String, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidParams(format!("{name} must be a string")))
}

/// Converts a whole JSON number to `u32`.
fn whole_u32(number: &Number) -> Option<u32> {
    BigDecimal::from_str(&number.to_string()).ok()?.to_u32()
}

/// Returns true for `<:name:id>` and `<a:name:id>` emoji.
fn is_custom_emoji(emoji: &str) -> bool {
    (emoji.starts_with("<:") || emoji.starts_with("<a:")) && emoji.ends_with('>')
}

/// Converts custom emoji to the `name:id` form used by the API.
fn format_emoji(emoji: &str) -> String {
    if !is_custom_emoji(emoji) {
        return emoji.to_string();
    }
    let inner = emoji.trim_end_matches('>');
    inner.strip_prefix("<a:").or_else(|| inner.strip_prefix("<:")).unwrap_or(inner).to_string()
}

/// Returns the current time in RFC 3339 form.
fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Returns a field value or `null`.
fn field(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

/// Returns a string field or the empty string.
fn text_field(value: &Value, key: &str) -> String {
    string_field(value, &[key]).unwrap_or_default()
}

/// Returns the length of an array field.
fn array_len(value: &Value, key: &str) -> usize {
    value.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

/// Returns the items of an array document.
fn as_items(value: &Value) -> Vec<Value> {
    value.as_array().cloned().unwrap_or_default()
}

/// Copies the named fields into a new object (`null` when absent).
fn pick(value: &Value, keys: &[&str]) -> Value {
    let map: Map<String, Value> =
        keys.iter().map(|key| ((*key).to_string(), field(value, key))).collect();
    Value::Object(map)
}

/// Builds a message link.
fn message_url(message: &Value, channel_id: &str, message_id: &str) -> String {
    let guild = string_field(message, &["guild_id"]).unwrap_or_else(|| "@me".to_string());
    format!("{MESSAGE_LINK_BASE}/{guild}/{channel_id}/{message_id}")
}

/// Formats a user record.
fn format_user(user: &Value) -> Value {
    let mut out = pick(user, &["id", "username", "discriminator", "avatar", "bot"]);
    if out["bot"].is_null() {
        out["bot"] = Value::Bool(false);
    }
    out
}

/// Formats a message record.
fn format_message(message: &Value) -> Value {
    let id = text_field(message, "id");
    let channel_id = text_field(message, "channel_id");
    let mentions: Vec<Value> = message
        .get("mentions")
        .and_then(Value::as_array)
        .map(|users| users.iter().map(format_user).collect())
        .unwrap_or_default();
    let reactions: Vec<Value> = message
        .get("reactions")
        .and_then(Value::as_array)
        .map(|reactions| {
            reactions
                .iter()
                .map(|reaction| {
                    json!({
                        "emoji": pick(&field(reaction, "emoji"), &["name", "id"]),
                        "count": field(reaction, "count"),
                        "me": reaction.get("me").and_then(Value::as_bool).unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let attachments: Vec<Value> = message
        .get("attachments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| pick(item, &["id", "filename", "size", "url", "width", "height"]))
                .collect()
        })
        .unwrap_or_default();
    json!({
        "id": id,
        "content": field(message, "content"),
        "author": format_user(&field(message, "author")),
        "timestamp": field(message, "timestamp"),
        "edited": message.get("edited_timestamp").is_some_and(|value| !value.is_null()),
        "tts": message.get("tts").and_then(Value::as_bool).unwrap_or(false),
        "mention_everyone": message.get("mention_everyone").and_then(Value::as_bool).unwrap_or(false),
        "mentions": mentions,
        "attachments": attachments,
        "embeds": message.get("embeds").cloned().unwrap_or_else(|| json!([])),
        "reactions": reactions,
        "pinned": message.get("pinned").and_then(Value::as_bool).unwrap_or(false),
        "type": message.get("type").and_then(Value::as_u64).unwrap_or(0),
        "flags": message.get("flags").and_then(Value::as_u64).unwrap_or(0),
        "message_url": message_url(message, &channel_id, &id),
    })
}

/// Returns the label for a channel's type.
fn channel_type_label(channel: &Value) -> &'static str {
    match channel.get("type").and_then(Value::as_u64) {
        Some(0) => "text",
        Some(2) => "voice",
        Some(4) => "category",
        Some(5) => "announcement",
        Some(13) => "stage",
        Some(15) => "forum",
        Some(16) => "media",
        _ => "unknown",
    }
}

/// Formats a channel record.
fn format_channel(channel: &Value) -> Value {
    let mut out = pick(channel, &["id", "name"]);
    out["type"] = Value::String(channel_type_label(channel).to_string());
    out["position"] = field(channel, "position");
    out["nsfw"] = Value::Bool(channel.get("nsfw").and_then(Value::as_bool).unwrap_or(false));
    out["parent_id"] = field(channel, "parent_id");
    out["guild_id"] = field(channel, "guild_id");
    out["topic"] = field(channel, "topic");
    out
}

/// Formats a guild member record.
fn format_member(member: &Value) -> Value {
    let user = field(member, "user");
    json!({
        "id": field(&user, "id"),
        "username": field(&user, "username"),
        "discriminator": field(&user, "discriminator"),
        "nick": field(member, "nick"),
        "roles": member.get("roles").cloned().unwrap_or_else(|| json!([])),
        "joined_at": field(member, "joined_at"),
        "deaf": member.get("deaf").and_then(Value::as_bool).unwrap_or(false),
        "mute": member.get("mute").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Formats a role record.
fn format_role(role: &Value) -> Value {
    pick(role, &["id", "name", "color", "hoist", "position", "permissions", "managed", "mentionable"])
}

// ============================================================================
// SECTION: Tests
// ============================================================================
