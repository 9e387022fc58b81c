// crates/discord-mcp/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Canonical tool identifiers, descriptions and parameter schemas.
// Purpose: Single source of truth for the advertised tool surface.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`ToolName`] enumerates every tool in canonical order. [`tool_schema`]
//! returns the parameter schema enforced by the validator, which serializes
//! unchanged as the advertised `inputSchema`. These names are part of the
//! external contract surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::schema::Condition;
use crate::schema::Schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pattern for platform snowflake identifiers.
pub const SNOWFLAKE_PATTERN: &str = "^[0-9]+$";
/// Maximum message content length accepted by the schema.
pub const MAX_CONTENT_LENGTH: usize = 2000;
/// Maximum embeds per message.
pub const MAX_EMBEDS: usize = 10;
/// Default message history page size.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Channel type labels accepted by `list_channels`.
pub const CHANNEL_TYPE_LABELS: &[&str] =
    &["text", "voice", "category", "announcement", "stage", "forum", "media"];

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Canonical tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Health check.
    Ping,
    /// Send a message to a channel.
    SendMessage,
    /// Read channel message history.
    GetChannelMessages,
    /// Edit a message.
    EditMessage,
    /// Delete a message.
    DeleteMessage,
    /// React to a message.
    AddReaction,
    /// List guild channels.
    ListChannels,
    /// Describe one channel.
    GetChannelInfo,
    /// Describe one guild.
    GetGuildInfo,
    /// List guild members.
    ListGuildMembers,
    /// List guild roles.
    ListRoles,
    /// Describe one role.
    GetRoleInfo,
    /// Create a role.
    CreateRole,
    /// Delete a role.
    DeleteRole,
    /// Assign a role to a member.
    AssignRole,
    /// Remove a role from a member.
    UnassignRole,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::SendMessage => "send_message",
            Self::GetChannelMessages => "get_channel_messages",
            Self::EditMessage => "edit_message",
            Self::DeleteMessage => "delete_message",
            Self::AddReaction => "add_reaction",
            Self::ListChannels => "list_channels",
            Self::GetChannelInfo => "get_channel_info",
            Self::GetGuildInfo => "get_guild_info",
            Self::ListGuildMembers => "list_guild_members",
            Self::ListRoles => "list_roles",
            Self::GetRoleInfo => "get_role_info",
            Self::CreateRole => "create_role",
            Self::DeleteRole => "delete_role",
            Self::AssignRole => "assign_role",
            Self::UnassignRole => "unassign_role",
        }
    }

    /// Returns all tool names in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Ping,
            Self::SendMessage,
            Self::GetChannelMessages,
            Self::EditMessage,
            Self::DeleteMessage,
            Self::AddReaction,
            Self::ListChannels,
            Self::GetChannelInfo,
            Self::GetGuildInfo,
            Self::ListGuildMembers,
            Self::ListRoles,
            Self::GetRoleInfo,
            Self::CreateRole,
            Self::DeleteRole,
            Self::AssignRole,
            Self::UnassignRole,
        ]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|tool| tool.as_str() == name)
    }

    /// Returns the human-readable tool description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ping => "Ping the Discord connection to verify server health and bot status",
            Self::SendMessage => {
                "Send a message to a Discord channel with support for embeds, replies, and TTS"
            }
            Self::GetChannelMessages => {
                "Retrieve message history from a Discord channel with pagination support"
            }
            Self::EditMessage => "Edit a Discord message's content or embeds",
            Self::DeleteMessage => "Delete a Discord message",
            Self::AddReaction => "Add an emoji reaction to a Discord message",
            Self::ListChannels => "List channels in a Discord server (guild)",
            Self::GetChannelInfo => "Get information about a specific Discord channel",
            Self::GetGuildInfo => "Get information about a specific Discord server (guild)",
            Self::ListGuildMembers => "List all members in a Discord server (guild)",
            Self::ListRoles => "List all roles in a Discord server (guild)",
            Self::GetRoleInfo => "Get information about a specific Discord role",
            Self::CreateRole => "Create a new role in a Discord server (guild)",
            Self::DeleteRole => "Delete a role in a Discord server (guild)",
            Self::AssignRole => "Assign a role to a user in a Discord server (guild)",
            Self::UnassignRole => "Unassign a role from a user in a Discord server (guild)",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Returns the parameter schema for a tool.
#[must_use]
pub fn tool_schema(tool: ToolName) -> Schema {
    match tool {
        ToolName::Ping => Schema::object(),
        ToolName::SendMessage => Schema::object()
            .property("channel_id", snowflake("Discord channel ID (snowflake)").min_length(1))
            .property(
                "content",
                Schema::string()
                    .min_length(1)
                    .max_length(MAX_CONTENT_LENGTH)
                    .describe("Message content (Discord markdown supported)"),
            )
            .property(
                "tts",
                Schema::boolean()
                    .default_value(Value::Bool(false))
                    .describe("Whether message should be read aloud using TTS"),
            )
            .property("reply_to", snowflake("Message ID to reply to"))
            .property("embeds", embeds())
            .require(&["channel_id", "content"]),
        ToolName::GetChannelMessages => Schema::object()
            .property("channel_id", snowflake("Discord channel ID (snowflake)"))
            .property(
                "limit",
                Schema::integer()
                    .minimum(1)
                    .maximum(100)
                    .default_value(Value::from(DEFAULT_HISTORY_LIMIT))
                    .describe("Number of messages to retrieve (1-100)"),
            )
            .property("before", snowflake("Get messages before this message ID"))
            .property("after", snowflake("Get messages after this message ID"))
            .property("around", snowflake("Get messages around this message ID"))
            .require(&["channel_id"])
            .condition(Condition::at_most_one_of(&["before", "after", "around"])),
        ToolName::EditMessage => Schema::object()
            .property("channel_id", snowflake("Discord channel ID (snowflake)"))
            .property("message_id", snowflake("Message ID to edit"))
            .property(
                "content",
                Schema::string().max_length(MAX_CONTENT_LENGTH).describe("New message content"),
            )
            .property("embeds", embeds())
            .require(&["channel_id", "message_id"])
            .condition(Condition::at_least_one_of(&["content", "embeds"])),
        ToolName::DeleteMessage => Schema::object()
            .property("channel_id", snowflake("Discord channel ID (snowflake)"))
            .property("message_id", snowflake("Message ID to delete"))
            .property(
                "reason",
                Schema::string().max_length(512).describe("Reason for deletion (audit log)"),
            )
            .require(&["channel_id", "message_id"]),
        ToolName::AddReaction => Schema::object()
            .property("channel_id", snowflake("Discord channel ID (snowflake)"))
            .property("message_id", snowflake("Message ID to react to"))
            .property(
                "emoji",
                Schema::string()
                    .min_length(1)
                    .describe("Unicode emoji or custom emoji in <:name:id> format"),
            )
            .require(&["channel_id", "message_id", "emoji"]),
        ToolName::ListChannels => Schema::object()
            .property("guild_id", snowflake("Discord guild ID (snowflake)"))
            .property(
                "type_filter",
                Schema::array(Schema::string().one_of_values(CHANNEL_TYPE_LABELS))
                    .unique()
                    .describe("Only include channels of these types"),
            )
            .property(
                "include_permissions",
                Schema::boolean()
                    .default_value(Value::Bool(false))
                    .describe("Include bot permission summary per channel"),
            )
            .require(&["guild_id"]),
        ToolName::GetChannelInfo => Schema::object()
            .property("channel_id", snowflake("Discord channel ID (snowflake)"))
            .property(
                "include_permissions",
                Schema::boolean()
                    .default_value(Value::Bool(true))
                    .describe("Include bot permission summary"),
            )
            .require(&["channel_id"]),
        ToolName::GetGuildInfo => Schema::object()
            .property("guild_id", snowflake("Discord guild ID (snowflake)"))
            .property(
                "include_counts",
                Schema::boolean()
                    .default_value(Value::Bool(false))
                    .describe("Include approximate member counts"),
            )
            .require(&["guild_id"]),
        ToolName::ListGuildMembers | ToolName::ListRoles => Schema::object()
            .property("guild_id", snowflake("Discord guild ID (snowflake)"))
            .require(&["guild_id"]),
        ToolName::GetRoleInfo | ToolName::DeleteRole => Schema::object()
            .property("guild_id", snowflake("Discord guild ID (snowflake)"))
            .property("role_id", snowflake("Discord role ID (snowflake)"))
            .require(&["guild_id", "role_id"]),
        ToolName::CreateRole => Schema::object()
            .property("guild_id", snowflake("Discord guild ID (snowflake)"))
            .property(
                "name",
                Schema::string().min_length(1).max_length(100).describe("Role name"),
            )
            .require(&["guild_id", "name"]),
        ToolName::AssignRole | ToolName::UnassignRole => Schema::object()
            .property("guild_id", snowflake("Discord guild ID (snowflake)"))
            .property("role_id", snowflake("Discord role ID (snowflake)"))
            .property("user_id", snowflake("Discord user ID (snowflake)"))
            .require(&["guild_id", "role_id", "user_id"]),
    }
}

/// Builds a described snowflake id node.
fn snowflake(description: &str) -> Schema {
    Schema::string().pattern(SNOWFLAKE_PATTERN).describe(description)
}

/// Builds the embed list node shared by send and edit.
fn embeds() -> Schema {
    let image = || {
        Schema::object().property("url", Schema::string().describe("Image URL")).require(&["url"])
    };
    let field = Schema::object()
        .property("name", Schema::string().max_length(256))
        .property("value", Schema::string().max_length(1024))
        .property("inline", Schema::boolean())
        .require(&["name", "value"]);
    let embed = Schema::object()
        .property("title", Schema::string().max_length(256))
        .property("description", Schema::string().max_length(4096))
        .property("color", Schema::integer().minimum(0).maximum(16_777_215))
        .property("url", Schema::string())
        .property("thumbnail", image())
        .property("image", image())
        .property("fields", Schema::array(field).max_items(25));
    Schema::array(embed).max_items(MAX_EMBEDS).describe("Array of embed objects")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
