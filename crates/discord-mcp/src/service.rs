// crates/discord-mcp/src/service.rs
// ============================================================================
// Module: Chat Service Interface
// Description: Remote chat-platform contract consumed by the tool pipeline.
// Purpose: Decouple validation, gating and formatting from the REST client.
// Dependencies: async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`ChatService`] is the seam between the tool pipeline and the remote
//! platform. Entities are addressed by [`EntityRef`] and returned as raw JSON
//! documents in the platform's own shape. The production implementation is
//! [`crate::discord::DiscordClient`]; tests substitute an in-memory fake.
//!
//! The pipeline never surfaces [`ServiceError`] as a transport error; it maps
//! every failure into an `isError` tool result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::protocol::CONTENT_TOO_LONG;
use crate::protocol::ToolCallResult;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Message history query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    /// Page size.
    pub limit: u32,
    /// Return messages before this id.
    pub before: Option<String>,
    /// Return messages after this id.
    pub after: Option<String>,
    /// Return messages around this id.
    pub around: Option<String>,
}

/// Address of a remote entity or collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// The authenticated bot user.
    CurrentUser,
    /// A guild.
    Guild {
        /// Guild id.
        guild_id: String,
        /// Request approximate member counts.
        with_counts: bool,
    },
    /// Channels of a guild.
    GuildChannels {
        /// Guild id.
        guild_id: String,
    },
    /// Members of a guild.
    GuildMembers {
        /// Guild id.
        guild_id: String,
        /// Page size.
        limit: u32,
    },
    /// One member of a guild.
    Member {
        /// Guild id.
        guild_id: String,
        /// User id.
        user_id: String,
    },
    /// Roles of a guild.
    GuildRoles {
        /// Guild id.
        guild_id: String,
    },
    /// One role.
    Role {
        /// Guild id.
        guild_id: String,
        /// Role id.
        role_id: String,
    },
    /// A role assignment on a member.
    MemberRole {
        /// Guild id.
        guild_id: String,
        /// User id.
        user_id: String,
        /// Role id.
        role_id: String,
    },
    /// A channel.
    Channel {
        /// Channel id.
        channel_id: String,
    },
    /// Messages of a channel.
    ChannelMessages {
        /// Channel id.
        channel_id: String,
        /// History query (ignored on create).
        query: MessageQuery,
    },
    /// One message.
    Message {
        /// Channel id.
        channel_id: String,
        /// Message id.
        message_id: String,
    },
    /// The bot's reaction on a message.
    Reaction {
        /// Channel id.
        channel_id: String,
        /// Message id.
        message_id: String,
        /// Emoji in `name` or `name:id` form.
        emoji: String,
    },
}

impl EntityRef {
    /// Returns a stable label for the reference kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CurrentUser => "current_user",
            Self::Guild {
                ..
            } => "guild",
            Self::GuildChannels {
                ..
            } => "guild_channels",
            Self::GuildMembers {
                ..
            } => "guild_members",
            Self::Member {
                ..
            } => "member",
            Self::GuildRoles {
                ..
            } => "guild_roles",
            Self::Role {
                ..
            } => "role",
            Self::MemberRole {
                ..
            } => "member_role",
            Self::Channel {
                ..
            } => "channel",
            Self::ChannelMessages {
                ..
            } => "channel_messages",
            Self::Message {
                ..
            } => "message",
            Self::Reaction {
                ..
            } => "reaction",
        }
    }

    /// Returns the owning guild id when the reference is guild-scoped.
    #[must_use]
    pub fn guild_id(&self) -> Option<&str> {
        match self {
            Self::Guild {
                guild_id, ..
            }
            | Self::GuildChannels {
                guild_id,
            }
            | Self::GuildMembers {
                guild_id, ..
            }
            | Self::Member {
                guild_id, ..
            }
            | Self::GuildRoles {
                guild_id,
            }
            | Self::Role {
                guild_id, ..
            }
            | Self::MemberRole {
                guild_id, ..
            } => Some(guild_id),
            Self::CurrentUser
            | Self::Channel {
                ..
            }
            | Self::ChannelMessages {
                ..
            }
            | Self::Message {
                ..
            }
            | Self::Reaction {
                ..
            } => None,
        }
    }
}

/// Mutation applied through [`ChatService::mutate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    /// Create an entity in a collection (or add an assignment).
    Create,
    /// Update an existing entity.
    Update,
    /// Delete an entity (or remove an assignment).
    Delete,
}

impl MutationOp {
    /// Returns a stable label for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Boundary over which capabilities are evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A channel (guild channel or private conversation).
    Channel(String),
    /// A guild.
    Guild(String),
}

impl Scope {
    /// Returns the resource label used in denials (`channel:ID`).
    #[must_use]
    pub fn resource(&self) -> String {
        match self {
            Self::Channel(id) => format!("channel:{id}"),
            Self::Guild(id) => format!("guild:{id}"),
        }
    }
}

/// Capability grants held by an actor in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeGrants {
    /// Scope has no role concept (private one-to-one conversation).
    Private,
    /// Bitmasks of every grant the actor holds in the scope.
    Granted(Vec<u64>),
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Remote chat-platform operations used by the tool pipeline.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Returns true when the client has an authenticated session.
    fn is_connected(&self) -> bool;

    /// Fetches an entity or collection.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the remote call fails.
    async fn fetch(&self, entity: &EntityRef) -> Result<Value, ServiceError>;

    /// Applies a mutation and returns the updated entity (`null` when the
    /// remote returns no body).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the remote call fails.
    async fn mutate(
        &self,
        entity: &EntityRef,
        op: MutationOp,
        payload: Value,
    ) -> Result<Value, ServiceError>;

    /// Returns the grants the actor holds in the scope.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the scope cannot be resolved.
    async fn capability_grants(
        &self,
        actor_id: &str,
        scope: &Scope,
    ) -> Result<ScopeGrants, ServiceError>;

    /// Returns the authenticated bot user document.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the current user cannot be fetched.
    async fn current_user(&self) -> Result<Value, ServiceError> {
        self.fetch(&EntityRef::CurrentUser).await
    }

    /// Returns the id of the bot user.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the current user cannot be fetched.
    async fn actor_id(&self) -> Result<String, ServiceError> {
        let user = self.current_user().await?;
        string_field(&user, &["id"])
            .ok_or_else(|| ServiceError::Decode("current user has no id".to_string()))
    }

    /// Returns the owner identity of a resource, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the resource cannot be fetched.
    async fn resource_owner(&self, entity: &EntityRef) -> Result<Option<String>, ServiceError> {
        let resource = self.fetch(entity).await?;
        Ok(string_field(&resource, &["author", "id"])
            .or_else(|| string_field(&resource, &["owner_id"])))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Remote service errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No authenticated session.
    #[error("not connected to Discord")]
    NotConnected,
    /// Client-side call budget exhausted.
    #[error("rate limit exceeded")]
    RateLimited,
    /// Guild is outside the configured allow-list.
    #[error("access to guild {0} is not allowed")]
    GuildNotAllowed(String),
    /// Outbound content exceeds the configured maximum.
    #[error("message exceeds maximum length of {max} characters")]
    ContentTooLong {
        /// Configured maximum length.
        max: usize,
    },
    /// Remote entity does not exist.
    #[error("not found: {0}")]
    RemoteNotFound(String),
    /// Remote refused the call.
    #[error("forbidden: {0}")]
    RemoteForbidden(String),
    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Remote response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Entity/mutation combination not supported.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ServiceError {
    /// Returns the protocol error code carried in result data, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::ContentTooLong {
                ..
            } => Some(CONTENT_TOO_LONG),
            _ => None,
        }
    }

    /// Renders the failure as an `isError` tool result.
    #[must_use]
    pub fn to_tool_result(&self, message: &str) -> ToolCallResult {
        let details = self.to_string();
        let mut data = json!({
            "error_type": "discord_api",
            "message": message,
            "details": details,
        });
        if let (Some(code), Value::Object(map)) = (self.code(), &mut data) {
            map.insert("code".to_string(), Value::from(code));
        }
        ToolCallResult::error(format!("❌ {message}: {details}"), data)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a nested string field.
#[must_use]
pub fn string_field(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::to_string)
}
