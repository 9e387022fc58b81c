// crates/discord-mcp/src/events.rs
// ============================================================================
// Module: Event Dispatcher
// Description: Maps platform events onto notification envelopes.
// Purpose: Translate gateway dispatches into filtered push notifications.
// Dependencies: discord-mcp-config, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Event sources hand platform events to [`EventDispatcher`], either as typed
//! records or as raw gateway dispatch documents (`{"t": NAME, "d": {...}}`).
//! Each handler shapes the notification params and emits them through the
//! [`NotificationChannel`]. Handlers may be called from any task or thread.

// ============================================================================
// SECTION: Imports
// ============================================================================

use discord_mcp_config::EVENT_GUILD_MEMBER_ADDED;
use discord_mcp_config::EVENT_MESSAGE_CREATED;
use discord_mcp_config::EVENT_MESSAGE_REACTION_ADDED;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::notifications::EmitOutcome;
use crate::notifications::NotificationChannel;

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// Minimal user record carried by events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUser {
    /// User id.
    pub id: String,
    /// Username.
    #[serde(default)]
    pub username: String,
}

/// Emoji record carried by reaction events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEmoji {
    /// Custom emoji id (`null` for unicode emoji).
    #[serde(default)]
    pub id: Option<String>,
    /// Emoji name or unicode character.
    #[serde(default)]
    pub name: Option<String>,
}

/// `MESSAGE_CREATE` dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageCreate {
    /// Message id.
    pub id: String,
    /// Channel id.
    pub channel_id: String,
    /// Guild id (absent in private channels).
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Message author.
    pub author: EventUser,
    /// Message content.
    #[serde(default)]
    pub content: String,
}

/// `GUILD_MEMBER_ADD` dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMemberAdd {
    /// Guild id.
    pub guild_id: String,
    /// Joined user.
    pub user: EventUser,
}

/// `MESSAGE_REACTION_ADD` dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageReactionAdd {
    /// Reacting user id.
    pub user_id: String,
    /// Channel id.
    pub channel_id: String,
    /// Message id.
    pub message_id: String,
    /// Guild id (absent in private channels).
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Reaction emoji.
    pub emoji: EventEmoji,
}

// ============================================================================
// SECTION: Notification Params
// ============================================================================

/// `discord/messageCreated` params.
#[derive(Debug, Serialize)]
struct MessageCreatedParams<'a> {
    /// Guild id (empty in private channels).
    guild_id: &'a str,
    /// Channel id.
    channel_id: &'a str,
    /// Message id.
    message_id: &'a str,
    /// Author id.
    author_id: &'a str,
    /// Message content.
    content: &'a str,
}

/// `discord/guildMemberAdded` params.
#[derive(Debug, Serialize)]
struct GuildMemberAddedParams<'a> {
    /// Guild id.
    guild_id: &'a str,
    /// Joined user.
    user: &'a EventUser,
}

/// `discord/messageReactionAdded` params.
#[derive(Debug, Serialize)]
struct ReactionAddedParams<'a> {
    /// Guild id (empty in private channels).
    guild_id: &'a str,
    /// Channel id.
    channel_id: &'a str,
    /// Message id.
    message_id: &'a str,
    /// Reacting user id.
    user_id: &'a str,
    /// Reaction emoji.
    emoji: &'a EventEmoji,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes platform events to the notification channel.
#[derive(Clone)]
pub struct EventDispatcher {
    /// Filtered output channel.
    channel: NotificationChannel,
}

impl EventDispatcher {
    /// Creates a dispatcher over a notification channel.
    #[must_use]
    pub const fn new(channel: NotificationChannel) -> Self {
        Self {
            channel,
        }
    }

    /// Handles a created message.
    pub fn message_created(&self, event: &MessageCreate) -> EmitOutcome {
        debug!(message_id = %event.id, "handling message create");
        let params = MessageCreatedParams {
            guild_id: event.guild_id.as_deref().unwrap_or_default(),
            channel_id: &event.channel_id,
            message_id: &event.id,
            author_id: &event.author.id,
            content: &event.content,
        };
        self.emit(EVENT_MESSAGE_CREATED, &params)
    }

    /// Handles a member joining a guild.
    pub fn guild_member_added(&self, event: &GuildMemberAdd) -> EmitOutcome {
        debug!(user_id = %event.user.id, "handling guild member add");
        let params = GuildMemberAddedParams {
            guild_id: &event.guild_id,
            user: &event.user,
        };
        self.emit(EVENT_GUILD_MEMBER_ADDED, &params)
    }

    /// Handles a reaction being added to a message.
    pub fn message_reaction_added(&self, event: &MessageReactionAdd) -> EmitOutcome {
        debug!(message_id = %event.message_id, "handling message reaction add");
        let params = ReactionAddedParams {
            guild_id: event.guild_id.as_deref().unwrap_or_default(),
            channel_id: &event.channel_id,
            message_id: &event.message_id,
            user_id: &event.user_id,
            emoji: &event.emoji,
        };
        self.emit(EVENT_MESSAGE_REACTION_ADDED, &params)
    }

    /// Routes a raw gateway dispatch document.
    ///
    /// Returns `None` for unhandled or undecodable dispatches.
    pub fn dispatch_gateway(&self, dispatch: &Value) -> Option<EmitOutcome> {
        let name = dispatch.get("t").and_then(Value::as_str)?;
        let data = dispatch.get("d")?.clone();
        let outcome = match name {
            "MESSAGE_CREATE" => self.message_created(&decode(name, data)?),
            "GUILD_MEMBER_ADD" => self.guild_member_added(&decode(name, data)?),
            "MESSAGE_REACTION_ADD" => self.message_reaction_added(&decode(name, data)?),
            _ => return None,
        };
        Some(outcome)
    }

    /// Skips serialization when the event would be filtered anyway.
    fn emit<T: Serialize>(&self, event: &str, params: &T) -> EmitOutcome {
        if !self.channel.accepts(event) {
            return self.channel.emit(event, Value::Null);
        }
        match serde_json::to_value(params) {
            Ok(params) => self.channel.emit(event, params),
            Err(err) => {
                debug!(event, error = %err, "event params not serializable");
                EmitOutcome::Dropped
            }
        }
    }
}

/// Decodes a gateway dispatch payload.
fn decode<T: for<'de> Deserialize<'de>>(name: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(event = name, error = %err, "gateway dispatch not decodable");
            None
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
