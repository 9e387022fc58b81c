// crates/discord-mcp/src/discord.rs
// ============================================================================
// Module: Discord REST Client
// Description: ChatService implementation over the Discord HTTP API.
// Purpose: Authenticate, rate-limit and scope remote calls for the tools.
// Dependencies: reqwest, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`DiscordClient`] implements [`ChatService`] with `Bot` token
//! authentication. It enforces a client-side sliding-window call budget, the
//! guild allow-list and the maximum outbound message length before any request
//! leaves the process. Channel capabilities are computed from the guild's
//! roles, the bot's member roles and the channel's permission overwrites.
//!
//! Retries and backoff are not performed; a 429 surfaces as
//! [`ServiceError::RateLimited`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use discord_mcp_config::DiscordConfig;
use reqwest::Client;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderValue;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::permissions::capability;
use crate::service::ChatService;
use crate::service::EntityRef;
use crate::service::MessageQuery;
use crate::service::MutationOp;
use crate::service::Scope;
use crate::service::ScopeGrants;
use crate::service::ServiceError;
use crate::service::string_field;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sliding window used by the client-side rate limiter.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// Header carrying the audit-log reason for destructive calls.
const AUDIT_LOG_REASON_HEADER: &str = "X-Audit-Log-Reason";
/// Connect timeout applied to every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Permission overwrite type for members.
const OVERWRITE_MEMBER: u64 = 1;

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

/// Sliding-window call budget.
///
/// # Invariants
/// - At most `max_calls` acquisitions succeed within any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum calls per window.
    max_calls: usize,
    /// Window length.
    window: Duration,
    /// Timestamps of calls inside the current window.
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_calls` per `window`.
    #[must_use]
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Attempts to take one call from the budget.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Attempts to take one call from the budget at `now`.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(oldest) = calls.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
        if calls.len() >= self.max_calls {
            return false;
        }
        calls.push_back(now);
        true
    }
}

/// Whether a request draws on the client-side call budget.
///
/// Capability lookups are exempt so that permission resolution never
/// consumes the allowance of the tool call it guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    /// Counted against [`RateLimiter`].
    Metered,
    /// Not counted.
    Exempt,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Discord REST client.
pub struct DiscordClient {
    /// HTTP client configured with timeouts.
    http: Client,
    /// API base URL (no trailing slash).
    base_url: String,
    /// Bot token.
    token: String,
    /// Client-side call budget.
    limiter: RateLimiter,
    /// Guild allow-list; empty allows all.
    allowed_guilds: Vec<String>,
    /// Maximum outbound message length in characters.
    max_message_length: usize,
    /// Set once the token has been verified.
    connected: AtomicBool,
    /// Bot user document captured at connect time.
    bot_user: Mutex<Option<Value>>,
}

impl DiscordClient {
    /// Builds a client from configuration. No request is made.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] when the HTTP client cannot be built.
    pub fn from_config(config: &DiscordConfig) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| ServiceError::Transport(err.to_string()))?;
        let base_url = config.api_base_url.trim().trim_end_matches('/').to_string();
        let max_calls = usize::try_from(config.rate_limit_per_minute).unwrap_or(usize::MAX);
        Ok(Self {
            http,
            base_url,
            token: config.token.trim().to_string(),
            limiter: RateLimiter::new(max_calls, RATE_LIMIT_WINDOW),
            allowed_guilds: config.allowed_guilds.clone(),
            max_message_length: config.max_message_length,
            connected: AtomicBool::new(false),
            bot_user: Mutex::new(None),
        })
    }

    /// Verifies the token against the current-user endpoint and marks the
    /// client connected.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the token is rejected or unreachable.
    pub async fn connect(&self) -> Result<Value, ServiceError> {
        let url = format!("{}/users/@me", self.base_url);
        let user = self.send(Method::GET, url, None, None).await?;
        info!(
            user_id = string_field(&user, &["id"]).unwrap_or_default(),
            username = string_field(&user, &["username"]).unwrap_or_default(),
            "connected to discord"
        );
        *self.bot_user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        self.connected.store(true, Ordering::SeqCst);
        Ok(user)
    }

    /// Marks the client disconnected.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        info!("disconnected from discord");
    }

    /// Returns true when the guild passes the allow-list.
    fn guild_allowed(&self, guild_id: &str) -> bool {
        self.allowed_guilds.is_empty() || self.allowed_guilds.iter().any(|id| id == guild_id)
    }

    /// Fails when a guild is outside the allow-list.
    fn ensure_guild_allowed(&self, guild_id: &str) -> Result<(), ServiceError> {
        if self.guild_allowed(guild_id) {
            Ok(())
        } else {
            warn!(guild_id, "guild outside allow-list");
            Err(ServiceError::GuildNotAllowed(guild_id.to_string()))
        }
    }

    /// Fails when outbound content exceeds the configured maximum.
    fn ensure_content_length(&self, payload: &Value) -> Result<(), ServiceError> {
        let length = payload.get("content").and_then(Value::as_str).map_or(0, |c| c.chars().count());
        if length > self.max_message_length {
            return Err(ServiceError::ContentTooLong {
                max: self.max_message_length,
            });
        }
        Ok(())
    }

    /// Fails when the client is not connected.
    fn ensure_connected(&self) -> Result<(), ServiceError> {
        if self.connected.load(Ordering::SeqCst) { Ok(()) } else { Err(ServiceError::NotConnected) }
    }

    /// Builds the URL of a fetchable entity.
    fn fetch_url(&self, entity: &EntityRef) -> Result<String, ServiceError> {
        let base = &self.base_url;
        let url = match entity {
            EntityRef::CurrentUser => format!("{base}/users/@me"),
            EntityRef::Guild {
                guild_id,
                with_counts,
            } => format!("{base}/guilds/{guild_id}?with_counts={with_counts}"),
            EntityRef::GuildChannels {
                guild_id,
            } => format!("{base}/guilds/{guild_id}/channels"),
            EntityRef::GuildMembers {
                guild_id,
                limit,
            } => format!("{base}/guilds/{guild_id}/members?limit={limit}"),
            EntityRef::Member {
                guild_id,
                user_id,
            } => format!("{base}/guilds/{guild_id}/members/{user_id}"),
            EntityRef::GuildRoles {
                guild_id,
            } => format!("{base}/guilds/{guild_id}/roles"),
            EntityRef::Role {
                guild_id,
                role_id,
            } => format!("{base}/guilds/{guild_id}/roles/{role_id}"),
            EntityRef::Channel {
                channel_id,
            } => format!("{base}/channels/{channel_id}"),
            EntityRef::ChannelMessages {
                channel_id,
                query,
            } => format!("{base}/channels/{channel_id}/messages{}", history_query(query)),
            EntityRef::Message {
                channel_id,
                message_id,
            } => format!("{base}/channels/{channel_id}/messages/{message_id}"),
            EntityRef::MemberRole {
                ..
            }
            | EntityRef::Reaction {
                ..
            } => {
                return Err(ServiceError::Unsupported(format!("fetch {}", entity.kind())));
            }
        };
        Ok(url)
    }

    /// Sends one metered request and decodes the response body.
    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<Value, ServiceError> {
        self.request(Budget::Metered, method, url, body, reason).await
    }

    /// Fetches an entity for capability resolution without using the budget.
    async fn lookup(&self, entity: &EntityRef) -> Result<Value, ServiceError> {
        self.ensure_connected()?;
        if let Some(guild_id) = entity.guild_id() {
            self.ensure_guild_allowed(guild_id)?;
        }
        let url = self.fetch_url(entity)?;
        self.request(Budget::Exempt, Method::GET, url, None, None).await
    }

    /// Sends one authenticated request and decodes the response body.
    async fn request(
        &self,
        budget: Budget,
        method: Method,
        url: String,
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<Value, ServiceError> {
        if budget == Budget::Metered && !self.limiter.try_acquire() {
            warn!("client-side rate limit exceeded");
            return Err(ServiceError::RateLimited);
        }
        let authorization = HeaderValue::from_str(&format!("Bot {}", self.token))
            .map_err(|_| ServiceError::Transport("invalid bot token".to_string()))?;
        debug!(method = %method, url = %url, "discord request");
        let mut request = self.http.request(method, url).header(AUTHORIZATION, authorization);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(reason) = reason {
            let value = HeaderValue::from_str(&percent_encode(reason))
                .map_err(|_| ServiceError::Transport("invalid audit log reason".to_string()))?;
            request = request.header(AUDIT_LOG_REASON_HEADER, value);
        }
        let response =
            request.send().await.map_err(|err| ServiceError::Transport(err.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| ServiceError::Transport(err.to_string()))?;
        decode_response(status, &bytes)
    }

    /// Fetches the bot's member record in a guild.
    async fn bot_member(&self, actor_id: &str, guild_id: &str) -> Result<Value, ServiceError> {
        self.lookup(&EntityRef::Member {
            guild_id: guild_id.to_string(),
            user_id: actor_id.to_string(),
        })
        .await
    }
}

#[async_trait]
impl ChatService for DiscordClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn fetch(&self, entity: &EntityRef) -> Result<Value, ServiceError> {
        self.ensure_connected()?;
        if matches!(entity, EntityRef::CurrentUser)
            && let Some(user) = self.bot_user.lock().unwrap_or_else(PoisonError::into_inner).clone()
        {
            return Ok(user);
        }
        if let Some(guild_id) = entity.guild_id() {
            self.ensure_guild_allowed(guild_id)?;
        }
        let url = self.fetch_url(entity)?;
        self.send(Method::GET, url, None, None).await
    }

    async fn mutate(
        &self,
        entity: &EntityRef,
        op: MutationOp,
        payload: Value,
    ) -> Result<Value, ServiceError> {
        self.ensure_connected()?;
        if let Some(guild_id) = entity.guild_id() {
            self.ensure_guild_allowed(guild_id)?;
        }
        let base = &self.base_url;
        let reason = payload.get("reason").and_then(Value::as_str).map(str::to_string);
        match (entity, op) {
            (
                EntityRef::ChannelMessages {
                    channel_id, ..
                },
                MutationOp::Create,
            ) => {
                self.ensure_content_length(&payload)?;
                let url = format!("{base}/channels/{channel_id}/messages");
                self.send(Method::POST, url, Some(&payload), None).await
            }
            (
                EntityRef::Message {
                    channel_id,
                    message_id,
                },
                MutationOp::Update,
            ) => {
                self.ensure_content_length(&payload)?;
                let url = format!("{base}/channels/{channel_id}/messages/{message_id}");
                self.send(Method::PATCH, url, Some(&payload), None).await
            }
            (
                EntityRef::Message {
                    channel_id,
                    message_id,
                },
                MutationOp::Delete,
            ) => {
                let url = format!("{base}/channels/{channel_id}/messages/{message_id}");
                self.send(Method::DELETE, url, None, reason.as_deref()).await
            }
            (
                EntityRef::Reaction {
                    channel_id,
                    message_id,
                    emoji,
                },
                MutationOp::Create,
            ) => {
                let url = format!(
                    "{base}/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
                    percent_encode(emoji)
                );
                self.send(Method::PUT, url, None, None).await
            }
            (
                EntityRef::GuildRoles {
                    guild_id,
                },
                MutationOp::Create,
            ) => {
                let url = format!("{base}/guilds/{guild_id}/roles");
                self.send(Method::POST, url, Some(&payload), reason.as_deref()).await
            }
            (
                EntityRef::Role {
                    guild_id,
                    role_id,
                },
                MutationOp::Delete,
            ) => {
                let url = format!("{base}/guilds/{guild_id}/roles/{role_id}");
                self.send(Method::DELETE, url, None, reason.as_deref()).await
            }
            (
                EntityRef::MemberRole {
                    guild_id,
                    user_id,
                    role_id,
                },
                MutationOp::Create | MutationOp::Delete,
            ) => {
                let method = if op == MutationOp::Create { Method::PUT } else { Method::DELETE };
                let url = format!("{base}/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
                self.send(method, url, None, reason.as_deref()).await
            }
            _ => Err(ServiceError::Unsupported(format!("{} {}", op.as_str(), entity.kind()))),
        }
    }

    async fn capability_grants(
        &self,
        actor_id: &str,
        scope: &Scope,
    ) -> Result<ScopeGrants, ServiceError> {
        match scope {
            Scope::Channel(channel_id) => {
                let channel = self
                    .lookup(&EntityRef::Channel {
                        channel_id: channel_id.clone(),
                    })
                    .await?;
                let Some(guild_id) = string_field(&channel, &["guild_id"]) else {
                    return Ok(ScopeGrants::Private);
                };
                self.ensure_guild_allowed(&guild_id)?;
                let guild = self
                    .lookup(&EntityRef::Guild {
                        guild_id: guild_id.clone(),
                        with_counts: false,
                    })
                    .await?;
                let member = self.bot_member(actor_id, &guild_id).await?;
                let roles = member_roles(&member);
                Ok(ScopeGrants::Granted(vec![channel_mask(&guild, &channel, actor_id, &roles)]))
            }
            Scope::Guild(guild_id) => {
                let guild = self
                    .lookup(&EntityRef::Guild {
                        guild_id: guild_id.clone(),
                        with_counts: false,
                    })
                    .await?;
                let member = self.bot_member(actor_id, guild_id).await?;
                let roles = member_roles(&member);
                Ok(ScopeGrants::Granted(guild_masks(&guild, actor_id, &roles)))
            }
        }
    }
}

// ============================================================================
// SECTION: Capability Computation
// ============================================================================

/// Parses a permission bit set encoded as a string or number.
fn parse_bits(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::String(text)) => text.parse().unwrap_or(0),
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
        _ => 0,
    }
}

/// Returns the role ids of a member record.
fn member_roles(member: &Value) -> Vec<String> {
    member
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| roles.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Returns the guild-level masks held by the actor: `@everyone` plus every
/// member role. Owners and administrators hold every bit.
#[must_use]
pub fn guild_masks(guild: &Value, actor_id: &str, member_roles: &[String]) -> Vec<u64> {
    if string_field(guild, &["owner_id"]).as_deref() == Some(actor_id) {
        return vec![capability::ALL];
    }
    let guild_id = string_field(guild, &["id"]).unwrap_or_default();
    let roles = guild.get("roles").and_then(Value::as_array).cloned().unwrap_or_default();
    let masks: Vec<u64> = roles
        .iter()
        .filter(|role| {
            string_field(role, &["id"])
                .is_some_and(|id| id == guild_id || member_roles.iter().any(|held| *held == id))
        })
        .map(|role| parse_bits(role.get("permissions")))
        .collect();
    if masks.iter().any(|mask| mask & capability::ADMINISTRATOR != 0) {
        return vec![capability::ALL];
    }
    masks
}

/// Computes the actor's effective mask in a guild channel.
///
/// Overwrites apply in platform order: `@everyone`, then member roles
/// (deny then allow, aggregated), then the member itself.
#[must_use]
pub fn channel_mask(guild: &Value, channel: &Value, actor_id: &str, member_roles: &[String]) -> u64 {
    let base = guild_masks(guild, actor_id, member_roles).iter().fold(0, |acc, mask| acc | mask);
    if base == capability::ALL {
        return base;
    }
    let guild_id = string_field(guild, &["id"]).unwrap_or_default();
    let overwrites = channel
        .get("permission_overwrites")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut mask = base;
    let mut role_allow = 0;
    let mut role_deny = 0;
    let mut member_overwrite = None;
    for overwrite in &overwrites {
        let id = string_field(overwrite, &["id"]).unwrap_or_default();
        let allow = parse_bits(overwrite.get("allow"));
        let deny = parse_bits(overwrite.get("deny"));
        let kind = overwrite.get("type").and_then(Value::as_u64).unwrap_or(0);
        if id == guild_id {
            mask = (mask & !deny) | allow;
        } else if kind == OVERWRITE_MEMBER {
            if id == actor_id {
                member_overwrite = Some((allow, deny));
            }
        } else if member_roles.iter().any(|role| *role == id) {
            role_allow |= allow;
            role_deny |= deny;
        }
    }
    mask = (mask & !role_deny) | role_allow;
    if let Some((allow, deny)) = member_overwrite {
        mask = (mask & !deny) | allow;
    }
    mask
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a response status and body to a decoded value or a typed error.
///
/// The status is classified first; an error body only contributes its
/// `message` field when it is JSON.
fn decode_response(status: StatusCode, bytes: &[u8]) -> Result<Value, ServiceError> {
    if status.is_success() {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(bytes).map_err(|err| ServiceError::Decode(err.to_string()));
    }
    let message = serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|body| string_field(&body, &["message"]))
        .unwrap_or_else(|| status.to_string());
    Err(match status {
        StatusCode::NOT_FOUND => ServiceError::RemoteNotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::RemoteForbidden(message),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited,
        status => ServiceError::Transport(format!("HTTP {status}: {message}")),
    })
}

/// Renders the history query string.
fn history_query(query: &MessageQuery) -> String {
    let mut out = format!("?limit={}", query.limit);
    for (key, value) in
        [("before", &query.before), ("after", &query.after), ("around", &query.around)]
    {
        if let Some(value) = value {
            let _ = write!(out, "&{key}={}", percent_encode(value));
        }
    }
    out
}

/// Percent-encodes every byte outside the unreserved set.
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~' | b':') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
