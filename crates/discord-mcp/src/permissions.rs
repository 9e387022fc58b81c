// crates/discord-mcp/src/permissions.rs
// ============================================================================
// Module: Permission Gate
// Description: Capability bitmask resolution and rule evaluation.
// Purpose: Deny tool operations the bot cannot perform before calling out.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every gated operation has exactly one [`PermissionRule`] in [`RULES`]:
//! a required capability bit, the scope kind it is evaluated in, and an
//! optional ownership override that applies a lesser requirement when the bot
//! owns the target resource. [`PermissionGate`] resolves the bot's aggregate
//! mask for a scope (bitwise OR of every grant) and evaluates rules uniformly.
//!
//! ## Invariants
//! - Masks are computed on demand and never cached across calls.
//! - Private conversations use [`DIRECT_MESSAGE_BASELINE`].
//! - A denial names the lowest missing capability bit.
//!
//! Security posture: fail closed; an unresolvable scope is a denial.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::protocol::ToolCallResult;
use crate::service::ChatService;
use crate::service::EntityRef;
use crate::service::Scope;
use crate::service::ScopeGrants;
use crate::service::ServiceError;

// ============================================================================
// SECTION: Capability Bits
// ============================================================================

/// Remote platform capability bits.
pub mod capability {
    /// Bypasses every other check.
    pub const ADMINISTRATOR: u64 = 1 << 3;
    /// Add reactions to messages.
    pub const ADD_REACTIONS: u64 = 1 << 6;
    /// View a channel.
    pub const VIEW_CHANNEL: u64 = 1 << 10;
    /// Send messages.
    pub const SEND_MESSAGES: u64 = 1 << 11;
    /// Send text-to-speech messages.
    pub const SEND_TTS_MESSAGES: u64 = 1 << 12;
    /// Edit or delete messages of other users.
    pub const MANAGE_MESSAGES: u64 = 1 << 13;
    /// Embed links.
    pub const EMBED_LINKS: u64 = 1 << 14;
    /// Attach files.
    pub const ATTACH_FILES: u64 = 1 << 15;
    /// Read message history.
    pub const READ_MESSAGE_HISTORY: u64 = 1 << 16;
    /// Mention everyone.
    pub const MENTION_EVERYONE: u64 = 1 << 17;
    /// Use emojis from other guilds.
    pub const USE_EXTERNAL_EMOJIS: u64 = 1 << 18;
    /// Manage roles.
    pub const MANAGE_ROLES: u64 = 1 << 28;
    /// Every capability bit.
    pub const ALL: u64 = u64::MAX;
}

/// Mask granted in private one-to-one conversations.
pub const DIRECT_MESSAGE_BASELINE: u64 = capability::VIEW_CHANNEL
    | capability::SEND_MESSAGES
    | capability::READ_MESSAGE_HISTORY
    | capability::ADD_REACTIONS;

/// Capability names reported by [`permission_summary`], in display order.
const SUMMARY_BITS: &[(&str, u64)] = &[
    ("view_channel", capability::VIEW_CHANNEL),
    ("send_messages", capability::SEND_MESSAGES),
    ("send_tts_messages", capability::SEND_TTS_MESSAGES),
    ("manage_messages", capability::MANAGE_MESSAGES),
    ("read_message_history", capability::READ_MESSAGE_HISTORY),
    ("add_reactions", capability::ADD_REACTIONS),
    ("use_external_emojis", capability::USE_EXTERNAL_EMOJIS),
    ("attach_files", capability::ATTACH_FILES),
    ("embed_links", capability::EMBED_LINKS),
    ("mention_everyone", capability::MENTION_EVERYONE),
];

/// Returns the platform name of a single capability bit.
#[must_use]
pub const fn capability_name(bit: u64) -> &'static str {
    match bit {
        capability::ADMINISTRATOR => "ADMINISTRATOR",
        capability::ADD_REACTIONS => "ADD_REACTIONS",
        capability::VIEW_CHANNEL => "VIEW_CHANNEL",
        capability::SEND_MESSAGES => "SEND_MESSAGES",
        capability::SEND_TTS_MESSAGES => "SEND_TTS_MESSAGES",
        capability::MANAGE_MESSAGES => "MANAGE_MESSAGES",
        capability::EMBED_LINKS => "EMBED_LINKS",
        capability::ATTACH_FILES => "ATTACH_FILES",
        capability::READ_MESSAGE_HISTORY => "READ_MESSAGE_HISTORY",
        capability::MENTION_EVERYONE => "MENTION_EVERYONE",
        capability::USE_EXTERNAL_EMOJIS => "USE_EXTERNAL_EMOJIS",
        capability::MANAGE_ROLES => "MANAGE_ROLES",
        _ => "UNKNOWN",
    }
}

// ============================================================================
// SECTION: Rule Table
// ============================================================================

/// Gated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// View a channel.
    ViewChannel,
    /// Send a message.
    SendMessage,
    /// Send a text-to-speech message.
    SendTtsMessage,
    /// Read channel history.
    ReadMessages,
    /// Edit a message.
    EditMessage,
    /// Delete a message.
    DeleteMessage,
    /// Add a reaction.
    AddReaction,
    /// Use a custom emoji.
    UseExternalEmoji,
    /// Access a guild.
    ViewGuild,
    /// Manage guild roles.
    ManageRoles,
}

impl Operation {
    /// Returns the stable operation label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.rule().label
    }

    /// Returns the rule for this operation.
    #[must_use]
    pub const fn rule(self) -> &'static PermissionRule {
        &RULES[self.index()]
    }

    /// Position of this operation's rule in [`RULES`].
    const fn index(self) -> usize {
        match self {
            Self::ViewChannel => 0,
            Self::SendMessage => 1,
            Self::SendTtsMessage => 2,
            Self::ReadMessages => 3,
            Self::EditMessage => 4,
            Self::DeleteMessage => 5,
            Self::AddReaction => 6,
            Self::UseExternalEmoji => 7,
            Self::ViewGuild => 8,
            Self::ManageRoles => 9,
        }
    }
}

/// Scope kind a rule is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Channel-level capabilities.
    Channel,
    /// Guild-level capabilities.
    Guild,
}

/// Lesser requirement applied when the bot owns the target resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipOverride {
    /// Bits required on owned resources.
    pub owner_required: u64,
    /// Operation label reported for owned resources.
    pub owner_label: &'static str,
    /// Denial text for owned resources.
    pub owner_description: &'static str,
    /// Operation label reported for resources owned by others.
    pub other_label: &'static str,
    /// Denial text for resources owned by others.
    pub other_description: &'static str,
}

/// Capability requirement of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionRule {
    /// Gated operation.
    pub operation: Operation,
    /// Stable operation label.
    pub label: &'static str,
    /// Required capability bits (0 means scope access alone suffices).
    pub required: u64,
    /// Scope kind the rule is evaluated in.
    pub scope: ScopeKind,
    /// Optional ownership override.
    pub ownership: Option<OwnershipOverride>,
    /// Denial text.
    pub description: &'static str,
}

/// Rule table indexed by [`Operation`] discriminant.
pub const RULES: &[PermissionRule] = &[
    PermissionRule {
        operation: Operation::ViewChannel,
        label: "view_channel",
        required: capability::VIEW_CHANNEL,
        scope: ScopeKind::Channel,
        ownership: None,
        description: "Bot cannot view this channel",
    },
    PermissionRule {
        operation: Operation::SendMessage,
        label: "send_message",
        required: capability::SEND_MESSAGES,
        scope: ScopeKind::Channel,
        ownership: None,
        description: "Bot cannot send messages to this channel",
    },
    PermissionRule {
        operation: Operation::SendTtsMessage,
        label: "send_tts_message",
        required: capability::SEND_TTS_MESSAGES,
        scope: ScopeKind::Channel,
        ownership: None,
        description: "Bot cannot send TTS messages to this channel",
    },
    PermissionRule {
        operation: Operation::ReadMessages,
        label: "read_messages",
        required: capability::READ_MESSAGE_HISTORY,
        scope: ScopeKind::Channel,
        ownership: None,
        description: "Bot cannot read message history in this channel",
    },
    PermissionRule {
        operation: Operation::EditMessage,
        label: "edit_message",
        required: capability::MANAGE_MESSAGES,
        scope: ScopeKind::Channel,
        ownership: Some(OwnershipOverride {
            owner_required: capability::SEND_MESSAGES,
            owner_label: "edit_own_message",
            owner_description: "Bot cannot edit its own messages without SEND_MESSAGES permission",
            other_label: "edit_others_message",
            other_description: "Bot cannot edit other users' messages without MANAGE_MESSAGES \
                                permission",
        }),
        description: "Bot cannot manage messages in this channel",
    },
    PermissionRule {
        operation: Operation::DeleteMessage,
        label: "delete_message",
        required: capability::MANAGE_MESSAGES,
        scope: ScopeKind::Channel,
        ownership: Some(OwnershipOverride {
            owner_required: 0,
            owner_label: "delete_own_message",
            owner_description: "Bot cannot delete its own messages",
            other_label: "delete_others_message",
            other_description: "Bot cannot delete other users' messages without MANAGE_MESSAGES \
                                permission",
        }),
        description: "Bot cannot manage messages in this channel",
    },
    PermissionRule {
        operation: Operation::AddReaction,
        label: "add_reaction",
        required: capability::ADD_REACTIONS,
        scope: ScopeKind::Channel,
        ownership: None,
        description: "Bot cannot add reactions in this channel",
    },
    PermissionRule {
        operation: Operation::UseExternalEmoji,
        label: "use_external_emoji",
        required: capability::USE_EXTERNAL_EMOJIS,
        scope: ScopeKind::Channel,
        ownership: None,
        description: "Bot cannot use external emojis in this channel",
    },
    PermissionRule {
        operation: Operation::ViewGuild,
        label: "view_guild",
        required: 0,
        scope: ScopeKind::Guild,
        ownership: None,
        description: "Bot does not have access to this guild",
    },
    PermissionRule {
        operation: Operation::ManageRoles,
        label: "manage_roles",
        required: capability::MANAGE_ROLES,
        scope: ScopeKind::Guild,
        ownership: None,
        description: "Bot cannot manage roles in this guild",
    },
];

// ============================================================================
// SECTION: Checks and Denials
// ============================================================================

/// One permission check requested by a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheck {
    /// Gated operation.
    pub operation: Operation,
    /// Scope the mask is resolved in.
    pub scope: Scope,
    /// Target resource for ownership overrides.
    pub target: Option<EntityRef>,
}

impl PermissionCheck {
    /// Builds a channel-scoped check.
    #[must_use]
    pub fn channel(operation: Operation, channel_id: &str) -> Self {
        Self {
            operation,
            scope: Scope::Channel(channel_id.to_string()),
            target: None,
        }
    }

    /// Builds a guild-scoped check.
    #[must_use]
    pub fn guild(operation: Operation, guild_id: &str) -> Self {
        Self {
            operation,
            scope: Scope::Guild(guild_id.to_string()),
            target: None,
        }
    }

    /// Attaches the target resource.
    #[must_use]
    pub fn on_target(mut self, target: EntityRef) -> Self {
        self.target = Some(target);
        self
    }
}

/// Structured permission denial.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("insufficient permissions for {operation} on {resource}: missing {permission} ({description})")]
pub struct PermissionDenied {
    /// Operation label.
    pub operation: String,
    /// Missing capability name.
    pub permission: String,
    /// Resource label (`channel:ID`, `guild:ID`, `message:ID`).
    pub resource: String,
    /// Human-readable description.
    pub description: String,
}

impl PermissionDenied {
    /// Renders the denial as an `isError` tool result.
    #[must_use]
    pub fn to_tool_result(&self) -> ToolCallResult {
        ToolCallResult::error(
            format!("🔒 Permission Error: {}", self.description),
            json!({
                "error_type": "permission",
                "operation": self.operation,
                "permission": self.permission,
                "resource": self.resource,
                "description": self.description,
            }),
        )
    }
}

/// Authorization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizeError {
    /// The bot lacks a required capability.
    #[error(transparent)]
    Denied(#[from] PermissionDenied),
    /// The remote service failed while resolving the check.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl AuthorizeError {
    /// Renders the failure as an `isError` tool result.
    #[must_use]
    pub fn to_tool_result(&self) -> ToolCallResult {
        match self {
            Self::Denied(denied) => denied.to_tool_result(),
            Self::Service(err) => err.to_tool_result("Permission check failed"),
        }
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Returns the lowest required bit absent from `mask`, if any.
#[must_use]
pub const fn missing_bit(mask: u64, required: u64) -> Option<u64> {
    let missing = required & !mask;
    if missing == 0 { None } else { Some(1 << missing.trailing_zeros()) }
}

/// Returns the aggregate mask of a grant set.
#[must_use]
pub fn aggregate_mask(grants: &ScopeGrants) -> u64 {
    match grants {
        ScopeGrants::Private => DIRECT_MESSAGE_BASELINE,
        ScopeGrants::Granted(masks) => masks.iter().fold(0, |acc, mask| acc | mask),
    }
}

/// Evaluates a rule against a resolved mask.
///
/// `owned` is `Some` when the rule's ownership override applies to a target.
///
/// # Errors
///
/// Returns [`PermissionDenied`] when a required bit is missing.
pub fn evaluate(
    rule: &PermissionRule,
    mask: u64,
    owned: Option<bool>,
    resource: String,
) -> Result<(), PermissionDenied> {
    let (required, label, description) = match (rule.ownership, owned) {
        (Some(ownership), Some(true)) => {
            (ownership.owner_required, ownership.owner_label, ownership.owner_description)
        }
        (Some(ownership), Some(false)) => {
            (rule.required, ownership.other_label, ownership.other_description)
        }
        _ => (rule.required, rule.label, rule.description),
    };
    match missing_bit(mask, required) {
        None => Ok(()),
        Some(bit) => Err(PermissionDenied {
            operation: label.to_string(),
            permission: capability_name(bit).to_string(),
            resource,
            description: description.to_string(),
        }),
    }
}

/// Returns the fixed-shape capability summary for a mask.
#[must_use]
pub fn permission_summary(mask: u64) -> BTreeMap<&'static str, bool> {
    SUMMARY_BITS.iter().map(|(name, bit)| (*name, mask & bit != 0)).collect()
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Permission gate over a chat service.
#[derive(Clone)]
pub struct PermissionGate {
    /// Remote service used to resolve grants and owners.
    service: Arc<dyn ChatService>,
}

impl PermissionGate {
    /// Creates a gate over the given service.
    #[must_use]
    pub fn new(service: Arc<dyn ChatService>) -> Self {
        Self {
            service,
        }
    }

    /// Resolves the actor's aggregate mask for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizeError::Denied`] when the scope is inaccessible and
    /// [`AuthorizeError::Service`] for other remote failures.
    pub async fn capability_mask(
        &self,
        actor_id: &str,
        operation: Operation,
        scope: &Scope,
    ) -> Result<u64, AuthorizeError> {
        match self.service.capability_grants(actor_id, scope).await {
            Ok(grants) => Ok(aggregate_mask(&grants)),
            Err(ServiceError::RemoteNotFound(_) | ServiceError::RemoteForbidden(_)) => {
                Err(AuthorizeError::Denied(scope_access_denied(operation, scope)))
            }
            Err(err) => Err(AuthorizeError::Service(err)),
        }
    }

    /// Authorizes one check.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizeError`] when the check fails.
    pub async fn authorize(
        &self,
        actor_id: &str,
        check: &PermissionCheck,
    ) -> Result<(), AuthorizeError> {
        self.authorize_all(actor_id, std::slice::from_ref(check)).await
    }

    /// Authorizes checks in order; the first denial wins.
    ///
    /// Masks are resolved once per scope within this call.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizeError`] for the first failing check.
    pub async fn authorize_all(
        &self,
        actor_id: &str,
        checks: &[PermissionCheck],
    ) -> Result<(), AuthorizeError> {
        let mut masks: Vec<(Scope, u64)> = Vec::new();
        for check in checks {
            let mask = if let Some((_, mask)) = masks.iter().find(|(scope, _)| *scope == check.scope)
            {
                *mask
            } else {
                let mask = self.capability_mask(actor_id, check.operation, &check.scope).await?;
                masks.push((check.scope.clone(), mask));
                mask
            };
            let rule = check.operation.rule();
            let (owned, resource) = match (&rule.ownership, &check.target) {
                (Some(_), Some(target)) => {
                    let owner = self.service.resource_owner(target).await?;
                    let owned = owner.as_deref() == Some(actor_id);
                    (Some(owned), target_resource(target).unwrap_or_else(|| check.scope.resource()))
                }
                _ => (None, check.scope.resource()),
            };
            debug!(
                operation = rule.label,
                resource = %resource,
                mask,
                "evaluating permission"
            );
            evaluate(rule, mask, owned, resource)?;
        }
        Ok(())
    }

    /// Returns the capability summary for a channel.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizeError`] when the mask cannot be resolved.
    pub async fn channel_summary(
        &self,
        actor_id: &str,
        channel_id: &str,
    ) -> Result<BTreeMap<&'static str, bool>, AuthorizeError> {
        let scope = Scope::Channel(channel_id.to_string());
        let mask = self.capability_mask(actor_id, Operation::ViewChannel, &scope).await?;
        Ok(permission_summary(mask))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the denial reported when a scope cannot be accessed.
fn scope_access_denied(operation: Operation, scope: &Scope) -> PermissionDenied {
    let (permission, description) = match scope {
        Scope::Guild(_) => ("GUILD_ACCESS", "Bot does not have access to this guild"),
        Scope::Channel(_) => ("CHANNEL_ACCESS", "Bot does not have access to this channel"),
    };
    PermissionDenied {
        operation: operation.as_str().to_string(),
        permission: permission.to_string(),
        resource: scope.resource(),
        description: description.to_string(),
    }
}

/// Returns the resource label of an ownership target.
fn target_resource(target: &EntityRef) -> Option<String> {
    match target {
        EntityRef::Message {
            message_id, ..
        } => Some(format!("message:{message_id}")),
        EntityRef::Role {
            role_id, ..
        } => Some(format!("role:{role_id}")),
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only permission assertions."
    )]

    use super::Operation;
    use super::RULES;
    use super::ScopeGrants;
    use super::aggregate_mask;
    use super::capability;
    use super::evaluate;
    use super::missing_bit;
    use super::permission_summary;

    const ALL_OPERATIONS: &[Operation] = &[
        Operation::ViewChannel,
        Operation::SendMessage,
        Operation::SendTtsMessage,
        Operation::ReadMessages,
        Operation::EditMessage,
        Operation::DeleteMessage,
        Operation::AddReaction,
        Operation::UseExternalEmoji,
        Operation::ViewGuild,
        Operation::ManageRoles,
    ];

    #[test]
    fn rule_table_is_indexed_by_operation() {
        assert_eq!(RULES.len(), ALL_OPERATIONS.len());
        for operation in ALL_OPERATIONS {
            assert_eq!(operation.rule().operation, *operation);
        }
    }

    #[test]
    fn mask_with_only_send_bit_is_checked_bitwise() {
        let mask = 0b0100;
        assert_eq!(missing_bit(mask, 0b1000), Some(0b1000));
        assert_eq!(missing_bit(mask, 0b0100), None);
        assert_eq!(missing_bit(mask, 0), None);
    }

    #[test]
    fn missing_bit_reports_lowest_absent_bit() {
        assert_eq!(missing_bit(0, 0b1010), Some(0b0010));
    }

    #[test]
    fn grants_are_combined_with_or() {
        let grants = ScopeGrants::Granted(vec![capability::VIEW_CHANNEL, capability::SEND_MESSAGES]);
        assert_eq!(aggregate_mask(&grants), capability::VIEW_CHANNEL | capability::SEND_MESSAGES);
        assert_eq!(aggregate_mask(&ScopeGrants::Granted(Vec::new())), 0);
    }

    #[test]
    fn private_scope_uses_baseline() {
        let mask = aggregate_mask(&ScopeGrants::Private);
        assert!(evaluate(Operation::SendMessage.rule(), mask, None, "channel:1".into()).is_ok());
        let denied = evaluate(Operation::ManageRoles.rule(), mask, None, "guild:1".into());
        assert_eq!(denied.unwrap_err().permission, "MANAGE_ROLES");
    }

    #[test]
    fn ownership_override_relaxes_requirement_for_owner() {
        let rule = Operation::EditMessage.rule();
        let mask = capability::VIEW_CHANNEL | capability::SEND_MESSAGES;
        assert!(evaluate(rule, mask, Some(true), "message:9".into()).is_ok());
        let denied = evaluate(rule, mask, Some(false), "message:9".into()).unwrap_err();
        assert_eq!(denied.operation, "edit_others_message");
        assert_eq!(denied.permission, "MANAGE_MESSAGES");
        assert_eq!(denied.resource, "message:9");
    }

    #[test]
    fn own_message_deletion_needs_no_extra_bits() {
        let rule = Operation::DeleteMessage.rule();
        assert!(evaluate(rule, 0, Some(true), "message:9".into()).is_ok());
        assert!(evaluate(rule, 0, Some(false), "message:9".into()).is_err());
    }

    #[test]
    fn summary_has_fixed_shape() {
        let summary = permission_summary(capability::VIEW_CHANNEL);
        assert_eq!(summary.len(), 10);
        assert_eq!(summary.get("view_channel"), Some(&true));
        assert_eq!(summary.get("send_messages"), Some(&false));
    }

    #[test]
    fn denial_renders_permission_payload() {
        let denied =
            evaluate(Operation::SendMessage.rule(), 0, None, "channel:5".into()).unwrap_err();
        let result = denied.to_tool_result();
        assert!(result.is_error);
        assert_eq!(result.text(), Some("🔒 Permission Error: Bot cannot send messages to this channel"));
        let data = result.data().unwrap();
        assert_eq!(data["error_type"], "permission");
        assert_eq!(data["operation"], "send_message");
        assert_eq!(data["permission"], "SEND_MESSAGES");
        assert_eq!(data["resource"], "channel:5");
    }
}
