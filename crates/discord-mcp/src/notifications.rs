// crates/discord-mcp/src/notifications.rs
// ============================================================================
// Module: Notification Channel
// Description: Filtered, best-effort push events on the shared output sink.
// Purpose: Emit allow-listed events without disturbing the response stream.
// Dependencies: discord-mcp-config, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`NotificationChannel::emit`] drops events unless the global enable flag is
//! set and the event name is allow-listed. Accepted events are written through
//! the same [`SharedWriter`] lock as responses, so lines never interleave.
//! Delivery is fire-and-forget: write failures are logged and swallowed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use discord_mcp_config::EventsConfig;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::output::SharedWriter;
use crate::protocol::JsonRpcNotification;

// ============================================================================
// SECTION: Channel
// ============================================================================

/// Outcome of one emit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Notifications are globally disabled.
    Disabled,
    /// Event name is not allow-listed.
    Filtered,
    /// Envelope was written.
    Delivered,
    /// Write failed; the event was dropped.
    Dropped,
}

/// Cloneable notification emitter.
#[derive(Clone)]
pub struct NotificationChannel {
    /// Enable flag and allow-list.
    config: EventsConfig,
    /// Output sink shared with the session.
    writer: SharedWriter,
}

impl NotificationChannel {
    /// Creates a channel over the shared writer.
    #[must_use]
    pub const fn new(config: EventsConfig, writer: SharedWriter) -> Self {
        Self {
            config,
            writer,
        }
    }

    /// Returns true when `event` would be delivered.
    #[must_use]
    pub fn accepts(&self, event: &str) -> bool {
        self.config.allows(event)
    }

    /// Emits one event. Never fails.
    pub fn emit(&self, event: &str, params: Value) -> EmitOutcome {
        if !self.config.enabled {
            return EmitOutcome::Disabled;
        }
        if !self.config.allows(event) {
            debug!(event, "notification filtered");
            return EmitOutcome::Filtered;
        }
        let envelope = JsonRpcNotification::new(event, Some(params));
        match self.writer.write_envelope(&envelope) {
            Ok(bytes) => {
                debug!(event, bytes, "notification emitted");
                EmitOutcome::Delivered
            }
            Err(err) => {
                warn!(event, error = %err, "notification dropped");
                EmitOutcome::Dropped
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
