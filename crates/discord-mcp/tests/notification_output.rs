// crates/discord-mcp/tests/notification_output.rs
// ============================================================================
// Module: Notification Output Tests
// Description: Event gating and shared-writer line integrity.
// Purpose: Ensure notifications and responses never interleave on output.
// Dependencies: discord-mcp, discord-mcp-config, serde_json, tokio
// ============================================================================

//! ## Overview
//! Emitter threads write event notifications while a session answers a burst
//! of requests on the same sink. Every captured line must parse on its own.

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

mod common;

use std::fmt::Write as _;
use std::sync::Arc;
use std::thread;

use discord_mcp::EmitOutcome;
use discord_mcp::EventDispatcher;
use discord_mcp::NotificationChannel;
use discord_mcp::SharedWriter;
use discord_mcp::events::EventUser;
use discord_mcp::events::GuildMemberAdd;
use discord_mcp::events::MessageCreate;
use discord_mcp_config::EVENT_GUILD_MEMBER_ADDED;
use discord_mcp_config::EVENT_MESSAGE_CREATED;
use discord_mcp_config::EventsConfig;
use serde_json::Value;
use serde_json::json;

use crate::common::FakeChatService;
use crate::common::TestResult;
use crate::common::session;

const EMITTERS: usize = 4;
const EVENTS_PER_EMITTER: usize = 50;
const REQUESTS: usize = 100;

fn events(enabled: bool, allowed: &[&str]) -> EventsConfig {
    EventsConfig {
        enabled,
        allowed_events: allowed.iter().map(ToString::to_string).collect(),
    }
}

fn message(index: usize) -> MessageCreate {
    MessageCreate {
        id: index.to_string(),
        channel_id: "10".to_string(),
        guild_id: Some("1".to_string()),
        author: EventUser {
            id: "42".to_string(),
            username: "writer".to_string(),
        },
        content: "z".repeat(4096),
    }
}

// ============================================================================
// SECTION: Gating
// ============================================================================

#[test]
fn disabled_flag_suppresses_allow_listed_events() {
    let (writer, buffer) = SharedWriter::in_memory();
    let dispatcher = EventDispatcher::new(NotificationChannel::new(
        events(false, &[EVENT_MESSAGE_CREATED]),
        writer,
    ));
    assert_eq!(dispatcher.message_created(&message(1)), EmitOutcome::Disabled);
    assert!(buffer.lines().is_empty());
}

#[test]
fn enabled_flag_still_filters_unlisted_events() {
    let (writer, buffer) = SharedWriter::in_memory();
    let dispatcher = EventDispatcher::new(NotificationChannel::new(
        events(true, &[EVENT_GUILD_MEMBER_ADDED]),
        writer,
    ));
    assert_eq!(dispatcher.message_created(&message(1)), EmitOutcome::Filtered);
    let joined = GuildMemberAdd {
        guild_id: "1".to_string(),
        user: EventUser {
            id: "7".to_string(),
            username: "newcomer".to_string(),
        },
    };
    assert_eq!(dispatcher.guild_member_added(&joined), EmitOutcome::Delivered);
    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    let envelope: Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(envelope["method"], EVENT_GUILD_MEMBER_ADDED);
    assert_eq!(envelope["params"]["user"]["username"], "newcomer");
    assert!(envelope.get("id").is_none());
}

#[test]
fn gateway_dispatch_routes_by_event_type() {
    let (writer, buffer) = SharedWriter::in_memory();
    let dispatcher = EventDispatcher::new(NotificationChannel::new(
        events(true, &[EVENT_MESSAGE_CREATED]),
        writer,
    ));
    let dispatch = json!({
        "t": "MESSAGE_CREATE",
        "d": {
            "id": "3",
            "channel_id": "10",
            "author": {"id": "42", "username": "writer"},
            "content": "hi",
        },
    });
    assert_eq!(dispatcher.dispatch_gateway(&dispatch), Some(EmitOutcome::Delivered));
    let envelope: Value = serde_json::from_str(&buffer.lines()[0]).unwrap();
    assert_eq!(envelope["params"]["author_id"], "42");
    assert_eq!(envelope["params"]["guild_id"], "");
    assert_eq!(dispatcher.dispatch_gateway(&json!({"t": "TYPING_START", "d": {}})), None);
}

// ============================================================================
// SECTION: Line Integrity
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_notifications_never_interleave_with_responses() -> TestResult {
    let (writer, buffer) = SharedWriter::in_memory();
    let dispatcher = EventDispatcher::new(NotificationChannel::new(
        events(true, &[EVENT_MESSAGE_CREATED]),
        writer.clone(),
    ));
    let mut input = String::new();
    for id in 0..REQUESTS {
        writeln!(input, r#"{{"jsonrpc":"2.0","id":{id},"method":"ping"}}"#).unwrap();
    }

    let emitters: Vec<_> = (0..EMITTERS)
        .map(|emitter| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                for index in 0..EVENTS_PER_EMITTER {
                    let outcome = dispatcher.message_created(&message(emitter * 1000 + index));
                    assert_eq!(outcome, EmitOutcome::Delivered);
                }
            })
        })
        .collect();

    let mut session = session(Arc::new(FakeChatService::new()), writer);
    session
        .run(tokio::io::BufReader::new(input.as_bytes()))
        .await
        .map_err(|err| err.to_string())?;
    for emitter in emitters {
        emitter.join().map_err(|_| "emitter panicked".to_string())?;
    }

    let lines = buffer.lines();
    assert_eq!(lines.len(), REQUESTS + EMITTERS * EVENTS_PER_EMITTER);
    let mut responses = 0;
    let mut notifications = 0;
    for line in &lines {
        let envelope: Value =
            serde_json::from_str(line).map_err(|err| format!("interleaved line: {err}"))?;
        if envelope.get("id").is_some() {
            assert_eq!(envelope["result"]["status"], "pong");
            responses += 1;
        } else {
            assert_eq!(envelope["params"]["content"].as_str().map(str::len), Some(4096));
            notifications += 1;
        }
    }
    assert_eq!(responses, REQUESTS);
    assert_eq!(notifications, EMITTERS * EVENTS_PER_EMITTER);
    Ok(())
}
