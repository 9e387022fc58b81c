// crates/discord-mcp/src/discord/tests.rs
// ============================================================================
// Module: Discord Client Unit Tests
// Description: Unit tests for rate limiting, URL building and capability math.
// Purpose: Pin local guards that run before any request leaves the process.
// Dependencies: serde_json, tokio
// ============================================================================

//! ## Overview
//! Covers the sliding-window limiter, overwrite resolution and the local
//! guards (connection, allow-list, content length) without network access.

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

use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use discord_mcp_config::DiscordConfig;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;

use super::DiscordClient;
use super::RateLimiter;
use super::channel_mask;
use super::decode_response;
use super::guild_masks;
use super::history_query;
use super::percent_encode;
use crate::permissions::capability;
use crate::service::ChatService;
use crate::service::EntityRef;
use crate::service::MessageQuery;
use crate::service::MutationOp;
use crate::service::Scope;
use crate::service::ServiceError;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const GUILD: &str = "100";
const BOT: &str = "900";
const ROLE: &str = "200";

fn guild(everyone: u64, role: u64) -> Value {
    json!({
        "id": GUILD,
        "owner_id": "1",
        "roles": [
            {"id": GUILD, "permissions": everyone.to_string()},
            {"id": ROLE, "permissions": role.to_string()},
            {"id": "201", "permissions": capability::MANAGE_ROLES.to_string()},
        ],
    })
}

fn client(config: DiscordConfig) -> DiscordClient {
    let client = DiscordClient::from_config(&config).unwrap();
    client.connected.store(true, Ordering::SeqCst);
    client
}

fn config() -> DiscordConfig {
    DiscordConfig {
        token: "test-token".to_string(),
        api_base_url: "http://127.0.0.1:9/api/v10/".to_string(),
        ..DiscordConfig::default()
    }
}

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

#[test]
fn limiter_refuses_calls_beyond_budget() {
    let limiter = RateLimiter::new(2, Duration::from_secs(60));
    let now = Instant::now();
    assert!(limiter.try_acquire_at(now));
    assert!(limiter.try_acquire_at(now));
    assert!(!limiter.try_acquire_at(now + Duration::from_secs(30)));
}

#[test]
fn limiter_admits_calls_after_window_slides() {
    let limiter = RateLimiter::new(1, Duration::from_secs(60));
    let now = Instant::now();
    assert!(limiter.try_acquire_at(now));
    assert!(!limiter.try_acquire_at(now + Duration::from_secs(59)));
    assert!(limiter.try_acquire_at(now + Duration::from_secs(60)));
}

// ============================================================================
// SECTION: Capability Computation
// ============================================================================

#[test]
fn guild_masks_include_everyone_and_member_roles_only() {
    let masks = guild_masks(
        &guild(capability::VIEW_CHANNEL, capability::SEND_MESSAGES),
        BOT,
        &[ROLE.to_string()],
    );
    assert_eq!(masks, vec![capability::VIEW_CHANNEL, capability::SEND_MESSAGES]);
}

#[test]
fn guild_owner_and_administrator_hold_every_bit() {
    let owner = guild_masks(&guild(0, 0), "1", &[]);
    assert_eq!(owner, vec![capability::ALL]);
    let admin = guild_masks(&guild(0, capability::ADMINISTRATOR), BOT, &[ROLE.to_string()]);
    assert_eq!(admin, vec![capability::ALL]);
}

#[test]
fn channel_overwrites_apply_everyone_then_roles_then_member() {
    let base = capability::VIEW_CHANNEL | capability::SEND_MESSAGES;
    let channel = json!({
        "id": "300",
        "guild_id": GUILD,
        "permission_overwrites": [
            {"id": BOT, "type": 1, "allow": capability::ADD_REACTIONS.to_string(), "deny": "0"},
            {"id": ROLE, "type": 0, "allow": capability::SEND_MESSAGES.to_string(), "deny": "0"},
            {"id": GUILD, "type": 0, "allow": "0", "deny": capability::SEND_MESSAGES.to_string()},
        ],
    });
    let mask = channel_mask(&guild(base, 0), &channel, BOT, &[ROLE.to_string()]);
    assert_eq!(
        mask,
        capability::VIEW_CHANNEL | capability::SEND_MESSAGES | capability::ADD_REACTIONS
    );
}

#[test]
fn channel_everyone_deny_removes_bit() {
    let channel = json!({
        "permission_overwrites": [
            {"id": GUILD, "type": 0, "allow": "0", "deny": capability::SEND_MESSAGES.to_string()},
        ],
    });
    let base = capability::VIEW_CHANNEL | capability::SEND_MESSAGES;
    let mask = channel_mask(&guild(base, 0), &channel, BOT, &[]);
    assert_eq!(mask, capability::VIEW_CHANNEL);
}

// ============================================================================
// SECTION: URL Helpers
// ============================================================================

#[test]
fn history_query_includes_cursor_when_present() {
    let query = MessageQuery {
        limit: 25,
        before: Some("42".to_string()),
        ..MessageQuery::default()
    };
    assert_eq!(history_query(&query), "?limit=25&before=42");
}

#[test]
fn percent_encode_escapes_unicode_emoji() {
    assert_eq!(percent_encode("👍"), "%F0%9F%91%8D");
    assert_eq!(percent_encode("party:123"), "party:123");
}

#[test]
fn fetch_url_trims_trailing_slash_from_base() {
    let client = client(config());
    let url = client
        .fetch_url(&EntityRef::Channel {
            channel_id: "5".to_string(),
        })
        .unwrap();
    assert_eq!(url, "http://127.0.0.1:9/api/v10/channels/5");
}

// ============================================================================
// SECTION: Local Guards
// ============================================================================

#[tokio::test]
async fn fetch_fails_when_not_connected() {
    let client = DiscordClient::from_config(&config()).unwrap();
    assert!(!client.is_connected());
    let err = client.fetch(&EntityRef::CurrentUser).await.unwrap_err();
    assert_eq!(err, ServiceError::NotConnected);
}

#[tokio::test]
async fn guild_outside_allow_list_is_rejected() {
    let client = client(DiscordConfig {
        allowed_guilds: vec!["555".to_string()],
        ..config()
    });
    let err = client
        .fetch(&EntityRef::GuildRoles {
            guild_id: GUILD.to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::GuildNotAllowed(GUILD.to_string()));
}

#[tokio::test]
async fn overlong_content_is_rejected_before_sending() {
    let client = client(DiscordConfig {
        max_message_length: 5,
        ..config()
    });
    let entity = EntityRef::ChannelMessages {
        channel_id: "5".to_string(),
        query: MessageQuery::default(),
    };
    let err = client
        .mutate(&entity, MutationOp::Create, json!({"content": "too long"}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::ContentTooLong {
            max: 5
        }
    );
}

#[tokio::test]
async fn exhausted_budget_reports_rate_limited() {
    let client = client(DiscordConfig {
        rate_limit_per_minute: 1,
        ..config()
    });
    assert!(client.limiter.try_acquire());
    let err = client
        .fetch(&EntityRef::Channel {
            channel_id: "5".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::RateLimited);
}

#[tokio::test]
async fn unsupported_mutation_is_rejected() {
    let client = client(config());
    let err = client.mutate(&EntityRef::CurrentUser, MutationOp::Update, Value::Null).await;
    assert!(matches!(err, Err(ServiceError::Unsupported(_))));
}

#[tokio::test]
async fn capability_lookups_do_not_consume_the_budget() {
    let client = client(DiscordConfig {
        rate_limit_per_minute: 1,
        ..config()
    });
    assert!(client.limiter.try_acquire());
    // The budget is spent, so only an exempt lookup reaches the transport.
    let err = client.capability_grants(BOT, &Scope::Channel("5".to_string())).await.unwrap_err();
    assert!(matches!(err, ServiceError::Transport(_)), "unexpected error: {err}");
}

// ============================================================================
// SECTION: Response Decoding
// ============================================================================

#[test]
fn non_json_error_page_keeps_status_mapping() {
    let html = b"<html><body>Bad Gateway</body></html>";
    let err = decode_response(StatusCode::BAD_GATEWAY, html).unwrap_err();
    match err {
        ServiceError::Transport(message) => assert!(message.starts_with("HTTP 502")),
        other => panic!("unexpected error: {other}"),
    }
    let err = decode_response(StatusCode::NOT_FOUND, html).unwrap_err();
    assert!(matches!(err, ServiceError::RemoteNotFound(_)));
    let err = decode_response(StatusCode::FORBIDDEN, b"").unwrap_err();
    assert!(matches!(err, ServiceError::RemoteForbidden(_)));
}

#[test]
fn json_error_body_supplies_the_message() {
    let body = br#"{"message": "Missing Access", "code": 50001}"#;
    let err = decode_response(StatusCode::FORBIDDEN, body).unwrap_err();
    assert_eq!(err, ServiceError::RemoteForbidden("Missing Access".to_string()));
    let err = decode_response(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
    assert_eq!(err, ServiceError::RateLimited);
}

#[test]
fn success_bodies_decode_or_fail_as_decode_errors() {
    assert_eq!(decode_response(StatusCode::NO_CONTENT, b"").unwrap(), Value::Null);
    assert_eq!(decode_response(StatusCode::OK, br#"{"id": "1"}"#).unwrap(), json!({"id": "1"}));
    let err = decode_response(StatusCode::OK, b"<html>").unwrap_err();
    assert!(matches!(err, ServiceError::Decode(_)));
}
