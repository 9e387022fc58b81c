// crates/discord-mcp/tests/catalog_schemas.rs
// ============================================================================
// Module: Catalog Schema Tests
// Description: Advertised input schemas checked with a reference validator.
// Purpose: Keep the rendered JSON Schema consistent with native validation.
// Dependencies: discord-mcp, jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Every `inputSchema` must compile as Draft 2020-12, and for a table of
//! payloads the compiled schema must agree with [`Validator`].

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

use discord_mcp::ToolName;
use discord_mcp::Validator;
use discord_mcp::catalog::tool_schema;
use discord_mcp::tools::catalog_definitions;
use jsonschema::Draft;
use serde_json::Value;
use serde_json::json;

/// Test result alias.
type TestResult = Result<(), String>;

fn compile(schema: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| format!("schema failed to compile: {err}"))
}

#[test]
fn every_input_schema_compiles() -> TestResult {
    let definitions = catalog_definitions();
    assert_eq!(definitions.len(), ToolName::all().len());
    for definition in &definitions {
        compile(&definition.input_schema).map_err(|err| format!("{}: {err}", definition.name))?;
        assert_eq!(definition.input_schema["type"], "object");
        assert_eq!(definition.input_schema["additionalProperties"], false);
    }
    Ok(())
}

#[test]
fn reference_validator_agrees_with_native_validator() -> TestResult {
    let long = "x".repeat(2001);
    let cases: Vec<(ToolName, Value, bool)> = vec![
        (ToolName::Ping, json!({}), true),
        (ToolName::Ping, json!({"extra": 1}), false),
        (ToolName::SendMessage, json!({"channel_id": "1", "content": "hi"}), true),
        (ToolName::SendMessage, json!({"channel_id": "1"}), false),
        (ToolName::SendMessage, json!({"channel_id": "1", "content": long}), false),
        (ToolName::SendMessage, json!({"channel_id": "abc", "content": "hi"}), false),
        (
            ToolName::SendMessage,
            json!({"channel_id": "1", "content": "hi", "embeds": [{"color": 16_777_216}]}),
            false,
        ),
        (
            ToolName::SendMessage,
            json!({"channel_id": "1", "content": "hi", "embeds": [{"image": {"url": "https://x"}}]}),
            true,
        ),
        (ToolName::GetChannelMessages, json!({"channel_id": "1", "limit": 5}), true),
        (ToolName::GetChannelMessages, json!({"channel_id": "1", "limit": 2.5}), false),
        (ToolName::GetChannelMessages, json!({"channel_id": "1", "limit": 0}), false),
        (ToolName::GetChannelMessages, json!({"channel_id": "1", "around": "9"}), true),
        (ToolName::GetChannelMessages, json!({"channel_id": "1", "before": "2", "after": "3"}), false),
        (ToolName::EditMessage, json!({"channel_id": "1", "message_id": "2"}), false),
        (ToolName::EditMessage, json!({"channel_id": "1", "message_id": "2", "embeds": []}), true),
        (ToolName::ListChannels, json!({"guild_id": "1", "type_filter": ["text", "voice"]}), true),
        (ToolName::ListChannels, json!({"guild_id": "1", "type_filter": ["text", "text"]}), false),
        (ToolName::ListChannels, json!({"guild_id": "1", "type_filter": ["thread"]}), false),
        (ToolName::CreateRole, json!({"guild_id": "1", "name": ""}), false),
        (ToolName::AssignRole, json!({"guild_id": "1", "role_id": "2", "user_id": "3"}), true),
    ];
    let native = Validator::new();
    for (tool, payload, expected) in cases {
        let schema = tool_schema(tool);
        let reference = compile(&schema.to_json())?;
        let Value::Object(map) = &payload else {
            return Err("payload must be an object".to_string());
        };
        let native_ok = native.validate(&schema, map).is_ok();
        let reference_ok = reference.is_valid(&payload);
        if native_ok != expected || reference_ok != expected {
            return Err(format!(
                "{tool} {payload}: expected {expected}, native {native_ok}, reference {reference_ok}"
            ));
        }
    }
    Ok(())
}
