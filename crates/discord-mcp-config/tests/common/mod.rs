// crates/discord-mcp-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for discord-mcp-config.
// ============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use discord_mcp_config::ConfigError;
use discord_mcp_config::DiscordMcpConfig;

/// Test result alias used across suites.
pub type TestResult = Result<(), String>;

/// Parses a TOML string into a `DiscordMcpConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<DiscordMcpConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a config with defaults and a syntactically valid token.
pub fn minimal_config() -> Result<DiscordMcpConfig, toml::de::Error> {
    config_from_toml("[discord]\ntoken = \"test-token\"\n")
}

/// Environment lookup that never returns a value.
pub fn no_env(_name: &str) -> Option<String> {
    None
}

/// Asserts a validation result failed with a message containing `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}
