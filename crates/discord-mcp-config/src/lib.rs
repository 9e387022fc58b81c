// crates/discord-mcp-config/src/lib.rs
// ============================================================================
// Module: Discord MCP Config Library
// Description: Canonical config model, environment overrides, and validation.
// Purpose: Single source of truth for discord-mcp.toml semantics.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! `discord-mcp-config` defines the configuration model for the Discord MCP
//! server. It provides strict, fail-closed validation and a deterministic
//! override order: file, then environment, then validation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
