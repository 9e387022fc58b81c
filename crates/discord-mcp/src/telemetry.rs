// crates/discord-mcp/src/telemetry.rs
// ============================================================================
// Module: MCP Telemetry
// Description: Observability hooks for the stdio session.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A thin metrics interface for request counters and latency histograms.
//! Deployments can plug in a real exporter behind [`McpMetrics`]; the default
//! [`NoopMetrics`] discards everything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for MCP request histograms.
pub const MCP_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// MCP request method classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum McpMethod {
    /// JSON-RPC initialize.
    #[serde(rename = "initialize")]
    Initialize,
    /// JSON-RPC tools/list.
    #[serde(rename = "tools/list")]
    ToolsList,
    /// JSON-RPC tools/call.
    #[serde(rename = "tools/call")]
    ToolsCall,
    /// JSON-RPC ping.
    #[serde(rename = "ping")]
    Ping,
    /// Invalid or malformed JSON-RPC request.
    #[serde(rename = "invalid")]
    Invalid,
    /// Unsupported JSON-RPC method.
    #[serde(rename = "other")]
    Other,
}

impl McpMethod {
    /// Classifies a method name.
    #[must_use]
    pub fn classify(method: &str) -> Self {
        match method {
            "initialize" => Self::Initialize,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            "ping" => Self::Ping,
            _ => Self::Other,
        }
    }

    /// Returns a stable label for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Ping => "ping",
            Self::Invalid => "invalid",
            Self::Other => "other",
        }
    }
}

/// MCP request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum McpOutcome {
    /// Successful response.
    Success,
    /// JSON-RPC error response.
    Error,
}

impl McpOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// MCP request metric event payload.
#[derive(Debug, Clone)]
pub struct McpMetricEvent {
    /// JSON-RPC method classification.
    pub method: McpMethod,
    /// Tool name when available (tools/call).
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: McpOutcome,
    /// JSON-RPC error code when present.
    pub error_code: Option<i64>,
    /// Request line size in bytes.
    pub request_bytes: usize,
    /// Response line size in bytes.
    pub response_bytes: usize,
}

/// Returns the upper bound of the bucket holding `latency`, or `None` when it
/// exceeds the largest bucket.
#[must_use]
pub fn latency_bucket(latency: Duration) -> Option<u64> {
    let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    MCP_LATENCY_BUCKETS_MS.iter().copied().find(|bound| millis <= *bound)
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for MCP requests and latencies.
pub trait McpMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: McpMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: McpMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl McpMetrics for NoopMetrics {
    fn record_request(&self, _event: McpMetricEvent) {}

    fn record_latency(&self, _event: McpMetricEvent, _latency: Duration) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
