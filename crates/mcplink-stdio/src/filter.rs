//! Log filter for pipes shared between JSON-RPC and process noise.
//!
//! Child MCP servers routinely print build output, progress lines, and
//! warnings on the same stdout pipe that carries the protocol. The filter
//! admits a record only when it is a structurally valid JSON-RPC 2.0
//! object; everything else is dropped with a trace log.

use tracing::trace;

/// Returns `true` when `line` is a structurally valid JSON-RPC 2.0 record.
///
/// The rules, applied in order:
/// 1. trim whitespace, reject if empty;
/// 2. must parse as JSON;
/// 3. top level must be an object with `"jsonrpc": "2.0"`;
/// 4. must carry `method` (request/notification), `result`, or `error`
///    (response).
///
/// The original bytes are what gets admitted; this function only judges.
pub fn is_json_rpc(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return false;
    };

    let Some(object) = value.as_object() else {
        return false;
    };

    if object.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return false;
    }

    object.contains_key("method") || object.contains_key("result") || object.contains_key("error")
}

/// A configurable admission filter over newline-delimited records.
#[derive(Debug, Clone)]
pub struct LogFilter {
    enabled: bool,
}

impl LogFilter {
    /// Filter that enforces the JSON-RPC admission rule.
    pub const fn new() -> Self {
        Self { enabled: true }
    }

    /// Filter in pass-through mode: every record is admitted verbatim.
    pub const fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Whether the admission rule is active.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Judge one record. Admitted records are forwarded verbatim by the
    /// caller; rejected ones are logged at trace level and dropped.
    pub fn admit(&self, line: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let admitted = is_json_rpc(line);
        if !admitted {
            trace!(record = %line.chars().take(120).collect::<String>(), "Filtered non-JSON-RPC record");
        }
        admitted
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self::new()
    }
}
