use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Serialize)]
pub struct AuditEvent<'a> {
    pub timestamp: i64,
    pub event_type: &'a str,
    pub tool: &'a str,
    pub success: bool,
    pub duration_ms: u64,
    pub details: Value,
}

/// Emit one JSON audit line on the `audit` target.
pub fn log_audit(event_type: &str, tool: &str, success: bool, duration_ms: u64, details: Value) {
    let event = AuditEvent {
        timestamp: chrono::Utc::now().timestamp_millis(),
        event_type,
        tool,
        success,
        duration_ms,
        details,
    };

    // Serialize up front so the subscriber receives the payload as clean JSON.
    if let Ok(json_str) = serde_json::to_string(&event) {
        info!(target: "audit", "{}", json_str);
    }
}
