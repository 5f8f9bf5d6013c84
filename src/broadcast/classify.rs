use crate::event_bus::ErrorSeverity;

/// Classifies a delivery failure by keyword families in its message
/// text.
///
/// Transient I/O failures (connection/network/timeout) are High,
/// protocol/client failures (client/websocket/closed) are Medium,
/// resource exhaustion (memory/disk/system) is Critical, and anything
/// unrecognized defaults to Medium. The result is informational: it
/// drives logging and alerting, not the circuit threshold logic.
pub fn classify_failure(message: &str) -> ErrorSeverity {
    let text = message.to_lowercase();
    if contains_any(&text, &["connection", "network", "timeout"]) {
        ErrorSeverity::High
    } else if contains_any(&text, &["client", "websocket", "closed"]) {
        ErrorSeverity::Medium
    } else if contains_any(&text, &["memory", "disk", "system"]) {
        ErrorSeverity::Critical
    } else {
        ErrorSeverity::Medium
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}
