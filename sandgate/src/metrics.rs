//! Observability metrics
//!
//! Prometheus-compatible counters and gauges for:
//! - Capability invocations (count, outcome, latency)
//! - SSE sessions (active, opened)
//! - Protocol requests per method and transport

use std::time::Duration;

/// Record a finished capability invocation
pub fn record_tool_call(tool: &str, ok: bool, duration: Duration) {
    metrics::counter!(
        "sandgate_tool_calls_total",
        "tool" => tool.to_string(),
        "outcome" => if ok { "ok" } else { "error" },
    )
    .increment(1);

    metrics::histogram!(
        "sandgate_tool_call_duration_seconds",
        "tool" => tool.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a session being opened
pub fn record_session_opened() {
    metrics::counter!("sandgate_sessions_opened_total").increment(1);
}

/// Update the number of live sessions
pub fn set_active_sessions(count: usize) {
    metrics::gauge!("sandgate_sessions_active").set(count as f64);
}

/// Record an inbound protocol request
pub fn record_rpc_request(method: &str, transport: &'static str) {
    metrics::counter!(
        "sandgate_rpc_requests_total",
        "method" => method.to_string(),
        "transport" => transport,
    )
    .increment(1);
}

/// Record a response that could not be delivered to its session
pub fn record_dropped_delivery() {
    metrics::counter!("sandgate_dropped_deliveries_total").increment(1);
}
