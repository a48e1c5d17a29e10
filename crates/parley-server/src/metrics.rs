//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound client messages total (counter, labels: type).
pub const WS_MESSAGES_TOTAL: &str = "ws_messages_total";
/// Inbound frames dropped as malformed (counter).
pub const WS_MALFORMED_TOTAL: &str = "ws_malformed_total";
/// Outbound events enqueued total (counter, labels: type).
pub const EVENTS_SENT_TOTAL: &str = "events_sent_total";
/// Outbound events dropped on a full buffer (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
/// Slow or displaced connections evicted total (counter, labels: reason).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// Users currently online (gauge).
pub const USERS_ONLINE: &str = "users_online";
/// Calls started total (counter, labels: call_type).
pub const CALLS_TOTAL: &str = "calls_total";
/// Calls currently active (gauge).
pub const CALLS_ACTIVE: &str = "calls_active";
/// Call duration seconds (histogram).
pub const CALL_DURATION_SECONDS: &str = "call_duration_seconds";
/// Signaling frames relayed total (counter, labels: kind).
pub const SIGNALING_RELAYED_TOTAL: &str = "signaling_relayed_total";
/// Signaling frames dropped because the target was offline (counter).
pub const SIGNALING_DROPPED_TOTAL: &str = "signaling_dropped_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();

        // Should produce valid (possibly empty) Prometheus text.
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_MESSAGES_TOTAL,
            WS_MALFORMED_TOTAL,
            EVENTS_SENT_TOTAL,
            EVENTS_DROPPED_TOTAL,
            WS_EVICTIONS_TOTAL,
            USERS_ONLINE,
            CALLS_TOTAL,
            CALLS_ACTIVE,
            CALL_DURATION_SECONDS,
            SIGNALING_RELAYED_TOTAL,
            SIGNALING_DROPPED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
