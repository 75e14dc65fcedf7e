use serde::Serialize;

/// Structured trace events emitted across all Ember crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    NodeConnected {
        node_id: String,
        resumed: bool,
    },
    NodeDisconnected {
        node_id: String,
        reason: String,
    },
    ReconnectScheduled {
        node_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    /// The node reported an internal error and the connection was
    /// abandoned without retry.
    NodeFatal {
        node_id: String,
        reason: String,
    },
    RestCall {
        node_id: String,
        endpoint: String,
        status: u16,
        attempt: u32,
        duration_ms: u64,
    },
    TracksLoaded {
        node_id: String,
        load_type: String,
        tracks: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        match self {
            TraceEvent::NodeFatal { .. } => {
                tracing::error!(trace_event = %json, "ember_event");
            }
            TraceEvent::RestCall { .. } | TraceEvent::TracksLoaded { .. } => {
                tracing::debug!(trace_event = %json, "ember_event");
            }
            _ => tracing::info!(trace_event = %json, "ember_event"),
        }
    }
}
