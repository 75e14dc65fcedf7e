//! Typed playback events (`op: "event"`).

use ember_domain::Severity;
use serde::{Deserialize, Serialize};

/// An event routed to one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEvent {
    pub guild_id: u64,
    pub kind: EventKind,
}

impl NodeEvent {
    /// Short snake_case name, e.g. `track_end`.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Event sub-types, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        #[serde(alias = "encodedTrack")]
        track: String,
    },
    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        #[serde(alias = "encodedTrack")]
        track: String,
        reason: TrackEndReason,
    },
    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(alias = "encodedTrack")]
        track: String,
        exception: TrackException,
    },
    #[serde(rename = "TrackStuckEvent")]
    TrackStuck {
        #[serde(alias = "encodedTrack")]
        track: String,
        #[serde(rename = "thresholdMs")]
        threshold_ms: u64,
    },
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed {
        code: u16,
        #[serde(default)]
        reason: String,
        #[serde(default, rename = "byRemote")]
        by_remote: bool,
    },
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::TrackStart { .. } => "track_start",
            EventKind::TrackEnd { .. } => "track_end",
            EventKind::TrackException { .. } => "track_exception",
            EventKind::TrackStuck { .. } => "track_stuck",
            EventKind::WebSocketClosed { .. } => "websocket_closed",
            EventKind::Unknown => "unknown",
        }
    }

    /// Base64 id of the track the event concerns, if any.
    pub fn track_id(&self) -> Option<&str> {
        match self {
            EventKind::TrackStart { track }
            | EventKind::TrackEnd { track, .. }
            | EventKind::TrackException { track, .. }
            | EventKind::TrackStuck { track, .. } => Some(track),
            EventKind::WebSocketClosed { .. } | EventKind::Unknown => None,
        }
    }
}

/// Why a track stopped playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    #[serde(alias = "finished")]
    Finished,
    #[serde(alias = "loadFailed", alias = "load_failed")]
    LoadFailed,
    #[serde(alias = "stopped")]
    Stopped,
    #[serde(alias = "replaced")]
    Replaced,
    #[serde(alias = "cleanup")]
    Cleanup,
}

impl TrackEndReason {
    /// Whether a player may auto-advance to the next queued track.
    ///
    /// Only a natural finish or a load failure hands control back to the
    /// queue; a stop, replacement or cleanup was caused by the caller.
    pub fn may_start_next(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

/// Payload of a `TrackExceptionEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackException {
    #[serde(default)]
    pub message: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub cause: String,
}
