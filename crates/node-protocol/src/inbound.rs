//! Inbound frame classification.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{EventKind, NodeEvent};
use crate::snowflake;
use crate::stats::NodeStats;

/// Top-level discriminator of every inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Stats,
    /// `playerUpdate`, also sent as `update` by older nodes.
    PlayerUpdate,
    Event,
}

impl OpCode {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "stats" => Some(OpCode::Stats),
            "playerUpdate" | "update" => Some(OpCode::PlayerUpdate),
            "event" => Some(OpCode::Event),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::Stats => "stats",
            OpCode::PlayerUpdate => "playerUpdate",
            OpCode::Event => "event",
        }
    }
}

/// A successfully classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Stats(NodeStats),
    PlayerUpdate(PlayerUpdate),
    Event(NodeEvent),
}

/// Position report for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerUpdate {
    pub guild_id: u64,
    pub state: PlayerState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Node wall clock, unix milliseconds.
    pub time: i64,
    /// Playback position in milliseconds.
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub connected: Option<bool>,
}

impl PlayerState {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.time).single()
    }

    pub fn position(&self) -> Option<Duration> {
        self.position.map(Duration::from_millis)
    }
}

/// Why a frame could not be classified. Always logged and dropped.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Malformed(serde_json::Error),
    #[error("frame has no op code")]
    MissingOp,
    #[error("unknown op code {0:?}")]
    UnknownOp(String),
    #[error("{op} frame has no usable guildId")]
    MissingEntity { op: &'static str },
    #[error("unknown event type {0:?}")]
    UnknownEvent(Option<String>),
    #[error("invalid {op} payload: {error}")]
    Payload {
        op: &'static str,
        error: serde_json::Error,
    },
}

/// Decode one text frame.
///
/// Unrecognised keys anywhere in the payload are ignored, so extra fields
/// never change how a frame is routed.
pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let op = value
        .get("op")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingOp)?;
    let code = OpCode::parse(op).ok_or_else(|| DecodeError::UnknownOp(op.to_owned()))?;

    match code {
        OpCode::Stats => serde_json::from_value(value)
            .map(Inbound::Stats)
            .map_err(|error| DecodeError::Payload { op: "stats", error }),

        OpCode::PlayerUpdate => {
            let guild_id = entity_id(&value, "playerUpdate")?;
            let state = value.get("state").cloned().unwrap_or(Value::Null);
            let state = serde_json::from_value(state).map_err(|error| DecodeError::Payload {
                op: "playerUpdate",
                error,
            })?;
            Ok(Inbound::PlayerUpdate(PlayerUpdate { guild_id, state }))
        }

        OpCode::Event => {
            let guild_id = entity_id(&value, "event")?;
            let event_type = value.get("type").and_then(Value::as_str).map(str::to_owned);
            let kind: EventKind = serde_json::from_value(value)
                .map_err(|error| DecodeError::Payload { op: "event", error })?;
            if kind == EventKind::Unknown {
                return Err(DecodeError::UnknownEvent(event_type));
            }
            Ok(Inbound::Event(NodeEvent { guild_id, kind }))
        }
    }
}

fn entity_id(value: &Value, op: &'static str) -> Result<u64, DecodeError> {
    value
        .get("guildId")
        .and_then(snowflake::from_value)
        .ok_or(DecodeError::MissingEntity { op })
}
