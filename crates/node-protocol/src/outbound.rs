//! Outbound control commands, tagged by `op`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::snowflake;

/// A command sent to the node over the control socket.
///
/// Every entity-scoped command carries the entity id as a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundCommand {
    Play {
        #[serde(with = "snowflake")]
        guild_id: u64,
        track: String,
        start_time: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        volume: Option<u16>,
        no_replace: bool,
        pause: bool,
    },
    Stop {
        #[serde(with = "snowflake")]
        guild_id: u64,
    },
    Pause {
        #[serde(with = "snowflake")]
        guild_id: u64,
        pause: bool,
    },
    Seek {
        #[serde(with = "snowflake")]
        guild_id: u64,
        position: u64,
    },
    Volume {
        #[serde(with = "snowflake")]
        guild_id: u64,
        volume: u16,
    },
    Destroy {
        #[serde(with = "snowflake")]
        guild_id: u64,
    },
    VoiceUpdate {
        #[serde(with = "snowflake")]
        guild_id: u64,
        session_id: String,
        event: Value,
    },
    ConfigureResuming {
        key: String,
        timeout: u64,
    },
    Filters {
        #[serde(with = "snowflake")]
        guild_id: u64,
        #[serde(flatten)]
        filters: Map<String, Value>,
    },
}

impl OutboundCommand {
    /// The wire `op` string.
    pub fn op(&self) -> &'static str {
        match self {
            OutboundCommand::Play { .. } => "play",
            OutboundCommand::Stop { .. } => "stop",
            OutboundCommand::Pause { .. } => "pause",
            OutboundCommand::Seek { .. } => "seek",
            OutboundCommand::Volume { .. } => "volume",
            OutboundCommand::Destroy { .. } => "destroy",
            OutboundCommand::VoiceUpdate { .. } => "voiceUpdate",
            OutboundCommand::ConfigureResuming { .. } => "configureResuming",
            OutboundCommand::Filters { .. } => "filters",
        }
    }

    pub fn guild_id(&self) -> Option<u64> {
        match self {
            OutboundCommand::Play { guild_id, .. }
            | OutboundCommand::Stop { guild_id }
            | OutboundCommand::Pause { guild_id, .. }
            | OutboundCommand::Seek { guild_id, .. }
            | OutboundCommand::Volume { guild_id, .. }
            | OutboundCommand::Destroy { guild_id }
            | OutboundCommand::VoiceUpdate { guild_id, .. }
            | OutboundCommand::Filters { guild_id, .. } => Some(*guild_id),
            OutboundCommand::ConfigureResuming { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(cmd: &OutboundCommand) -> Value {
        serde_json::to_value(cmd).unwrap()
    }

    #[test]
    fn play_omits_unset_optionals() {
        let cmd = OutboundCommand::Play {
            guild_id: 123,
            track: "QAAA".into(),
            start_time: 0,
            end_time: None,
            volume: None,
            no_replace: true,
            pause: false,
        };
        assert_eq!(
            wire(&cmd),
            json!({
                "op": "play",
                "guildId": "123",
                "track": "QAAA",
                "startTime": 0,
                "noReplace": true,
                "pause": false
            })
        );
        assert_eq!(cmd.op(), "play");
        assert_eq!(cmd.guild_id(), Some(123));
    }

    #[test]
    fn voice_update_shape() {
        let cmd = OutboundCommand::VoiceUpdate {
            guild_id: 9,
            session_id: "abc".into(),
            event: json!({ "token": "t", "endpoint": "e" }),
        };
        assert_eq!(
            wire(&cmd),
            json!({
                "op": "voiceUpdate",
                "guildId": "9",
                "sessionId": "abc",
                "event": { "token": "t", "endpoint": "e" }
            })
        );
    }

    #[test]
    fn configure_resuming_has_no_entity() {
        let cmd = OutboundCommand::ConfigureResuming {
            key: "deadbeef".into(),
            timeout: 60,
        };
        assert_eq!(
            wire(&cmd),
            json!({ "op": "configureResuming", "key": "deadbeef", "timeout": 60 })
        );
        assert_eq!(cmd.guild_id(), None);
    }

    #[test]
    fn filters_are_flattened() {
        let mut filters = Map::new();
        filters.insert("volume".into(), json!(0.5));
        filters.insert("timescale".into(), json!({ "speed": 1.2 }));
        let cmd = OutboundCommand::Filters {
            guild_id: 5,
            filters,
        };
        assert_eq!(
            wire(&cmd),
            json!({
                "op": "filters",
                "guildId": "5",
                "volume": 0.5,
                "timescale": { "speed": 1.2 }
            })
        );
    }
}
