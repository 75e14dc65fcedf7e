//! Node protocol: the JSON frames exchanged over the control WebSocket and
//! the payloads returned by the node's REST endpoints.
//!
//! Inbound frames are decoded through [`decode`], which classifies by op
//! code into a closed [`Inbound`] enum. Anything it cannot classify comes
//! back as a [`DecodeError`] that the caller logs and drops.

pub mod event;
pub mod inbound;
pub mod load;
pub mod outbound;
pub mod stats;

mod snowflake;

pub use event::{EventKind, NodeEvent, TrackEndReason, TrackException};
pub use inbound::{decode, DecodeError, Inbound, OpCode, PlayerState, PlayerUpdate};
pub use load::{LoadException, LoadTracksResponse, LoadType, PlaylistInfo, RawTrack, TrackInfo};
pub use outbound::OutboundCommand;
pub use stats::{CpuStats, FrameStats, MemoryStats, NodeStats};

/// WebSocket close code a node sends when it hit an internal error.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
