//! `ember-node` — client-side engine for remote audio nodes.
//!
//! A "node" is a remote audio server reached over a JSON control WebSocket
//! plus a small REST API. This crate keeps that connection alive across
//! network failures, routes inbound frames to per-entity handlers, frames
//! outbound commands and resolves free-text queries into tracks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  NodePool ── get_node(identifier?, region?) ─┐               │
//! │                                             ▼                │
//! │  Node ─┬─ SessionManager ── TransportSession (WS + heartbeat)│
//! │        │        │  receive loop ── Dispatcher ── entities    │
//! │        │        └─ ReconnectBackoff                          │
//! │        ├─ RestClient (bounded retry)                         │
//! │        └─ TrackResolver (source prefix, URL override)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. Upgrade with `User-Id`, `Client-Name`, `Authorization` and, when
//!    resuming is enabled, `Resume-Key`
//! 2. Receive loop: `stats` → node snapshot, `playerUpdate` and `event` →
//!    the entity registered for `guildId`
//! 3. On a dropped connection: reopen with jittered exponential back-off,
//!    forever, then send `configureResuming`
//! 4. On close code 1011 or rejected credentials: stop, no retry

pub mod api;
pub mod builder;
pub mod dispatch;
pub mod node;
pub mod pool;
pub mod reconnect;
pub mod resolver;
pub mod rest;
pub mod session;
pub mod track;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use api::NodeApi;
pub use builder::NodeBuilder;
pub use dispatch::{Dispatcher, EntityHandler};
pub use node::Node;
pub use pool::NodePool;
pub use reconnect::ReconnectBackoff;
pub use resolver::{LoadResult, SearchOptions, TrackResolver};
pub use rest::RestClient;
pub use session::SessionManager;
pub use track::{Playlist, SearchHit, SearchResult, Track};
pub use transport::{CloseReason, Frame, FrameStream, ResumeKey, TransportSession};
pub use types::{ConnectionState, NodeIdentity};

// Re-export the shared types so callers rarely need the lower crates.
pub use ember_domain::{Error, LoadSource, Result, Severity, Source};
pub use ember_protocol::{EventKind, NodeEvent, NodeStats, PlayerState, TrackEndReason};
