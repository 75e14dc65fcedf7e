//! Routing of decoded inbound frames to node-level state and entities.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ember_protocol::{decode, DecodeError, EventKind, Inbound, NodeEvent, NodeStats, PlayerState};
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Per-entity receiver of routed frames, usually a player.
///
/// Implementations must clear their "currently playing" track when they
/// see a `TrackEnd` event.
#[async_trait]
pub trait EntityHandler: Send + Sync {
    async fn on_state_update(&self, state: &PlayerState);

    async fn on_event(&self, event: &NodeEvent);

    /// Re-establish the voice connection after the voice socket closed.
    /// Awaited before the `WebSocketClosed` event is delivered anywhere.
    async fn reconnect_voice(&self) {}
}

/// Routes frames for one node. Frames are handled in arrival order.
pub struct Dispatcher {
    node_id: String,
    stats: RwLock<Option<NodeStats>>,
    entities: RwLock<HashMap<u64, Arc<dyn EntityHandler>>>,
    events: broadcast::Sender<NodeEvent>,
}

impl Dispatcher {
    pub fn new(node_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            node_id: node_id.into(),
            stats: RwLock::new(None),
            entities: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Decode and route one text frame. Bad frames are logged and dropped.
    pub async fn handle_text(&self, text: &str) {
        match decode(text) {
            Ok(inbound) => self.dispatch(inbound).await,
            Err(e @ DecodeError::UnknownEvent(_)) | Err(e @ DecodeError::UnknownOp(_)) => {
                tracing::debug!(node_id = %self.node_id, error = %e, "ignoring frame");
            }
            Err(e) => {
                tracing::warn!(node_id = %self.node_id, error = %e, "dropping undecodable frame");
            }
        }
    }

    pub async fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::Stats(stats) => {
                tracing::trace!(node_id = %self.node_id, players = stats.players, "stats");
                *self.stats.write() = Some(stats);
            }
            Inbound::PlayerUpdate(update) => {
                if let Some(handler) = self.entity(update.guild_id) {
                    handler.on_state_update(&update.state).await;
                }
            }
            Inbound::Event(event) => {
                // Events for unknown entities are dropped, observers included.
                let Some(handler) = self.entity(event.guild_id) else {
                    tracing::trace!(node_id = %self.node_id, guild_id = event.guild_id, "event for unknown entity");
                    return;
                };
                if let EventKind::WebSocketClosed { code, .. } = &event.kind {
                    tracing::debug!(
                        node_id = %self.node_id,
                        guild_id = event.guild_id,
                        code,
                        "voice socket closed; reconnecting voice"
                    );
                    handler.reconnect_voice().await;
                }
                handler.on_event(&event).await;
                let _ = self.events.send(event);
            }
        }
    }

    // ── Entities ─────────────────────────────────────────────────────

    /// Register a handler, returning the one it replaced.
    pub fn register(&self, guild_id: u64, handler: Arc<dyn EntityHandler>) -> Option<Arc<dyn EntityHandler>> {
        self.entities.write().insert(guild_id, handler)
    }

    pub fn unregister(&self, guild_id: u64) -> Option<Arc<dyn EntityHandler>> {
        self.entities.write().remove(&guild_id)
    }

    pub fn entity(&self, guild_id: u64) -> Option<Arc<dyn EntityHandler>> {
        self.entities.read().get(&guild_id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    pub fn entity_ids(&self) -> Vec<u64> {
        self.entities.read().keys().copied().collect()
    }

    // ── Node-level observers ─────────────────────────────────────────

    pub fn stats(&self) -> Option<NodeStats> {
        self.stats.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }
}
