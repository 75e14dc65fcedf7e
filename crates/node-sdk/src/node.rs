//! A single node: identity, control session, REST client and resolver.

use std::sync::Arc;

use ember_domain::error::{Error, Result};
use ember_domain::Source;
use ember_protocol::{NodeEvent, NodeStats, PlaylistInfo, RawTrack};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::dispatch::{Dispatcher, EntityHandler};
use crate::resolver::{LoadResult, SearchOptions, TrackResolver};
use crate::rest::RestClient;
use crate::session::SessionManager;
use crate::track::{SearchHit, SearchResult, Track};
use crate::types::{ConnectionState, NodeIdentity};

/// Handle to one node. Cheap to clone; clones share all state.
///
/// Create through [`NodeBuilder`](crate::builder::NodeBuilder) or a
/// [`NodePool`](crate::pool::NodePool).
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    identity: NodeIdentity,
    session: SessionManager,
    rest: RestClient,
    resolver: TrackResolver,
    dispatcher: Arc<Dispatcher>,
}

impl Node {
    pub(crate) fn from_parts(
        identity: NodeIdentity,
        session: SessionManager,
        rest: RestClient,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let resolver = TrackResolver::new(identity.identifier(), Arc::new(rest.clone()));
        Self {
            inner: Arc::new(NodeInner {
                identity,
                session,
                rest,
                resolver,
                dispatcher,
            }),
        }
    }

    pub fn builder() -> crate::builder::NodeBuilder {
        crate::builder::NodeBuilder::new()
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn identifier(&self) -> &str {
        self.inner.identity.identifier()
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.inner.identity
    }

    pub fn region(&self) -> Option<String> {
        self.inner.identity.region()
    }

    pub fn set_region(&self, region: Option<String>) {
        self.inner.identity.set_region(region);
    }

    // ── Components ───────────────────────────────────────────────────

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    pub fn resolver(&self) -> &TrackResolver {
        &self.inner.resolver
    }

    // ── Connection ───────────────────────────────────────────────────

    pub async fn connect(&self) -> Result<()> {
        self.inner.session.connect(false).await
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.inner.session.connect(true).await
    }

    pub async fn disconnect(&self, reconnect_after: bool) -> Result<()> {
        self.inner.session.disconnect(reconnect_after).await
    }

    /// Disconnect, drop every entity and detach from the owning pool.
    pub async fn destroy(&self) {
        self.inner.session.destroy().await;
        for id in self.inner.dispatcher.entity_ids() {
            self.inner.dispatcher.unregister(id);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.session.watch_state()
    }

    // ── Observers ────────────────────────────────────────────────────

    pub fn stats(&self) -> Option<NodeStats> {
        self.inner.dispatcher.stats()
    }

    /// Load penalty from the latest stats, `0.0` before the first report.
    pub fn penalty(&self) -> f64 {
        self.stats().map(|s| s.penalty()).unwrap_or(0.0)
    }

    /// Every event routed by this node, after entity handlers ran.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.inner.dispatcher.subscribe()
    }

    // ── Entities ─────────────────────────────────────────────────────

    pub fn register_entity(&self, guild_id: u64, handler: Arc<dyn EntityHandler>) {
        if self.inner.dispatcher.register(guild_id, handler).is_some() {
            tracing::debug!(node_id = %self.identifier(), guild_id, "replaced entity handler");
        }
    }

    pub fn unregister_entity(&self, guild_id: u64) -> Option<Arc<dyn EntityHandler>> {
        self.inner.dispatcher.unregister(guild_id)
    }

    pub fn entity(&self, guild_id: u64) -> Result<Arc<dyn EntityHandler>> {
        self.inner
            .dispatcher
            .entity(guild_id)
            .ok_or(Error::EntityNotFound(guild_id))
    }

    pub fn entity_count(&self) -> usize {
        self.inner.dispatcher.entity_count()
    }

    // ── REST ─────────────────────────────────────────────────────────

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        self.inner.rest.request(method, path, query, body).await
    }

    pub async fn load(&self, query: &str, source: Option<Source>, strict: bool) -> Result<LoadResult> {
        self.inner.resolver.load(query, source, strict).await
    }

    pub async fn load_tracks(
        &self,
        query: &str,
        source: Option<Source>,
        strict: bool,
    ) -> Result<(Option<PlaylistInfo>, Vec<RawTrack>)> {
        self.inner.resolver.load_tracks(query, source, strict).await
    }

    pub async fn search_tracks<M: Clone>(
        &self,
        query: &str,
        opts: &SearchOptions,
        metadata: M,
    ) -> Result<SearchResult<M>> {
        self.inner.resolver.search_tracks(query, opts, metadata).await
    }

    pub async fn search_track<M: Clone>(
        &self,
        query: &str,
        opts: &SearchOptions,
        metadata: M,
    ) -> Result<Option<SearchHit<M>>> {
        self.inner.resolver.search_track(query, opts, metadata).await
    }

    pub async fn fetch_track<M>(&self, id: &str, metadata: M) -> Result<Track<M>> {
        self.inner.resolver.fetch_track(id, metadata).await
    }

    pub async fn fetch_tracks<M: Clone>(&self, ids: &[String], atomic: bool, metadata: M) -> Result<Vec<Track<M>>> {
        self.inner.resolver.fetch_tracks(ids, atomic, metadata).await
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identifier", &self.identifier())
            .field("state", &self.state())
            .finish()
    }
}
