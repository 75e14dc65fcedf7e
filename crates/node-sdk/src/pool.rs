//! Registry of nodes with least-loaded selection.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use ember_domain::config::ClientConfig;
use ember_domain::error::{Error, Result};
use parking_lot::RwLock;

use crate::builder::{random_identifier, NodeBuilder};
use crate::dispatch::EntityHandler;
use crate::node::Node;

type NodeMap = RwLock<HashMap<String, Node>>;

/// Thread-safe pool of nodes keyed by identifier.
///
/// Destroying a node (directly or through the pool) removes it from the
/// pool that owns it.
#[derive(Clone, Default)]
pub struct NodePool {
    nodes: Arc<NodeMap>,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (but do not connect) every node listed in `cfg`.
    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        let pool = Self::new();
        for node in &cfg.nodes {
            pool.create_node(NodeBuilder::from_config(
                cfg.user_id.clone(),
                cfg.client_name.clone(),
                node,
            ))?;
        }
        Ok(pool)
    }

    /// Build a node and add it. Without an explicit identifier the first
    /// node becomes `MAIN` and later ones get a random one.
    pub fn create_node(&self, mut builder: NodeBuilder) -> Result<Node> {
        if !builder.identifier_is_set() {
            let id = if self.is_empty() {
                "MAIN".to_owned()
            } else {
                random_identifier()
            };
            builder = builder.identifier(id);
        }
        if let Some(ref id) = builder.config.identifier {
            if self.nodes.read().contains_key(id) {
                return Err(Error::NodeConflict(id.clone()));
            }
        }
        let node = builder.build()?;
        self.add_node(node.clone())?;
        Ok(node)
    }

    pub fn add_node(&self, node: Node) -> Result<()> {
        let id = node.identifier().to_owned();
        {
            let mut nodes = self.nodes.write();
            if nodes.contains_key(&id) {
                return Err(Error::NodeConflict(id));
            }
            nodes.insert(id.clone(), node.clone());
        }
        inject_cleanup(&node, Arc::downgrade(&self.nodes));
        tracing::info!(node_id = %id, pool_size = self.len(), "node added to pool");
        Ok(())
    }

    /// Pick a node.
    ///
    /// With an identifier, that exact node. Otherwise the node with the
    /// fewest entities, optionally restricted to `region`; ties go to the
    /// lower stats penalty.
    pub fn get_node(&self, identifier: Option<&str>, region: Option<&str>) -> Result<Node> {
        let nodes = self.nodes.read();
        if nodes.is_empty() {
            return Err(Error::NoAvailableNodes);
        }
        let no_match = || Error::NoMatchingNodes {
            identifier: identifier.map(str::to_owned),
            region: region.map(str::to_owned),
        };

        if let Some(id) = identifier {
            return nodes.get(id).cloned().ok_or_else(no_match);
        }

        nodes
            .values()
            .filter(|n| region.is_none() || n.region().as_deref() == region)
            .min_by(|a, b| {
                a.entity_count()
                    .cmp(&b.entity_count())
                    .then_with(|| a.penalty().total_cmp(&b.penalty()))
                    .then_with(|| a.identifier().cmp(b.identifier()))
            })
            .cloned()
            .ok_or_else(no_match)
    }

    /// Find the node that has `guild_id` registered.
    pub fn find_entity(&self, guild_id: u64) -> Result<(Node, Arc<dyn EntityHandler>)> {
        self.nodes
            .read()
            .values()
            .find_map(|n| n.entity(guild_id).ok().map(|h| (n.clone(), h)))
            .ok_or(Error::EntityNotFound(guild_id))
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    /// Connect every node, collecting failures by identifier.
    pub async fn connect_all(&self) -> Vec<(String, Error)> {
        let mut failures = Vec::new();
        for node in self.nodes() {
            if let Err(e) = node.connect().await {
                failures.push((node.identifier().to_owned(), e));
            }
        }
        failures
    }

    pub async fn destroy_node(&self, identifier: &str) -> Result<()> {
        let node = self.get_node(Some(identifier), None)?;
        node.destroy().await;
        Ok(())
    }

    /// Destroy every node and empty the pool.
    pub async fn destroy_all(&self) {
        for node in self.nodes() {
            node.destroy().await;
        }
        self.nodes.write().clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

fn inject_cleanup(node: &Node, pool: Weak<NodeMap>) {
    let id = node.identifier().to_owned();
    node.session().on_destroy(move || {
        if let Some(nodes) = pool.upgrade() {
            if nodes.write().remove(&id).is_some() {
                tracing::info!(node_id = %id, "node removed from pool");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ember_protocol::{NodeEvent, PlayerState};

    struct Noop;

    #[async_trait]
    impl EntityHandler for Noop {
        async fn on_state_update(&self, _state: &PlayerState) {}
        async fn on_event(&self, _event: &NodeEvent) {}
    }

    fn builder() -> NodeBuilder {
        NodeBuilder::new().user_id("1")
    }

    #[tokio::test]
    async fn first_node_is_main_then_random() {
        let pool = NodePool::new();
        let a = pool.create_node(builder()).unwrap();
        let b = pool.create_node(builder()).unwrap();
        assert_eq!(a.identifier(), "MAIN");
        assert_ne!(b.identifier(), "MAIN");
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_identifier_conflicts() {
        let pool = NodePool::new();
        pool.create_node(builder().identifier("X")).unwrap();
        let err = pool.create_node(builder().identifier("X")).unwrap_err();
        assert!(matches!(err, Error::NodeConflict(id) if id == "X"));
    }

    #[tokio::test]
    async fn empty_pool_has_no_available_nodes() {
        let pool = NodePool::new();
        assert!(matches!(pool.get_node(None, None), Err(Error::NoAvailableNodes)));
    }

    #[tokio::test]
    async fn selection_by_load_and_region() {
        let pool = NodePool::new();
        let us = pool.create_node(builder().identifier("US").region("us")).unwrap();
        let eu = pool.create_node(builder().identifier("EU").region("eu")).unwrap();

        us.register_entity(1, Arc::new(Noop));
        assert_eq!(pool.get_node(None, None).unwrap().identifier(), "EU");

        eu.register_entity(2, Arc::new(Noop));
        eu.register_entity(3, Arc::new(Noop));
        assert_eq!(pool.get_node(None, None).unwrap().identifier(), "US");
        assert_eq!(pool.get_node(None, Some("eu")).unwrap().identifier(), "EU");

        assert!(matches!(
            pool.get_node(None, Some("asia")),
            Err(Error::NoMatchingNodes { .. })
        ));
        assert!(matches!(
            pool.get_node(Some("nope"), None),
            Err(Error::NoMatchingNodes { .. })
        ));

        let (node, _) = pool.find_entity(3).unwrap();
        assert_eq!(node.identifier(), "EU");
        assert!(matches!(pool.find_entity(99), Err(Error::EntityNotFound(99))));
    }

    #[tokio::test]
    async fn destroying_a_node_detaches_it() {
        let pool = NodePool::new();
        let node = pool.create_node(builder()).unwrap();
        pool.create_node(builder()).unwrap();

        node.destroy().await;
        node.destroy().await;
        assert_eq!(pool.len(), 1);
        assert!(pool.get_node(Some("MAIN"), None).is_err());

        pool.destroy_all().await;
        assert!(pool.is_empty());
    }
}
