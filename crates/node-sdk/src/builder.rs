//! Builder pattern for constructing a [`Node`].

use std::sync::Arc;
use std::time::Duration;

use ember_domain::config::{NodeConfig, RestConfig};
use ember_domain::error::{Error, Result};

use crate::dispatch::Dispatcher;
use crate::node::Node;
use crate::reconnect::ReconnectBackoff;
use crate::rest::RestClient;
use crate::session::SessionManager;
use crate::transport::HandshakeConfig;
use crate::types::NodeIdentity;

/// `Client-Name` sent when none is configured.
pub const DEFAULT_CLIENT_NAME: &str = concat!("ember/", env!("CARGO_PKG_VERSION"));

/// Fluent builder for [`Node`].
///
/// # Example
///
/// ```rust,no_run
/// # use ember_node::NodeBuilder;
/// let node = NodeBuilder::new()
///     .user_id("81384788765712384")
///     .host("127.0.0.1")
///     .port(2333)
///     .password("youshallnotpass")
///     .resume(true)
///     .build()
///     .unwrap();
/// ```
pub struct NodeBuilder {
    pub(crate) config: NodeConfig,
    pub(crate) user_id: String,
    pub(crate) client_name: Option<String>,
    pub(crate) reconnect_backoff: Option<ReconnectBackoff>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            user_id: String::new(),
            client_name: None,
            reconnect_backoff: None,
        }
    }

    /// Start from a parsed config entry.
    pub fn from_config(user_id: impl Into<String>, client_name: Option<String>, cfg: &NodeConfig) -> Self {
        Self {
            config: cfg.clone(),
            user_id: user_id.into(),
            client_name,
            reconnect_backoff: None,
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.config.identifier = Some(id.into());
        self
    }

    pub(crate) fn identifier_is_set(&self) -> bool {
        self.config.identifier.is_some()
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = id.into();
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    // ── Address ──────────────────────────────────────────────────────

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Present a resume key so the node can hand back dropped sessions.
    pub fn resume(mut self, resume: bool) -> Self {
        self.config.resume = resume;
        self
    }

    pub fn resume_timeout(mut self, d: Duration) -> Self {
        self.config.resume_timeout_secs = d.as_secs();
        self
    }

    /// Override the heartbeat interval (default 30s).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.config.heartbeat_secs = d.as_secs().max(1);
        self
    }

    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.config.connect_timeout_ms = d.as_millis() as u64;
        self
    }

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.reconnect_backoff = Some(backoff);
        self
    }

    pub fn rest(mut self, rest: RestConfig) -> Self {
        self.config.rest = rest;
        self
    }

    /// Build the [`Node`]. Nothing is connected yet.
    pub fn build(self) -> Result<Node> {
        if self.user_id.is_empty() {
            return Err(Error::Config("user_id is required".into()));
        }
        if self.config.host.is_empty() {
            return Err(Error::Config("host is required".into()));
        }

        let identifier = self
            .config
            .identifier
            .clone()
            .unwrap_or_else(random_identifier);
        let identity = NodeIdentity::new(identifier.clone(), &self.config);

        let handshake = HandshakeConfig {
            node_id: identifier.clone(),
            url: identity.ws_url(),
            user_id: self.user_id,
            client_name: self
                .client_name
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_owned()),
            password: identity.password().map(str::to_owned),
            heartbeat: Duration::from_secs(self.config.heartbeat_secs.max(1)),
            connect_timeout: Duration::from_millis(self.config.connect_timeout_ms),
        };

        let backoff = self
            .reconnect_backoff
            .unwrap_or_else(|| ReconnectBackoff::from(&self.config.reconnect))
            .seeded(&identifier);

        let dispatcher = Arc::new(Dispatcher::new(identifier.clone()));
        let session = SessionManager::new(
            handshake,
            backoff,
            self.config.resume,
            self.config.resume_timeout_secs,
            dispatcher.clone(),
        );
        let rest = RestClient::new(
            identifier,
            &identity.http_url(),
            identity.password().map(str::to_owned),
            &self.config.rest,
        )?;

        Ok(Node::from_parts(identity, session, rest, dispatcher))
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 16 random hex characters.
pub(crate) fn random_identifier() -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(16);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionState;

    #[test]
    fn build_requires_user_id() {
        let err = NodeBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn build_from_config() {
        let cfg = NodeConfig {
            identifier: Some("EU".into()),
            host: "lava.example".into(),
            port: 2444,
            region: Some("eu".into()),
            resume: true,
            ..Default::default()
        };
        let node = NodeBuilder::from_config("1", None, &cfg).build().unwrap();
        assert_eq!(node.identifier(), "EU");
        assert_eq!(node.region().as_deref(), Some("eu"));
        assert_eq!(node.rest().base_url(), "http://lava.example:2444");
        assert!(node.session().resume_key().is_some());
        assert_eq!(node.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn missing_identifier_is_random() {
        let a = NodeBuilder::new().user_id("1").build().unwrap();
        let b = NodeBuilder::new().user_id("1").build().unwrap();
        assert_eq!(a.identifier().len(), 16);
        assert_ne!(a.identifier(), b.identifier());
    }

    #[test]
    fn default_client_name_has_version() {
        assert!(DEFAULT_CLIENT_NAME.starts_with("ember/"));
    }
}
