//! Node identity and connection state.

use std::fmt;

use ember_domain::config::NodeConfig;
use parking_lot::RwLock;

/// Lifecycle of one node connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connection dropped; a resume key is held and reopening is in progress.
    Resuming,
    Closing,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Resuming => "resuming",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a node is and where to reach it.
///
/// Everything but the region is fixed at construction.
#[derive(Debug)]
pub struct NodeIdentity {
    identifier: String,
    host: String,
    port: u16,
    secure: bool,
    password: Option<String>,
    region: RwLock<Option<String>>,
}

impl NodeIdentity {
    pub fn new(identifier: impl Into<String>, cfg: &NodeConfig) -> Self {
        Self {
            identifier: identifier.into(),
            host: cfg.host.clone(),
            port: cfg.port,
            secure: cfg.secure,
            password: cfg.password.clone().filter(|p| !p.is_empty()),
            region: RwLock::new(cfg.region.clone()),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn region(&self) -> Option<String> {
        self.region.read().clone()
    }

    pub fn set_region(&self, region: Option<String>) {
        *self.region.write() = region;
    }

    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    pub fn http_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}
