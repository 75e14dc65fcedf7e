mod node;
mod rest;

pub use node::*;
pub use rest::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identity presented in the `User-Id` handshake header (the bot user id).
    #[serde(default)]
    pub user_id: String,
    /// Overrides the `Client-Name` handshake header.
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            client_name: None,
            nodes: vec![NodeConfig::default()],
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ClientConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.user_id.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "user_id".into(),
                message: "user_id must not be empty".into(),
            });
        } else if self.user_id.parse::<u64>().is_err() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "user_id".into(),
                message: "user_id is usually the numeric bot user id".into(),
            });
        }

        if self.nodes.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "nodes".into(),
                message: "no nodes configured".into(),
            });
        }

        let mut seen = HashSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(id) = &node.identifier {
                if !seen.insert(id.as_str()) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("nodes[{i}].identifier"),
                        message: format!("duplicate node identifier {id:?}"),
                    });
                }
            }
            errors.extend(node.validate(&format!("nodes[{i}]")));
        }

        errors
    }

    /// Whether any issue returned by [`validate`](Self::validate) is fatal.
    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|e| e.severity == ConfigSeverity::Error)
    }
}
