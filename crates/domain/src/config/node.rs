use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigSeverity, ReconnectConfig, RestConfig};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Node connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique within a pool. Generated when absent.
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_2333")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    /// Use `wss://` and `https://`.
    #[serde(default)]
    pub secure: bool,
    /// Voice region tag, used only for node selection.
    #[serde(default)]
    pub region: Option<String>,
    /// Present a resume key so the node can hand a dropped session back.
    #[serde(default)]
    pub resume: bool,
    #[serde(default = "d_60")]
    pub resume_timeout_secs: u64,
    #[serde(default = "d_30")]
    pub heartbeat_secs: u64,
    #[serde(default = "d_10000")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            host: d_host(),
            port: 2333,
            password: None,
            secure: false,
            region: None,
            resume: false,
            resume_timeout_secs: 60,
            heartbeat_secs: 30,
            connect_timeout_ms: 10_000,
            rest: RestConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl NodeConfig {
    pub(crate) fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{prefix}.host"),
                message: "host must not be empty".into(),
            });
        }
        if self.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{prefix}.port"),
                message: "port must be greater than 0".into(),
            });
        }
        if self.heartbeat_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{prefix}.heartbeat_secs"),
                message: "heartbeat interval must be greater than 0".into(),
            });
        }
        if self.resume && self.resume_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: format!("{prefix}.resume_timeout_secs"),
                message: "resume enabled with a zero timeout; the node will drop sessions immediately"
                    .into(),
            });
        }
        if self.password.as_deref().is_some_and(str::is_empty) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: format!("{prefix}.password"),
                message: "empty password is sent as no Authorization header".into(),
            });
        }

        errors.extend(self.rest.validate(&format!("{prefix}.rest")));
        errors.extend(self.reconnect.validate(&format!("{prefix}.reconnect")));
        errors
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_2333() -> u16 {
    2333
}
fn d_60() -> u64 {
    60
}
fn d_30() -> u64 {
    30
}
fn d_10000() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_port_is_an_error() {
        let cfg = NodeConfig {
            port: 0,
            ..NodeConfig::default()
        };
        let issues = cfg.validate("nodes[0]");
        assert!(issues
            .iter()
            .any(|e| e.field == "nodes[0].port" && e.severity == ConfigSeverity::Error));
    }
}
