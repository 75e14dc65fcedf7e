use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigSeverity};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// REST
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    #[serde(default = "d_10000")]
    pub timeout_ms: u64,
    /// Total attempts per request. `1` means no retry.
    #[serde(default = "d_1")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    #[serde(default = "d_500")]
    pub retry_initial_ms: u64,
    #[serde(default = "d_10000")]
    pub retry_max_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 1,
            retry_initial_ms: 500,
            retry_max_ms: 10_000,
        }
    }
}

impl RestConfig {
    pub(crate) fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.max_attempts == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{prefix}.max_attempts"),
                message: "max_attempts must be at least 1".into(),
            });
        }
        if self.timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{prefix}.timeout_ms"),
                message: "timeout_ms must be greater than 0".into(),
            });
        }
        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconnect back-off
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Plain exponential back-off: `initial_ms * factor^attempt`, capped at
/// `max_ms`, plus up to 25% jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "d_1000")]
    pub initial_ms: u64,
    #[serde(default = "d_60000")]
    pub max_ms: u64,
    #[serde(default = "d_factor")]
    pub factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1000,
            max_ms: 60_000,
            factor: d_factor(),
        }
    }
}

impl ReconnectConfig {
    pub(crate) fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.factor < 1.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{prefix}.factor"),
                message: "factor below 1.0 would shrink the delay".into(),
            });
        }
        if self.initial_ms > self.max_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: format!("{prefix}.initial_ms"),
                message: "initial_ms exceeds max_ms; every delay will be the cap".into(),
            });
        }
        errors
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_1() -> u32 {
    1
}
fn d_500() -> u64 {
    500
}
fn d_1000() -> u64 {
    1000
}
fn d_10000() -> u64 {
    10_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_factor() -> f64 {
    2.0
}
