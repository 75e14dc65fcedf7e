use crate::media::{Severity, Source};

/// Shared error type used across all Ember crates.
///
/// Raw transport errors never cross a crate boundary; they are mapped into
/// one of these variants first.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    // ── Connection ───────────────────────────────────────────────────
    #[error("invalid authorization passed for node {node:?}")]
    Auth { node: String },

    #[error("handshake with node {node:?} failed: {message}")]
    Handshake { node: String, message: String },

    #[error("failed connecting to node {node:?}: {message}")]
    Connect { node: String, message: String },

    #[error("node {0:?} is not connected")]
    NotConnected(String),

    // ── REST ─────────────────────────────────────────────────────────
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("not found (404): {body}")]
    NotFound { body: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("timeout: {0}")]
    Timeout(String),

    // ── Track loading ────────────────────────────────────────────────
    #[error("no matches found for query {query:?} (source: {})", source_name(.search_source))]
    NoMatches {
        query: String,
        search_source: Option<Source>,
    },

    #[error("could not load tracks: {message} (severity: {severity})")]
    LoadFailed { message: String, severity: Severity },

    #[error("searching on {0} is not supported")]
    UnsupportedSource(Source),

    // ── Pool / entities ──────────────────────────────────────────────
    #[error("node identifier {0:?} is already in use")]
    NodeConflict(String),

    #[error("no available nodes in this pool")]
    NoAvailableNodes,

    #[error("no node matching identifier {identifier:?} and region {region:?}")]
    NoMatchingNodes {
        identifier: Option<String>,
        region: Option<String>,
    },

    #[error("no entity registered for id {0}")]
    EntityNotFound(u64),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status carried by REST failures, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

fn source_name(source: &Option<Source>) -> &'static str {
    source.map(Source::name).unwrap_or("none")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_matches_names_query_and_source() {
        let err = Error::NoMatches {
            query: "never gonna".into(),
            search_source: Some(Source::Youtube),
        };
        let msg = err.to_string();
        assert!(msg.contains("never gonna"));
        assert!(msg.contains("youtube"));

        let err = Error::NoMatches {
            query: "x".into(),
            search_source: None,
        };
        assert!(err.to_string().contains("source: none"));
    }

    #[test]
    fn status_only_for_rest_errors() {
        assert_eq!(Error::NotFound { body: String::new() }.status(), Some(404));
        assert_eq!(
            Error::Http {
                status: 500,
                body: String::new()
            }
            .status(),
            Some(500)
        );
        assert_eq!(Error::NotConnected("MAIN".into()).status(), None);
    }
}
