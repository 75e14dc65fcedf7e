//! Media enums shared by the wire protocol and caller-facing APIs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A platform to search on when loading tracks.
///
/// The search token is prefixed to the query (`ytsearch:never gonna`)
/// before it is sent to the node's load endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Youtube,
    YoutubeMusic,
    Soundcloud,
    Spotify,
    /// Local files on the node. Never used as a prefix.
    Local,
}

impl Source {
    /// The prefix token understood by the node.
    pub fn token(self) -> &'static str {
        match self {
            Source::Youtube => "ytsearch",
            Source::YoutubeMusic => "ytmsearch",
            Source::Soundcloud => "scsearch",
            Source::Spotify => "spsearch",
            Source::Local => "local",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Source::Youtube => "youtube",
            Source::YoutubeMusic => "youtube_music",
            Source::Soundcloud => "soundcloud",
            Source::Spotify => "spotify",
            Source::Local => "local",
        }
    }

    /// Whether this deployment can search on the source at all.
    pub fn is_supported(self) -> bool {
        !matches!(self, Source::Spotify)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = String;

    /// Accepts names (`youtube`), short forms (`yt`) and raw search tokens
    /// (`ytsearch`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "youtube" | "yt" | "ytsearch" => Ok(Source::Youtube),
            "youtube_music" | "ytm" | "ytmsearch" => Ok(Source::YoutubeMusic),
            "soundcloud" | "sc" | "scsearch" => Ok(Source::Soundcloud),
            "spotify" | "sp" | "spsearch" => Ok(Source::Spotify),
            "local" => Ok(Source::Local),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Load source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The platform a loaded track originates from (`sourceName` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadSource {
    Youtube,
    Soundcloud,
    Bandcamp,
    Vimeo,
    Twitch,
    Http,
    Local,
    #[serde(other)]
    Other,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Severity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How bad a load failure or track exception is, as judged by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected failure (video unavailable, region locked, ...).
    #[serde(alias = "COMMON")]
    Common,
    /// Unexpected but not necessarily a node bug.
    #[serde(alias = "SUSPICIOUS")]
    Suspicious,
    /// The node itself is likely at fault.
    #[serde(alias = "FAULT")]
    Fault,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Common => "common",
            Severity::Suspicious => "suspicious",
            Severity::Fault => "fault",
        })
    }
}
