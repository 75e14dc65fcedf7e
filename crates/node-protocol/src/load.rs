//! Payloads of the node's track-loading REST endpoints.

use ember_domain::{LoadSource, Severity};
use serde::{Deserialize, Serialize};

/// Outcome class of a `loadtracks` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    #[serde(alias = "track")]
    TrackLoaded,
    #[serde(alias = "playlist")]
    PlaylistLoaded,
    #[serde(alias = "search")]
    SearchResult,
    #[serde(alias = "empty")]
    NoMatches,
    #[serde(alias = "error")]
    LoadFailed,
}

impl LoadType {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadType::TrackLoaded => "TRACK_LOADED",
            LoadType::PlaylistLoaded => "PLAYLIST_LOADED",
            LoadType::SearchResult => "SEARCH_RESULT",
            LoadType::NoMatches => "NO_MATCHES",
            LoadType::LoadFailed => "LOAD_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTracksResponse {
    pub load_type: LoadType,
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    pub tracks: Vec<RawTrack>,
    #[serde(default)]
    pub exception: Option<LoadException>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(default)]
    pub name: String,
    /// Index of the track the URL pointed at, `-1` for none.
    #[serde(default = "d_selected")]
    pub selected_track: i64,
}

fn d_selected() -> i64 {
    -1
}

impl PlaylistInfo {
    pub fn selected_index(&self) -> Option<usize> {
        usize::try_from(self.selected_track).ok()
    }
}

/// A track as returned by the node: opaque id plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    #[serde(alias = "encoded")]
    pub track: String,
    pub info: TrackInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default = "d_true")]
    pub is_seekable: bool,
    #[serde(default)]
    pub author: Option<String>,
    /// Duration in milliseconds.
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default)]
    pub position: Option<u64>,
    pub title: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub source_name: Option<LoadSource>,
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadException {
    #[serde(default)]
    pub message: Option<String>,
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn playlist_response() {
        let resp: LoadTracksResponse = serde_json::from_value(json!({
            "loadType": "PLAYLIST_LOADED",
            "playlistInfo": { "name": "Mix", "selectedTrack": 1 },
            "tracks": [
                { "track": "A", "info": { "title": "one", "length": 1000, "sourceName": "youtube" } },
                { "track": "B", "info": { "title": "two", "length": 2000, "isSeekable": false } }
            ]
        }))
        .unwrap();

        assert_eq!(resp.load_type, LoadType::PlaylistLoaded);
        assert_eq!(resp.playlist_info.as_ref().unwrap().selected_index(), Some(1));
        assert_eq!(resp.tracks.len(), 2);
        assert!(resp.tracks[0].info.is_seekable);
        assert!(!resp.tracks[1].info.is_seekable);
        assert_eq!(resp.tracks[0].info.source_name, Some(LoadSource::Youtube));
    }

    #[test]
    fn no_selection_is_none() {
        let info: PlaylistInfo = serde_json::from_value(json!({ "name": "x" })).unwrap();
        assert_eq!(info.selected_index(), None);
    }

    #[test]
    fn load_failed_carries_exception() {
        let resp: LoadTracksResponse = serde_json::from_value(json!({
            "loadType": "LOAD_FAILED",
            "exception": { "message": "blocked", "severity": "COMMON" }
        }))
        .unwrap();
        let exc = resp.exception.unwrap();
        assert_eq!(exc.message.as_deref(), Some("blocked"));
        assert_eq!(exc.severity, Severity::Common);
        assert!(resp.tracks.is_empty());
    }

    #[test]
    fn encoded_alias_accepted() {
        let t: RawTrack = serde_json::from_value(json!({
            "encoded": "QAAA",
            "info": { "title": "t" }
        }))
        .unwrap();
        assert_eq!(t.track, "QAAA");
        assert_eq!(t.info.length, 0);
    }
}
