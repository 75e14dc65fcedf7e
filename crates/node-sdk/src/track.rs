//! Caller-facing track and playlist values.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ember_domain::LoadSource;
use ember_protocol::{PlaylistInfo, RawTrack, TrackInfo};

/// A playable track, carrying caller metadata `M` unchanged.
#[derive(Clone)]
pub struct Track<M = ()> {
    /// Opaque base64 id; feed it back to `fetch_track` to rebuild the track.
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub uri: Option<String>,
    pub identifier: Option<String>,
    pub duration: Duration,
    pub position: Option<Duration>,
    pub metadata: M,
    source: Option<LoadSource>,
    stream: bool,
    seekable: bool,
    playlist: Option<Arc<PlaylistInfo>>,
}

impl<M> Track<M> {
    pub fn new(id: impl Into<String>, info: TrackInfo, metadata: M) -> Self {
        Self {
            id: id.into(),
            title: info.title,
            author: info.author,
            uri: info.uri,
            identifier: info.identifier,
            duration: Duration::from_millis(info.length),
            position: info.position.map(Duration::from_millis),
            metadata,
            source: info.source_name,
            stream: info.is_stream,
            seekable: info.is_seekable,
            playlist: None,
        }
    }

    pub fn from_raw(raw: RawTrack, metadata: M) -> Self {
        Self::new(raw.track, raw.info, metadata)
    }

    pub fn source(&self) -> Option<LoadSource> {
        self.source
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// The playlist this track was loaded from, if any.
    pub fn playlist(&self) -> Option<&PlaylistInfo> {
        self.playlist.as_deref()
    }

    /// Thumbnail URL; only YouTube tracks have a predictable one.
    pub fn thumbnail(&self) -> Option<String> {
        match (self.source, &self.identifier) {
            (Some(LoadSource::Youtube), Some(id)) => Some(format!("https://i.ytimg.com/vi/{id}/hq720.jpg")),
            _ => None,
        }
    }
}

impl<M> PartialEq for Track<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> fmt::Debug for Track<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("uri", &self.uri)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Playlist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct Playlist<M = ()> {
    pub name: String,
    pub metadata: M,
    selected: Option<usize>,
    tracks: Vec<Track<M>>,
}

impl<M: Clone> Playlist<M> {
    /// Build a playlist; every track shares one back-reference to `info`.
    pub fn new(info: PlaylistInfo, raw: Vec<RawTrack>, metadata: M) -> Self {
        let selected = info.selected_index();
        let name = info.name.clone();
        let shared = Arc::new(info);
        let tracks = raw
            .into_iter()
            .map(|r| {
                let mut t = Track::from_raw(r, metadata.clone());
                t.playlist = Some(shared.clone());
                t
            })
            .collect();
        Self {
            name,
            metadata,
            selected,
            tracks,
        }
    }
}

impl<M> Playlist<M> {
    pub fn tracks(&self) -> &[Track<M>] {
        &self.tracks
    }

    pub fn into_tracks(self) -> Vec<Track<M>> {
        self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn first(&self) -> Option<&Track<M>> {
        self.tracks.first()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_track(&self) -> Option<&Track<M>> {
        self.selected.and_then(|i| self.tracks.get(i))
    }

    /// Load source of the first track.
    pub fn source(&self) -> Option<LoadSource> {
        self.first().and_then(Track::source)
    }

    /// Move the selection. Out-of-range indices leave it unchanged.
    pub fn seek(&mut self, index: usize) -> Option<&Track<M>> {
        if index >= self.tracks.len() {
            return None;
        }
        self.selected = Some(index);
        self.tracks.get(index)
    }

    /// Take the selected track out, falling back to the first.
    pub(crate) fn take_selected_or_first(mut self) -> Option<Track<M>> {
        let index = self.selected.filter(|&i| i < self.tracks.len()).unwrap_or(0);
        if self.tracks.is_empty() {
            return None;
        }
        Some(self.tracks.swap_remove(index))
    }

    pub(crate) fn take_first(mut self) -> Option<Track<M>> {
        if self.tracks.is_empty() {
            None
        } else {
            Some(self.tracks.swap_remove(0))
        }
    }
}

impl<M> fmt::Debug for Playlist<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playlist")
            .field("name", &self.name)
            .field("selected", &self.selected)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

// ── Search results ───────────────────────────────────────────────────

/// Result of a multi-track search.
#[derive(Debug, Clone)]
pub enum SearchResult<M = ()> {
    Tracks(Vec<Track<M>>),
    Playlist(Playlist<M>),
}

impl<M> SearchResult<M> {
    pub fn len(&self) -> usize {
        match self {
            SearchResult::Tracks(t) => t.len(),
            SearchResult::Playlist(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_tracks(self) -> Vec<Track<M>> {
        match self {
            SearchResult::Tracks(t) => t,
            SearchResult::Playlist(p) => p.into_tracks(),
        }
    }
}

/// Result of a single-track search.
#[derive(Debug, Clone)]
pub enum SearchHit<M = ()> {
    Track(Track<M>),
    Playlist(Playlist<M>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, source: Option<LoadSource>) -> RawTrack {
        RawTrack {
            track: id.into(),
            info: TrackInfo {
                identifier: Some(format!("{id}-ident")),
                is_seekable: true,
                author: None,
                length: 90_500,
                is_stream: false,
                position: Some(1500),
                title: format!("title {id}"),
                uri: None,
                source_name: source,
            },
        }
    }

    #[test]
    fn track_converts_millis() {
        let t = Track::from_raw(raw("A", None), 42u8);
        assert_eq!(t.duration, Duration::from_millis(90_500));
        assert_eq!(t.position, Some(Duration::from_millis(1500)));
        assert_eq!(t.metadata, 42);
        assert!(t.playlist().is_none());
    }

    #[test]
    fn thumbnail_only_for_youtube() {
        let yt = Track::from_raw(raw("A", Some(LoadSource::Youtube)), ());
        assert_eq!(
            yt.thumbnail().as_deref(),
            Some("https://i.ytimg.com/vi/A-ident/hq720.jpg")
        );
        let sc = Track::from_raw(raw("B", Some(LoadSource::Soundcloud)), ());
        assert!(sc.thumbnail().is_none());
    }

    #[test]
    fn playlist_shares_back_reference() {
        let info = PlaylistInfo {
            name: "Mix".into(),
            selected_track: 1,
        };
        let p = Playlist::new(info, vec![raw("A", Some(LoadSource::Youtube)), raw("B", None)], ());
        assert_eq!(p.selected_track().unwrap().id, "B");
        assert_eq!(p.source(), Some(LoadSource::Youtube));
        let a = p.tracks()[0].playlist.as_ref().unwrap();
        let b = p.tracks()[1].playlist.as_ref().unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(p.tracks()[0].playlist().unwrap().name, "Mix");
    }

    #[test]
    fn seek_moves_selection_within_range() {
        let info = PlaylistInfo {
            name: "Mix".into(),
            selected_track: -1,
        };
        let mut p = Playlist::new(info, vec![raw("A", None), raw("B", None)], ());
        assert!(p.selected_track().is_none());
        assert_eq!(p.seek(1).unwrap().id, "B");
        assert!(p.seek(5).is_none());
        assert_eq!(p.selected_index(), Some(1));
    }

    #[test]
    fn take_selected_falls_back_to_first() {
        let info = PlaylistInfo {
            name: "x".into(),
            selected_track: -1,
        };
        let p = Playlist::new(info, vec![raw("A", None), raw("B", None)], ());
        assert_eq!(p.take_selected_or_first().unwrap().id, "A");
    }
}
