//! Turning free-text queries into tracks and playlists.

use std::sync::{Arc, LazyLock};

use ember_domain::error::{Error, Result};
use ember_domain::trace::TraceEvent;
use ember_domain::{Severity, Source};
use ember_protocol::{LoadType, PlaylistInfo, RawTrack};
use regex::Regex;

use crate::api::NodeApi;
use crate::track::{Playlist, SearchHit, SearchResult, Track};

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:www\.)?.+").expect("valid URL regex"));

/// Whether `query`, with surrounding `<>` stripped, looks like a URL.
pub fn looks_like_url(query: &str) -> bool {
    URL_RE.is_match(query.trim_matches(|c| c == '<' || c == '>'))
}

/// Build the identifier sent to `loadtracks`.
///
/// `local` never prefixes. Unless `strict`, a URL query ignores the
/// source so direct links resolve as-is.
pub fn build_identifier(query: &str, source: Option<Source>, strict: bool) -> Result<String> {
    let source = match source {
        Some(s) if !s.is_supported() => return Err(Error::UnsupportedSource(s)),
        Some(Source::Local) | None => None,
        Some(s) if !strict && looks_like_url(query) => {
            tracing::trace!(source = %s, "URL query; ignoring search source");
            None
        }
        Some(s) => Some(s),
    };
    Ok(match source {
        Some(s) => format!("{}:{query}", s.token()),
        None => query.to_owned(),
    })
}

/// Full classification of a load, without turning empty or failed loads
/// into errors.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    TrackLoaded(RawTrack),
    PlaylistLoaded(PlaylistInfo, Vec<RawTrack>),
    SearchResult(Vec<RawTrack>),
    NoMatches,
    LoadFailed { message: String, severity: Severity },
}

/// Options for [`TrackResolver::search_tracks`] and
/// [`TrackResolver::search_track`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub source: Option<Source>,
    /// Keep the source prefix even when the query is a URL.
    pub strict: bool,
    /// Return playlists as plain track lists.
    pub flatten_playlists: bool,
    /// Truncate plain track lists; playlists are never truncated.
    pub limit: Option<usize>,
    /// `search_track` only: resolve a playlist hit down to one track.
    pub resolve_playlists: bool,
    /// `search_track` only: prefer the playlist's selected track.
    pub prefer_selected_track: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            source: None,
            strict: false,
            flatten_playlists: false,
            limit: None,
            resolve_playlists: false,
            prefer_selected_track: true,
        }
    }
}

impl SearchOptions {
    pub fn source(source: Source) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }
}

/// Resolves queries and ids against one node.
#[derive(Clone)]
pub struct TrackResolver {
    node_id: String,
    api: Arc<dyn NodeApi>,
}

impl TrackResolver {
    pub fn new(node_id: impl Into<String>, api: Arc<dyn NodeApi>) -> Self {
        Self {
            node_id: node_id.into(),
            api,
        }
    }

    /// Load raw results, failing on empty and failed loads.
    pub async fn load_tracks(
        &self,
        query: &str,
        source: Option<Source>,
        strict: bool,
    ) -> Result<(Option<PlaylistInfo>, Vec<RawTrack>)> {
        match self.load(query, source, strict).await? {
            LoadResult::NoMatches => Err(Error::NoMatches {
                query: query.to_owned(),
                search_source: source,
            }),
            LoadResult::LoadFailed { message, severity } => Err(Error::LoadFailed { message, severity }),
            LoadResult::PlaylistLoaded(info, tracks) => Ok((Some(info), tracks)),
            LoadResult::TrackLoaded(track) => Ok((None, vec![track])),
            LoadResult::SearchResult(tracks) => Ok((None, tracks)),
        }
    }

    pub async fn load(&self, query: &str, source: Option<Source>, strict: bool) -> Result<LoadResult> {
        let identifier = build_identifier(query, source, strict)?;
        let resp = self.api.load_tracks(&identifier).await?;

        TraceEvent::TracksLoaded {
            node_id: self.node_id.clone(),
            load_type: resp.load_type.as_str().to_owned(),
            tracks: resp.tracks.len(),
        }
        .emit();

        Ok(match resp.load_type {
            LoadType::NoMatches => LoadResult::NoMatches,
            LoadType::LoadFailed => {
                let (message, severity) = resp
                    .exception
                    .map(|e| (e.message.unwrap_or_default(), e.severity))
                    .unwrap_or_else(|| (String::new(), Severity::Fault));
                LoadResult::LoadFailed { message, severity }
            }
            LoadType::PlaylistLoaded => LoadResult::PlaylistLoaded(
                resp.playlist_info.unwrap_or(PlaylistInfo {
                    name: String::new(),
                    selected_track: -1,
                }),
                resp.tracks,
            ),
            LoadType::TrackLoaded => match resp.tracks.into_iter().next() {
                Some(track) => LoadResult::TrackLoaded(track),
                None => LoadResult::NoMatches,
            },
            LoadType::SearchResult => LoadResult::SearchResult(resp.tracks),
        })
    }

    pub async fn search_tracks<M: Clone>(
        &self,
        query: &str,
        opts: &SearchOptions,
        metadata: M,
    ) -> Result<SearchResult<M>> {
        let (playlist, mut tracks) = self.load_tracks(query, opts.source, opts.strict).await?;
        let playlist = playlist.filter(|_| !opts.flatten_playlists);

        if let Some(info) = playlist {
            return Ok(SearchResult::Playlist(Playlist::new(info, tracks, metadata)));
        }
        if let Some(limit) = opts.limit {
            tracks.truncate(limit);
        }
        Ok(SearchResult::Tracks(
            tracks
                .into_iter()
                .map(|t| Track::from_raw(t, metadata.clone()))
                .collect(),
        ))
    }

    /// Search for a single track.
    ///
    /// A playlist hit is returned as-is only when neither
    /// `resolve_playlists` nor `prefer_selected_track` is set.
    pub async fn search_track<M: Clone>(
        &self,
        query: &str,
        opts: &SearchOptions,
        metadata: M,
    ) -> Result<Option<SearchHit<M>>> {
        let inner = SearchOptions {
            flatten_playlists: opts.resolve_playlists && !opts.prefer_selected_track,
            limit: Some(1),
            ..opts.clone()
        };
        Ok(match self.search_tracks(query, &inner, metadata).await? {
            SearchResult::Tracks(tracks) => tracks.into_iter().next().map(SearchHit::Track),
            SearchResult::Playlist(p) if opts.prefer_selected_track => {
                p.take_selected_or_first().map(SearchHit::Track)
            }
            SearchResult::Playlist(p) if opts.resolve_playlists => p.take_first().map(SearchHit::Track),
            SearchResult::Playlist(p) => Some(SearchHit::Playlist(p)),
        })
    }

    pub async fn fetch_track<M>(&self, id: &str, metadata: M) -> Result<Track<M>> {
        let info = self.api.decode_track(id).await?;
        Ok(Track::new(id, info, metadata))
    }

    /// Decode several ids.
    ///
    /// With `atomic`, each id is decoded on its own and ids the node cannot
    /// decode are skipped. Otherwise one batch request is made and any
    /// failure fails the call.
    pub async fn fetch_tracks<M: Clone>(
        &self,
        ids: &[String],
        atomic: bool,
        metadata: M,
    ) -> Result<Vec<Track<M>>> {
        if !atomic {
            let raw = self.api.decode_tracks(ids).await?;
            return Ok(raw
                .into_iter()
                .map(|r| Track::from_raw(r, metadata.clone()))
                .collect());
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch_track(id, metadata.clone()).await {
                Ok(track) => out.push(track),
                Err(e @ (Error::NotFound { .. } | Error::Http { .. })) => {
                    tracing::debug!(node_id = %self.node_id, track = %id, error = %e, "skipping undecodable track");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
