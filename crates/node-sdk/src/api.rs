//! The query surface a resolver needs from a node.

use async_trait::async_trait;
use ember_domain::Result;
use ember_protocol::{LoadTracksResponse, RawTrack, TrackInfo};

/// Track-loading endpoints of a node.
///
/// Implemented by [`RestClient`](crate::rest::RestClient); tests substitute
/// an in-memory fake.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// `GET loadtracks?identifier=…`
    async fn load_tracks(&self, identifier: &str) -> Result<LoadTracksResponse>;

    /// `GET decodetrack?track=…`
    async fn decode_track(&self, id: &str) -> Result<TrackInfo>;

    /// `POST decodetracks` with `{"tracks": [...]}`. Results are in input order.
    async fn decode_tracks(&self, ids: &[String]) -> Result<Vec<RawTrack>>;
}
