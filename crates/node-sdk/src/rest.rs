//! HTTP client for the node's REST endpoints, with bounded retry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ember_domain::config::RestConfig;
use ember_domain::error::{Error, Result};
use ember_domain::trace::TraceEvent;
use ember_protocol::{LoadTracksResponse, RawTrack, TrackInfo};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};

use crate::api::NodeApi;
use crate::reconnect::ReconnectBackoff;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// REST client bound to one node.
///
/// The underlying `reqwest::Client` keeps a connection pool, so one
/// instance lives as long as its node.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    node_id: String,
    base_url: String,
    password: Option<String>,
    max_attempts: u32,
    retry: ReconnectBackoff,
}

impl RestClient {
    pub fn new(
        node_id: impl Into<String>,
        base_url: &str,
        password: Option<String>,
        cfg: &RestConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            http,
            node_id: node_id.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            password,
            max_attempts: cfg.max_attempts.max(1),
            retry: ReconnectBackoff {
                initial_delay: Duration::from_millis(cfg.retry_initial_ms),
                max_delay: Duration::from_millis(cfg.retry_max_ms),
                backoff_factor: 2.0,
                seed: 0,
            },
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Send a request, retrying non-2xx responses and transport errors
    /// until the attempt budget is spent.
    ///
    /// The final failure maps 404 to [`Error::NotFound`], any other status
    /// to [`Error::Http`] and transport problems to [`Error::Transport`]
    /// (or [`Error::Timeout`]). An empty 2xx body decodes to `null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.url(path);
        let endpoint = format!("{method} {}", path.trim_start_matches('/'));

        for attempt in 1..=self.max_attempts {
            let last = attempt == self.max_attempts;

            let mut rb = self.http.request(method.clone(), &url).query(query);
            if let Some(ref password) = self.password {
                rb = rb.header("Authorization", password);
            }
            if let Some(body) = body {
                rb = rb.json(body);
            }

            let start = Instant::now();
            let result = rb.send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let failure = match result {
                Ok(resp) => {
                    let status = resp.status();
                    TraceEvent::RestCall {
                        node_id: self.node_id.clone(),
                        endpoint: endpoint.clone(),
                        status: status.as_u16(),
                        attempt,
                        duration_ms,
                    }
                    .emit();

                    let text = resp.text().await.map_err(from_reqwest);
                    if status.is_success() {
                        let text = text?;
                        if text.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return Ok(serde_json::from_str(&text)?);
                    }
                    let body = text.unwrap_or_default();
                    if status == StatusCode::NOT_FOUND {
                        Error::NotFound { body }
                    } else {
                        Error::Http {
                            status: status.as_u16(),
                            body,
                        }
                    }
                }
                Err(e) => {
                    TraceEvent::RestCall {
                        node_id: self.node_id.clone(),
                        endpoint: endpoint.clone(),
                        status: 0,
                        attempt,
                        duration_ms,
                    }
                    .emit();
                    from_reqwest(e)
                }
            };

            if last {
                return Err(failure);
            }

            let delay = self.retry.delay_for_attempt(attempt - 1);
            tracing::debug!(
                node_id = %self.node_id,
                endpoint = %endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "request failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }

        // max_attempts >= 1, so the loop always returns.
        Err(Error::Other(format!("{endpoint}: no attempts made")))
    }
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Transport(e.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl NodeApi for RestClient {
    async fn load_tracks(&self, identifier: &str) -> Result<LoadTracksResponse> {
        let value = self
            .request(Method::GET, "loadtracks", &[("identifier", identifier)], None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn decode_track(&self, id: &str) -> Result<TrackInfo> {
        let value = self
            .request(Method::GET, "decodetrack", &[("track", id)], None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn decode_tracks(&self, ids: &[String]) -> Result<Vec<RawTrack>> {
        let body = json!({ "tracks": ids });
        let value = self
            .request(Method::POST, "decodetracks", &[], Some(&body))
            .await?;
        let infos: Vec<Value> = serde_json::from_value(value)?;
        infos
            .into_iter()
            .zip(ids)
            .map(|(item, id)| decoded_entry(id, item))
            .collect()
    }
}

/// `decodetracks` returns either bare info objects or `{track, info}` pairs
/// depending on the node version.
fn decoded_entry(id: &str, item: Value) -> Result<RawTrack> {
    if item.get("info").is_some() {
        return Ok(serde_json::from_value(item)?);
    }
    Ok(RawTrack {
        track: id.to_owned(),
        info: serde_json::from_value(item)?,
    })
}
