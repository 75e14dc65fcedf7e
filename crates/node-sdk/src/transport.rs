//! Physical WebSocket lifecycle for one node connection.
//!
//! [`open`] performs the authenticated upgrade and splits the socket into a
//! cheap, cloneable [`TransportSession`] (the write side plus heartbeat) and
//! a [`FrameStream`] (the read side).

use std::time::Duration;

use ember_domain::error::{Error, Result};
use ember_protocol::CLOSE_INTERNAL_ERROR;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Resume key ───────────────────────────────────────────────────────

/// Opaque token presented in the `Resume-Key` header: 8 random bytes as hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeKey(String);

impl ResumeKey {
    pub fn generate() -> Self {
        let mut hex = uuid::Uuid::new_v4().simple().to_string();
        hex.truncate(16);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ── Handshake parameters ─────────────────────────────────────────────

/// Everything needed to open a control connection.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub node_id: String,
    pub url: String,
    pub user_id: String,
    /// `Client-Name` header, `<client>/<version>`.
    pub client_name: String,
    pub password: Option<String>,
    pub heartbeat: Duration,
    pub connect_timeout: Duration,
}

// ── Frames ───────────────────────────────────────────────────────────

/// Why a frame stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// The node closed the socket cleanly.
    Peer { code: Option<u16>, reason: String },
    /// Transport error or the stream ended without a close frame.
    Lost(String),
    /// The node closed with 1011 (internal error). Must not be retried.
    RemoteFatal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    /// Always the last item before the stream is exhausted.
    Closed(CloseReason),
}

/// Read side of a connection. Not restartable.
pub struct FrameStream {
    inner: SplitStream<WsStream>,
    closed: CancellationToken,
    done: bool,
    /// Silence longer than this (no frame, no pong) counts as a lost connection.
    liveness: Duration,
    last_seen: Instant,
}

impl FrameStream {
    /// Next text frame, then exactly one [`Frame::Closed`], then `None`.
    ///
    /// A peer that sends nothing, not even a pong to our heartbeat ping,
    /// for the liveness window ends the stream with [`CloseReason::Lost`].
    pub async fn next(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }
        loop {
            let item = match tokio::time::timeout_at(self.last_seen + self.liveness, self.inner.next()).await {
                Ok(item) => item,
                Err(_) => {
                    let reason = CloseReason::Lost(format!(
                        "no frames or pongs for {}ms",
                        self.liveness.as_millis()
                    ));
                    return Some(self.finish(reason));
                }
            };
            self.last_seen = Instant::now();
            let reason = match item {
                Some(Ok(Message::Text(text))) => return Some(Frame::Text(text)),
                Some(Ok(Message::Close(frame))) => close_reason(frame),
                // ping, pong and binary frames only prove liveness
                Some(Ok(_)) => continue,
                Some(Err(e)) => CloseReason::Lost(e.to_string()),
                None => CloseReason::Lost("stream ended without a close frame".into()),
            };
            return Some(self.finish(reason));
        }
    }

    fn finish(&mut self, reason: CloseReason) -> Frame {
        self.done = true;
        self.closed.cancel();
        Frame::Closed(reason)
    }
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> CloseReason {
    match frame {
        Some(f) if u16::from(f.code) == CLOSE_INTERNAL_ERROR => {
            CloseReason::RemoteFatal(f.reason.into_owned())
        }
        Some(f) => CloseReason::Peer {
            code: Some(u16::from(f.code)),
            reason: f.reason.into_owned(),
        },
        None => CloseReason::Peer {
            code: None,
            reason: String::new(),
        },
    }
}

// ── Session handle ───────────────────────────────────────────────────

/// Write side of a live connection.
///
/// Clones share the same socket. Once closed (locally or by the peer),
/// every send fails with [`Error::NotConnected`].
#[derive(Clone)]
pub struct TransportSession {
    node_id: String,
    outbound: mpsc::UnboundedSender<Message>,
    closed: CancellationToken,
}

impl TransportSession {
    pub fn send(&self, text: String) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::NotConnected(self.node_id.clone()));
        }
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| Error::NotConnected(self.node_id.clone()))
    }

    /// Close the socket with a normal close frame. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

/// Perform the authenticated WebSocket upgrade.
///
/// Fails with [`Error::Auth`] when the node rejects the credentials,
/// [`Error::Handshake`] for any other rejected upgrade and
/// [`Error::Connect`] when the node cannot be reached.
pub async fn open(
    cfg: &HandshakeConfig,
    resume_key: Option<&ResumeKey>,
) -> Result<(TransportSession, FrameStream)> {
    let mut request = cfg
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::Connect {
            node: cfg.node_id.clone(),
            message: format!("invalid url {}: {e}", cfg.url),
        })?;

    let headers = request.headers_mut();
    headers.insert("User-Id", header(cfg, &cfg.user_id)?);
    headers.insert("Client-Name", header(cfg, &cfg.client_name)?);
    if let Some(ref password) = cfg.password {
        headers.insert("Authorization", header(cfg, password)?);
    }
    if let Some(key) = resume_key {
        headers.insert("Resume-Key", header(cfg, key.as_str())?);
    }

    tracing::debug!(node_id = %cfg.node_id, url = %cfg.url, resume = resume_key.is_some(), "opening node connection");

    let (ws, _response) =
        match tokio::time::timeout(cfg.connect_timeout, tokio_tungstenite::connect_async(request))
            .await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(map_connect_error(&cfg.node_id, e)),
            Err(_) => {
                return Err(Error::Connect {
                    node: cfg.node_id.clone(),
                    message: format!("timed out after {}ms", cfg.connect_timeout.as_millis()),
                })
            }
        };

    let (mut sink, stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let closed = CancellationToken::new();

    // Writer task: outbound frames, heartbeat pings and the final close.
    let writer_closed = closed.clone();
    let heartbeat = cfg.heartbeat;
    let node_id = cfg.node_id.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
        loop {
            tokio::select! {
                _ = writer_closed.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    break;
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = sink.send(msg).await {
                        tracing::debug!(node_id = %node_id, error = %e, "write failed; closing");
                        writer_closed.cancel();
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        writer_closed.cancel();
                        break;
                    }
                }
            }
        }
    });

    Ok((
        TransportSession {
            node_id: cfg.node_id.clone(),
            outbound: tx,
            closed: closed.clone(),
        },
        FrameStream {
            inner: stream,
            closed,
            done: false,
            liveness: cfg.heartbeat * 2,
            last_seen: Instant::now(),
        },
    ))
}

fn header(cfg: &HandshakeConfig, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Handshake {
        node: cfg.node_id.clone(),
        message: format!("invalid header value: {e}"),
    })
}

fn map_connect_error(node_id: &str, err: tungstenite::Error) -> Error {
    let node = node_id.to_owned();
    match err {
        tungstenite::Error::Http(resp) => {
            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                Error::Auth { node }
            } else {
                Error::Handshake {
                    node,
                    message: format!("upgrade rejected with HTTP {}", status.as_u16()),
                }
            }
        }
        tungstenite::Error::Io(e) => Error::Connect {
            node,
            message: e.to_string(),
        },
        tungstenite::Error::Url(e) => Error::Connect {
            node,
            message: e.to_string(),
        },
        other => Error::Handshake {
            node,
            message: other.to_string(),
        },
    }
}
