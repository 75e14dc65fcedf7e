//! Integration test: boots an in-process WebSocket server that plays the
//! node side of the control protocol, connects a real [`Node`], and checks
//! the handshake, routing, reconnect and fatal-close paths.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ember_node::{
    ConnectionState, EntityHandler, Error, Node, NodeBuilder, NodeEvent, PlayerState, ReconnectBackoff,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

const USER_ID: &str = "81384788765712384";

// ── Mini node: in-process WS server ─────────────────────────────────────

/// One accepted client connection.
struct NodeConn {
    /// Upgrade request headers, lowercase names.
    headers: HashMap<String, String>,
    to_client: mpsc::UnboundedSender<Message>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl NodeConn {
    fn push(&self, frame: Value) {
        self.to_client.send(Message::Text(frame.to_string())).unwrap();
    }

    fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.to_client.send(Message::Close(Some(frame))).unwrap();
    }

    async fn next_json(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timeout waiting for client frame")
            .expect("client connection dropped");
        serde_json::from_str(&text).unwrap()
    }
}

/// Boots a WS server on an ephemeral port. With `password`, upgrades whose
/// `Authorization` header differs are rejected with 401.
async fn start_mini_node(password: Option<&'static str>) -> (SocketAddr, mpsc::UnboundedReceiver<NodeConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    serve(listener, password, conn_tx);
    (addr, conn_rx)
}

/// Accept loop for `listener`. Aborting the handle closes the port while
/// already accepted connections stay up.
fn serve(
    listener: TcpListener,
    password: Option<&'static str>,
    conn_tx: mpsc::UnboundedSender<NodeConn>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let mut headers = HashMap::new();
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    for (name, value) in req.headers() {
                        headers.insert(
                            name.as_str().to_ascii_lowercase(),
                            value.to_str().unwrap_or_default().to_owned(),
                        );
                    }
                    match password {
                        Some(pw) if headers.get("authorization").map(String::as_str) != Some(pw) => Err(
                            Response::builder()
                                .status(StatusCode::UNAUTHORIZED)
                                .body(Some("invalid authorization".to_owned()))
                                .unwrap(),
                        ),
                        _ => Ok(resp),
                    }
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };

                let (mut sink, mut stream) = ws.split();
                let (to_client, mut outbox) = mpsc::unbounded_channel::<Message>();
                let (inbox, from_client) = mpsc::unbounded_channel::<String>();
                let _ = conn_tx.send(NodeConn {
                    headers,
                    to_client,
                    from_client,
                });

                let writer = tokio::spawn(async move {
                    while let Some(msg) = outbox.recv().await {
                        let closing = matches!(msg, Message::Close(_));
                        if sink.send(msg).await.is_err() || closing {
                            break;
                        }
                    }
                });
                while let Some(Ok(msg)) = stream.next().await {
                    if let Message::Text(text) = msg {
                        let _ = inbox.send(text);
                    }
                }
                writer.abort();
            });
        }
    })
}

/// A node that completes the upgrade and then never reads again, so pings
/// go unanswered. Each accepted upgrade is reported on the channel.
async fn start_silent_node() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _peer)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                held.push(ws);
                let _ = tx.send(());
            }
        }
    });

    (addr, rx)
}

async fn accept(conns: &mut mpsc::UnboundedReceiver<NodeConn>) -> NodeConn {
    tokio::time::timeout(Duration::from_secs(5), conns.recv())
        .await
        .expect("timeout waiting for client connection")
        .expect("server stopped")
}

// ── Test entity: forwards everything to a channel ───────────────────────

struct ChannelEntity(mpsc::UnboundedSender<String>);

#[async_trait]
impl EntityHandler for ChannelEntity {
    async fn on_state_update(&self, state: &PlayerState) {
        let _ = self.0.send(format!("state:{}", state.position.unwrap_or_default()));
    }

    async fn on_event(&self, event: &NodeEvent) {
        let _ = self.0.send(format!("event:{}", event.name()));
    }
}

fn entity() -> (Arc<ChannelEntity>, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelEntity(tx)), rx)
}

async fn routed(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for routed frame")
        .expect("entity channel closed")
}

fn node_for(addr: SocketAddr) -> NodeBuilder {
    NodeBuilder::new()
        .user_id(USER_ID)
        .identifier("MAIN")
        .host("127.0.0.1")
        .port(addr.port())
        .heartbeat_interval(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(2))
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            seed: 0,
        })
}

async fn wait_for_state(node: &Node, want: ConnectionState) {
    let mut rx = node.watch_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timeout waiting for {want}"))
        .expect("state channel closed");
}

fn player_update(guild_id: u64, position: u64) -> Value {
    json!({
        "op": "playerUpdate",
        "guildId": guild_id.to_string(),
        "state": { "time": 1_700_000_000_000u64, "position": position, "connected": true }
    })
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_headers_and_routing() {
    let (addr, mut conns) = start_mini_node(Some("youshallnotpass")).await;
    let node = node_for(addr)
        .password("youshallnotpass")
        .resume(true)
        .build()
        .unwrap();
    let (handler, mut seen) = entity();
    node.register_entity(42, handler);

    node.connect().await.unwrap();
    assert_eq!(node.state(), ConnectionState::Connected);
    let mut conn = accept(&mut conns).await;

    // ── Assert handshake headers ─────────────────────────────────────
    assert_eq!(conn.headers["user-id"], USER_ID);
    assert_eq!(conn.headers["authorization"], "youshallnotpass");
    assert!(conn.headers["client-name"].starts_with("ember/"));
    let key = &conn.headers["resume-key"];
    assert_eq!(key.len(), 16);
    assert_eq!(Some(key.as_str()), node.session().resume_key().as_ref().map(|k| k.as_str()));

    // ── Inbound routing ──────────────────────────────────────────────
    conn.push(json!({
        "op": "stats", "players": 1, "playingPlayers": 1, "uptime": 1000,
        "memory": { "free": 10, "used": 20, "allocated": 30, "reservable": 40 },
        "cpu": { "cores": 4, "systemLoad": 0.0, "lavalinkLoad": 0.0 }
    }));
    conn.push(player_update(43, 7)); // nobody registered
    conn.push(player_update(42, 1000));
    conn.push(json!({ "op": "mystery" }));
    conn.push(json!({
        "op": "event", "type": "TrackStartEvent", "guildId": "42",
        "track": "QAAA", "future_field": { "a": 1 }
    }));

    assert_eq!(routed(&mut seen).await, "state:1000");
    assert_eq!(routed(&mut seen).await, "event:track_start");
    assert_eq!(node.stats().unwrap().players, 1);

    // ── Outbound framing ─────────────────────────────────────────────
    node.session().pause(42, true).unwrap();
    let frame = conn.next_json().await;
    assert_eq!(frame, json!({ "op": "pause", "guildId": "42", "pause": true }));

    node.destroy().await;
    assert_eq!(node.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn peer_close_reconnects_and_routing_continues() {
    let (addr, mut conns) = start_mini_node(None).await;
    let node = node_for(addr).resume(true).build().unwrap();
    let (handler, mut seen) = entity();
    node.register_entity(1, handler);

    node.connect().await.unwrap();
    let first = accept(&mut conns).await;
    let key = first.headers["resume-key"].clone();

    first.close(1000, "restarting");

    // The client comes back on its own, with the same key, and re-arms
    // resumption on the new session.
    let mut second = accept(&mut conns).await;
    assert_eq!(second.headers["resume-key"], key);
    let frame = second.next_json().await;
    assert_eq!(frame["op"], "configureResuming");
    assert_eq!(frame["key"], key.as_str());
    assert_eq!(frame["timeout"], 60);

    wait_for_state(&node, ConnectionState::Connected).await;
    assert_eq!(node.session().attempt(), 0);

    second.push(player_update(1, 250));
    assert_eq!(routed(&mut seen).await, "state:250");

    node.destroy().await;
}

#[tokio::test]
async fn unreachable_node_fails_with_connect_and_starts_no_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let node = node_for(addr).build().unwrap();
    let err = node.connect().await.unwrap_err();
    assert!(matches!(err, Error::Connect { .. }), "got {err:?}");
    assert_eq!(node.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(node.state(), ConnectionState::Disconnected);
    assert_eq!(node.session().attempt(), 0);
}

#[tokio::test]
async fn rejected_credentials_fail_with_auth() {
    let (addr, _conns) = start_mini_node(Some("right")).await;
    let node = node_for(addr).password("wrong").build().unwrap();

    let err = node.connect().await.unwrap_err();
    assert!(matches!(err, Error::Auth { ref node } if node == "MAIN"), "got {err:?}");
    assert_eq!(node.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn internal_error_close_is_not_retried() {
    let (addr, mut conns) = start_mini_node(None).await;
    let node = node_for(addr).resume(true).build().unwrap();

    node.connect().await.unwrap();
    let conn = accept(&mut conns).await;
    conn.close(1011, "internal error");

    wait_for_state(&node, ConnectionState::Disconnected).await;
    let again = tokio::time::timeout(Duration::from_millis(400), conns.recv()).await;
    assert!(again.is_err(), "client reconnected after 1011");
    assert!(matches!(
        node.session().send_command(&ember_protocol::OutboundCommand::Stop { guild_id: 1 }),
        Err(Error::NotConnected(_))
    ));
}

#[tokio::test]
async fn destroy_during_backoff_is_prompt_and_idempotent() {
    let (addr, mut conns) = start_mini_node(None).await;
    let node = node_for(addr)
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            backoff_factor: 1.0,
            seed: 0,
        })
        .build()
        .unwrap();

    node.connect().await.unwrap();
    let conn = accept(&mut conns).await;
    conn.close(1001, "going away");

    // No resume key, so a dropped connection reads as Disconnected while
    // the loop sleeps.
    wait_for_state(&node, ConnectionState::Disconnected).await;

    tokio::time::timeout(Duration::from_secs(1), node.destroy())
        .await
        .expect("destroy blocked on back-off");
    node.destroy().await;
    assert!(node.session().is_destroyed());
    assert!(matches!(node.connect().await, Err(Error::NotConnected(_))));
}

#[tokio::test]
async fn disconnect_with_reconnect_after_opens_fresh_session() {
    let (addr, mut conns) = start_mini_node(None).await;
    let node = node_for(addr).build().unwrap();

    node.connect().await.unwrap();
    let _first = accept(&mut conns).await;
    // Already connected: a plain connect is a no-op.
    node.connect().await.unwrap();

    node.disconnect(true).await.unwrap();
    let _second = accept(&mut conns).await;
    assert_eq!(node.state(), ConnectionState::Connected);

    node.disconnect(false).await.unwrap();
    assert_eq!(node.state(), ConnectionState::Disconnected);
    let again = tokio::time::timeout(Duration::from_millis(200), conns.recv()).await;
    assert!(again.is_err(), "disconnect must not trigger a reconnect");
}

#[tokio::test]
async fn failed_connect_during_outage_keeps_reconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, mut conns) = mpsc::unbounded_channel();
    let acceptor = serve(listener, None, conn_tx.clone());

    let node = node_for(addr).build().unwrap();
    node.connect().await.unwrap();
    let first = accept(&mut conns).await;

    // Node goes down: port closed, live connection dropped.
    acceptor.abort();
    let _ = acceptor.await;
    first.close(1001, "going away");
    wait_for_state(&node, ConnectionState::Disconnected).await;

    let err = node.connect().await.unwrap_err();
    assert!(matches!(err, Error::Connect { .. }), "got {err:?}");

    // Node comes back on the same port; the back-off loop finds it.
    let listener = TcpListener::bind(addr).await.unwrap();
    let _acceptor = serve(listener, None, conn_tx);
    let _second = accept(&mut conns).await;
    wait_for_state(&node, ConnectionState::Connected).await;

    node.destroy().await;
}

#[tokio::test]
async fn unanswered_heartbeats_drop_the_connection() {
    let (addr, mut upgrades) = start_silent_node().await;
    let node = node_for(addr)
        .heartbeat_interval(Duration::from_secs(1))
        .build()
        .unwrap();

    node.connect().await.unwrap();
    let started = tokio::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(5), upgrades.recv())
        .await
        .expect("timeout waiting for first upgrade")
        .unwrap();

    // Two silent heartbeat intervals later the client gives up on the
    // socket and opens a new one.
    tokio::time::timeout(Duration::from_secs(6), upgrades.recv())
        .await
        .expect("silent connection was never abandoned")
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(1500));

    node.destroy().await;
}

#[tokio::test]
async fn dropped_connection_with_resume_key_reads_as_resuming() {
    let (addr, mut conns) = start_mini_node(None).await;
    let node = node_for(addr)
        .resume(true)
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            backoff_factor: 1.0,
            seed: 0,
        })
        .build()
        .unwrap();

    node.connect().await.unwrap();
    let conn = accept(&mut conns).await;
    conn.close(1001, "going away");

    wait_for_state(&node, ConnectionState::Resuming).await;
    assert!(node.session().resume_key().is_some());

    node.destroy().await;
    assert_eq!(node.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn toggling_resume_rotates_the_key() {
    let (addr, mut conns) = start_mini_node(None).await;
    let node = node_for(addr).resume(true).build().unwrap();

    node.connect().await.unwrap();
    let first = accept(&mut conns).await;
    let original = first.headers["resume-key"].clone();

    node.session().set_resuming(false);
    assert!(node.session().resume_key().is_none());
    node.disconnect(true).await.unwrap();
    let second = accept(&mut conns).await;
    assert!(!second.headers.contains_key("resume-key"));

    node.session().set_resuming(true);
    let fresh = node.session().resume_key().expect("key after re-enabling");
    assert_ne!(fresh.as_str(), original);

    node.disconnect(true).await.unwrap();
    let mut third = accept(&mut conns).await;
    assert_eq!(third.headers["resume-key"], fresh.as_str());
    let frame = third.next_json().await;
    assert_eq!(frame["op"], "configureResuming");
    assert_eq!(frame["key"], fresh.as_str());

    node.destroy().await;
}
