//! Connect / resume / reconnect state machine for one node.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use ember_domain::error::{Error, Result};
use ember_domain::trace::TraceEvent;
use ember_protocol::OutboundCommand;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::reconnect::ReconnectBackoff;
use crate::transport::{self, CloseReason, Frame, FrameStream, HandshakeConfig, ResumeKey, TransportSession};
use crate::types::ConnectionState;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Owns the live transport and the background receive loop of one node.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    handshake: HandshakeConfig,
    backoff: ReconnectBackoff,
    resume_timeout_secs: u64,
    dispatcher: Arc<Dispatcher>,

    state: watch::Sender<ConnectionState>,
    /// Serializes connect / disconnect.
    transitions: tokio::sync::Mutex<()>,
    attempt: AtomicU32,
    ever_connected: AtomicBool,
    resume_key: RwLock<Option<ResumeKey>>,

    transport: Mutex<Option<TransportSession>>,
    receive_loop: Mutex<Option<CancellationToken>>,

    destroyed: AtomicBool,
    on_destroy: Mutex<Option<Cleanup>>,
}

impl SessionManager {
    pub fn new(
        handshake: HandshakeConfig,
        backoff: ReconnectBackoff,
        resume: bool,
        resume_timeout_secs: u64,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                handshake,
                backoff,
                resume_timeout_secs,
                dispatcher,
                state,
                transitions: tokio::sync::Mutex::new(()),
                attempt: AtomicU32::new(0),
                ever_connected: AtomicBool::new(false),
                resume_key: RwLock::new(resume.then(ResumeKey::generate)),
                transport: Mutex::new(None),
                receive_loop: Mutex::new(None),
                destroyed: AtomicBool::new(false),
                on_destroy: Mutex::new(None),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.handshake.node_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Consecutive failed reconnect attempts since the last handshake.
    pub fn attempt(&self) -> u32 {
        self.inner.attempt.load(Ordering::Acquire)
    }

    pub fn resume_key(&self) -> Option<ResumeKey> {
        self.inner.resume_key.read().clone()
    }

    /// Enable or disable resumption. Re-enabling generates a fresh key;
    /// the change applies from the next handshake.
    pub fn set_resuming(&self, enabled: bool) {
        let mut key = self.inner.resume_key.write();
        match (enabled, key.is_some()) {
            (true, false) => *key = Some(ResumeKey::generate()),
            (false, true) => *key = None,
            _ => {}
        }
    }

    /// Register a callback run exactly once by [`destroy`](Self::destroy).
    pub fn on_destroy(&self, cleanup: impl FnOnce() + Send + 'static) {
        *self.inner.on_destroy.lock() = Some(Box::new(cleanup));
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Open the control connection and start the receive loop.
    ///
    /// A no-op when already connected unless `reconnect` is set. Handshake
    /// failures are returned to the caller and no loop is started.
    ///
    /// During an outage (the receive loop is backing off between reopen
    /// attempts) the loop is only replaced once this attempt succeeds, so
    /// a failed explicit connect leaves automatic reconnection running.
    pub async fn connect(&self, reconnect: bool) -> Result<()> {
        let inner = &self.inner;
        if inner.destroyed.load(Ordering::Acquire) {
            return Err(Error::NotConnected(inner.handshake.node_id.clone()));
        }
        let _guard = inner.transitions.lock().await;
        let state = self.state();
        if !reconnect && state == ConnectionState::Connected {
            return Ok(());
        }

        let outage = state != ConnectionState::Connected && inner.loop_running();
        if !outage {
            inner.stop_loop();
            inner.drop_transport();
            inner.state.send_replace(ConnectionState::Connecting);
        }

        let (session, frames) = match inner.open().await {
            Ok(pair) => pair,
            Err(e) => {
                if outage {
                    tracing::warn!(node_id = %inner.handshake.node_id, error = %e, "connect failed; reconnect loop keeps running");
                } else {
                    tracing::warn!(node_id = %inner.handshake.node_id, error = %e, "connect failed");
                    inner.state.send_replace(ConnectionState::Disconnected);
                }
                return Err(e);
            }
        };

        // Retire the back-off loop, if any, before installing: its install
        // checks its own token and loses from here on.
        inner.stop_loop();
        let token = CancellationToken::new();
        if !inner.install(&token, session) {
            return Ok(());
        }
        *inner.receive_loop.lock() = Some(token.clone());
        inner.after_handshake();

        let loop_inner = self.inner.clone();
        tokio::spawn(async move {
            receive_loop(loop_inner, token.clone(), frames).await;
            // Terminal exits (1011, rejected credentials) leave no live loop.
            token.cancel();
        });
        Ok(())
    }

    /// Stop the receive loop and close the transport. The attempt counter
    /// is left untouched. With `reconnect_after`, a fresh connect follows.
    pub async fn disconnect(&self, reconnect_after: bool) -> Result<()> {
        let inner = &self.inner;
        // Cancel before queueing on the lock so a sleeping loop exits now.
        inner.stop_loop();
        {
            let _guard = inner.transitions.lock().await;
            inner.stop_loop();
            if inner.transport.lock().is_some() {
                inner.state.send_replace(ConnectionState::Closing);
            }
            inner.drop_transport();
            inner.state.send_replace(ConnectionState::Disconnected);
        }
        TraceEvent::NodeDisconnected {
            node_id: inner.handshake.node_id.clone(),
            reason: "disconnect requested".into(),
        }
        .emit();

        if reconnect_after {
            self.connect(true).await
        } else {
            Ok(())
        }
    }

    /// Disconnect for good and run the pool-detach callback. Idempotent and
    /// safe to call while a reconnect back-off is sleeping.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.disconnect(false).await {
            tracing::warn!(node_id = %self.node_id(), error = %e, "disconnect during destroy failed");
        }
        let cleanup = self.inner.on_destroy.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        tracing::info!(node_id = %self.node_id(), "node destroyed");
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Outbound
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn send_command(&self, cmd: &OutboundCommand) -> Result<()> {
        let json = cmd.to_json()?;
        let transport = self.inner.transport.lock().clone();
        match transport {
            Some(t) => {
                tracing::trace!(node_id = %self.node_id(), op = cmd.op(), "send");
                t.send(json)
            }
            None => Err(Error::NotConnected(self.node_id().to_owned())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn play(
        &self,
        guild_id: u64,
        track: impl Into<String>,
        start_time: u64,
        end_time: Option<u64>,
        volume: Option<u16>,
        no_replace: bool,
        pause: bool,
    ) -> Result<()> {
        self.send_command(&OutboundCommand::Play {
            guild_id,
            track: track.into(),
            start_time,
            end_time,
            volume,
            no_replace,
            pause,
        })
    }

    pub fn stop(&self, guild_id: u64) -> Result<()> {
        self.send_command(&OutboundCommand::Stop { guild_id })
    }

    pub fn pause(&self, guild_id: u64, pause: bool) -> Result<()> {
        self.send_command(&OutboundCommand::Pause { guild_id, pause })
    }

    pub fn seek(&self, guild_id: u64, position_ms: u64) -> Result<()> {
        self.send_command(&OutboundCommand::Seek {
            guild_id,
            position: position_ms,
        })
    }

    pub fn volume(&self, guild_id: u64, volume: u16) -> Result<()> {
        self.send_command(&OutboundCommand::Volume { guild_id, volume })
    }

    /// Ask the node to destroy the entity's player.
    pub fn destroy_entity(&self, guild_id: u64) -> Result<()> {
        self.send_command(&OutboundCommand::Destroy { guild_id })
    }

    pub fn voice_update(&self, guild_id: u64, session_id: impl Into<String>, event: Value) -> Result<()> {
        self.send_command(&OutboundCommand::VoiceUpdate {
            guild_id,
            session_id: session_id.into(),
            event,
        })
    }

    pub fn filters(&self, guild_id: u64, filters: Map<String, Value>) -> Result<()> {
        self.send_command(&OutboundCommand::Filters { guild_id, filters })
    }

    /// Send `configureResuming` for the current key, if any.
    pub fn configure_resuming(&self) -> Result<()> {
        match self.inner.configure_resuming_command() {
            Some(cmd) => self.send_command(&cmd),
            None => Ok(()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Internals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl SessionInner {
    async fn open(&self) -> Result<(TransportSession, FrameStream)> {
        let key = self.resume_key.read().clone();
        transport::open(&self.handshake, key.as_ref()).await
    }

    /// Make `session` the live transport unless `token` was cancelled
    /// meanwhile. Checked under the transport lock so a concurrent
    /// disconnect either sees the new transport or prevents its install.
    fn install(&self, token: &CancellationToken, session: TransportSession) -> bool {
        let mut slot = self.transport.lock();
        if token.is_cancelled() {
            session.close();
            return false;
        }
        if let Some(old) = slot.replace(session) {
            old.close();
        }
        self.attempt.store(0, Ordering::Release);
        self.state.send_replace(ConnectionState::Connected);
        true
    }

    fn configure_resuming_command(&self) -> Option<OutboundCommand> {
        self.resume_key
            .read()
            .as_ref()
            .map(|key| OutboundCommand::ConfigureResuming {
                key: key.as_str().to_owned(),
                timeout: self.resume_timeout_secs,
            })
    }

    /// Resume bookkeeping common to the first connect and every reopen.
    fn after_handshake(&self) {
        let first = !self.ever_connected.swap(true, Ordering::AcqRel);
        let cmd = if first { None } else { self.configure_resuming_command() };
        let resumed = cmd.is_some();
        if let Some(cmd) = cmd {
            let sent = cmd
                .to_json()
                .map_err(Error::from)
                .and_then(|json| match self.transport.lock().as_ref() {
                    Some(t) => t.send(json),
                    None => Err(Error::NotConnected(self.handshake.node_id.clone())),
                });
            if let Err(e) = sent {
                tracing::warn!(node_id = %self.handshake.node_id, error = %e, "configureResuming failed");
            }
        }
        TraceEvent::NodeConnected {
            node_id: self.handshake.node_id.clone(),
            resumed,
        }
        .emit();
    }

    /// Whether a receive loop is alive, reading or backing off.
    fn loop_running(&self) -> bool {
        self.receive_loop
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    fn stop_loop(&self) {
        if let Some(token) = self.receive_loop.lock().take() {
            token.cancel();
        }
    }

    fn drop_transport(&self) {
        if let Some(t) = self.transport.lock().take() {
            t.close();
        }
    }

    /// Clear the transport and publish `state`, unless the loop was cancelled.
    fn lose_connection(&self, token: &CancellationToken, state: ConnectionState) -> bool {
        let mut slot = self.transport.lock();
        if token.is_cancelled() {
            return false;
        }
        if let Some(t) = slot.take() {
            t.close();
        }
        self.state.send_replace(state);
        true
    }

    fn dropped_state(&self) -> ConnectionState {
        if self.resume_key.read().is_some() {
            ConnectionState::Resuming
        } else {
            ConnectionState::Disconnected
        }
    }
}

async fn receive_loop(inner: Arc<SessionInner>, token: CancellationToken, mut frames: FrameStream) {
    let node_id = inner.handshake.node_id.clone();
    loop {
        // ── Read until the connection ends ───────────────────────────
        let reason = loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                f = frames.next() => f,
            };
            match frame {
                Some(Frame::Text(text)) => {
                    inner.dispatcher.handle_text(&text).await;
                    if token.is_cancelled() {
                        return;
                    }
                }
                Some(Frame::Closed(reason)) => break reason,
                None => break CloseReason::Lost("frame stream exhausted".into()),
            }
        };

        if let CloseReason::RemoteFatal(ref why) = reason {
            if inner.lose_connection(&token, ConnectionState::Disconnected) {
                TraceEvent::NodeFatal {
                    node_id: node_id.clone(),
                    reason: format!("closed with 1011: {why}"),
                }
                .emit();
            }
            return;
        }

        if !inner.lose_connection(&token, inner.dropped_state()) {
            return;
        }
        TraceEvent::NodeDisconnected {
            node_id: node_id.clone(),
            reason: format!("{reason:?}"),
        }
        .emit();

        // ── Reopen with back-off ─────────────────────────────────────
        frames = loop {
            let attempt = inner.attempt.fetch_add(1, Ordering::AcqRel);
            let delay = inner.backoff.delay_for_attempt(attempt);
            TraceEvent::ReconnectScheduled {
                node_id: node_id.clone(),
                attempt: attempt + 1,
                delay_ms: delay.as_millis() as u64,
            }
            .emit();

            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let opened = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                r = inner.open() => r,
            };
            match opened {
                Ok((session, frames)) => {
                    if !inner.install(&token, session) {
                        return;
                    }
                    inner.after_handshake();
                    break frames;
                }
                Err(Error::Auth { .. }) => {
                    if inner.lose_connection(&token, ConnectionState::Disconnected) {
                        TraceEvent::NodeFatal {
                            node_id: node_id.clone(),
                            reason: "credentials rejected during reconnect".into(),
                        }
                        .emit();
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!(node_id = %node_id, attempt = attempt + 1, error = %e, "reconnect failed");
                }
            }
        };
    }
}
