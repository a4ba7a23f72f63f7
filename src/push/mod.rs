//! Push channel client
//!
//! Keeps one WebSocket to the Macrochat push server alive: connect, log in,
//! subscribe, heartbeat, and reconnect after a fixed delay whenever the
//! connection drops.

pub mod frames;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::events::{EventEmitter, SyncEvent};
use crate::normalize::Normalizer;
use frames::{parse_inbound, InboundFrame, MonitoredEvents, OutgoingFrame};

pub use websocket::WsTransport;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Opens push connections. Implemented over WebSocket, and in memory for tests.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushSocket>>;
}

/// One open push connection.
#[async_trait]
pub trait PushSocket: Send {
    async fn send_text(&mut self, msg: &str) -> Result<()>;

    /// Next text frame, or `None` once the connection is closed.
    async fn recv_frame(&mut self) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Authenticating,
    Subscribed,
}

#[derive(Debug, Clone)]
pub struct PushSettings {
    pub url: String,
    pub token: String,
    pub events: MonitoredEvents,
    pub heartbeat: Duration,
    pub reconnect_delay: Duration,
}

impl PushSettings {
    pub fn new(url: impl Into<String>, token: impl Into<String>, events: MonitoredEvents) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            events,
            heartbeat: HEARTBEAT_PERIOD,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Why a session loop returned without error.
enum SessionEnd {
    /// Cancelled. Do not reconnect.
    Shutdown,
    /// Server closed the connection.
    Closed,
}

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    settings: PushSettings,
    normalizer: Arc<Normalizer>,
    emitter: EventEmitter,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        settings: PushSettings,
        normalizer: Arc<Normalizer>,
        emitter: EventEmitter,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            transport,
            settings,
            normalizer,
            emitter,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::debug!("Push state -> {:?}", state);
        self.state.send_replace(state);
    }

    /// Keep the push connection up until `cancel` fires.
    ///
    /// Every close or failure, authentication rejection included, is
    /// followed by exactly one reconnect attempt after the fixed delay.
    pub async fn run(self, cancel: CancellationToken) {
        let delay = self.settings.reconnect_delay;

        loop {
            let outcome = self.run_session(&cancel).await;
            self.set_state(ConnectionState::Closed);

            match outcome {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => {
                    tracing::warn!("Push connection lost. Reconnecting in {:?}...", delay);
                }
                Err(Error::Authentication) => {
                    tracing::error!("Push authentication failed. Retrying in {:?}...", delay);
                }
                Err(e) => {
                    tracing::warn!("Push connection failed: {}. Reconnecting in {:?}...", e, delay);
                }
            }

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!("Push channel stopped");
    }

    /// One connection: connect, log in, then pump frames and heartbeats.
    ///
    /// The heartbeat timer belongs to this call, so it cannot outlive the
    /// connection it pings.
    async fn run_session(&self, cancel: &CancellationToken) -> Result<SessionEnd> {
        self.set_state(ConnectionState::Connecting);
        let mut ws = tokio::select! {
            ws = self.transport.connect(&self.settings.url) => ws?,
            _ = cancel.cancelled() => return Ok(SessionEnd::Shutdown),
        };

        self.set_state(ConnectionState::Authenticating);
        let period = self.settings.heartbeat;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);

        tracing::debug!("Sending push login");
        let login = OutgoingFrame::Login {
            token: self.settings.token.clone(),
        };
        ws.send_text(&login.to_json()?).await?;

        let ping = OutgoingFrame::Ping.to_json()?;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionEnd::Shutdown),
                frame = ws.recv_frame() => {
                    match frame? {
                        Some(text) => self.handle_frame(ws.as_mut(), &text).await?,
                        None => return Ok(SessionEnd::Closed),
                    }
                }
                _ = heartbeat.tick() => {
                    ws.send_text(&ping).await?;
                }
            }
        }
    }

    async fn handle_frame(&self, ws: &mut dyn PushSocket, text: &str) -> Result<()> {
        let frame = match parse_inbound(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Ignoring malformed push frame: {}", e);
                return Ok(());
            }
        };

        match frame {
            InboundFrame::LoginAck {
                authenticated: true,
            } => {
                tracing::info!("Push login accepted, subscribing");
                for frame in self.settings.events.frames() {
                    ws.send_text(&frame.to_json()?).await?;
                }
                self.set_state(ConnectionState::Subscribed);
                self.emitter.emit(SyncEvent::ConnectionOpened);
            }
            InboundFrame::LoginAck {
                authenticated: false,
            } => return Err(Error::Authentication),
            InboundFrame::ConnectionStatus { uuid } => {
                // Device state is refreshed by full reloads only.
                tracing::debug!("Connection status push for {:?}", uuid);
            }
            InboundFrame::Message(message) => {
                let normalizer = Arc::clone(&self.normalizer);
                let emitter = self.emitter.clone();
                let id = message.id_mensagem;
                tokio::spawn(async move {
                    match normalizer.normalize(*message).await {
                        Ok(message) => emitter.emit(SyncEvent::Message(message)),
                        Err(e) => tracing::error!("Dropping message {}: {}", id, e),
                    }
                });
            }
            InboundFrame::Other { method } => {
                tracing::debug!("Unhandled push frame {:?}", method);
            }
        }
        Ok(())
    }
}
