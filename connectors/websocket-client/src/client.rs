use futures_util::{SinkExt, StreamExt};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{select, sync::Notify, time::sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use wms_realtime_core::{ChangeTransport, ChannelHandle, TransportError, TransportSink};
use wms_realtime_proto::{ChannelStatus, Topic};

use crate::{
    config::WebsocketConfig,
    message::{Inbound, PhoenixMessage},
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("join rejected: {0}")]
    JoinRejected(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("not joined within {0:?}")]
    JoinTimeout(Duration),
    #[error("heartbeat not acknowledged")]
    HeartbeatTimeout,
}

impl ClientError {
    fn status(&self) -> ChannelStatus {
        match self {
            ClientError::JoinTimeout(_) | ClientError::HeartbeatTimeout => ChannelStatus::TimedOut,
            e => ChannelStatus::ChannelError(e.to_string()),
        }
    }
}

/// Change-feed transport speaking Phoenix channels over a websocket.
///
/// Each [`open`](ChangeTransport::open) is one socket with one channel join; reconnection is the
/// manager's job, so a dropped socket is simply reported as `closed`.
pub struct WebsocketTransport {
    config: WebsocketConfig,
    access_token: RwLock<Option<String>>,
}

impl WebsocketTransport {
    pub fn new(config: WebsocketConfig) -> Self {
        info!("Creating websocket transport for {}", config.endpoint);
        Self { config, access_token: RwLock::new(None) }
    }

    /// Token presented on the next join. Without one the api key is used.
    pub fn set_access_token(&self, token: Option<String>) { *self.access_token.write().expect("Failed to lock access token") = token; }

    fn access_token(&self) -> String {
        self.access_token.read().expect("Failed to lock access token").clone().unwrap_or_else(|| self.config.api_key.clone())
    }
}

impl ChangeTransport for WebsocketTransport {
    fn open(&self, channel: &str, topics: &[Topic], sink: TransportSink) -> Result<Box<dyn ChannelHandle>, TransportError> {
        let url = self.config.socket_url().map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        let shared = Arc::new(Shared { shutdown: Notify::new(), shutdown_requested: AtomicBool::new(false) });

        let session = Session {
            url: url.to_string(),
            topic: format!("realtime:{}", channel),
            tables: topics.to_vec(),
            schema: self.config.schema.clone(),
            access_token: self.access_token(),
            heartbeat_interval: self.config.heartbeat_interval,
            join_timeout: self.config.join_timeout,
            next_ref: 0,
        };
        tokio::spawn(session.run(sink, shared.clone()));

        Ok(Box::new(WebsocketChannel { shared }))
    }
}

struct Shared {
    shutdown: Notify,
    shutdown_requested: AtomicBool,
}

/// Handle for one socket; closing sends `phx_leave` and closes the socket
pub struct WebsocketChannel {
    shared: Arc<Shared>,
}

impl ChannelHandle for WebsocketChannel {
    fn close(&self) {
        if !self.shared.shutdown_requested.swap(true, Ordering::AcqRel) {
            // notify_one stores a permit, so a session between awaits still sees it
            self.shared.shutdown.notify_one();
        }
    }
}

impl Drop for WebsocketChannel {
    fn drop(&mut self) { self.close(); }
}

struct Session {
    url: String,
    topic: String,
    tables: Vec<Topic>,
    schema: String,
    access_token: String,
    heartbeat_interval: Duration,
    join_timeout: Duration,
    next_ref: u64,
}

impl Session {
    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn run(mut self, sink: TransportSink, shared: Arc<Shared>) {
        let result = self.connect_once(&sink, &shared).await;
        if shared.shutdown_requested.load(Ordering::Acquire) {
            debug!("{} session for {} ended after close", sink.connection_id(), self.topic);
            return;
        }
        match result {
            Ok(()) => {
                info!("Channel {} closed", self.topic);
                sink.status(ChannelStatus::Closed);
            }
            Err(e) => {
                warn!("Channel {} failed: {}", self.topic, e);
                sink.status(e.status());
            }
        }
    }

    async fn connect_once(&mut self, sink: &TransportSink, shared: &Shared) -> Result<(), ClientError> {
        info!("Attempting to connect to {}", self.topic);
        // the handshake and the join reply share one budget
        let join_deadline = sleep(self.join_timeout);
        tokio::pin!(join_deadline);

        let (ws_stream, _) = select! {
            connected = connect_async(self.url.as_str()) => connected?,
            _ = &mut join_deadline => return Err(ClientError::JoinTimeout(self.join_timeout)),
            _ = shared.shutdown.notified() => return Ok(()),
        };
        debug!("WebSocket handshake completed for {}", self.topic);

        let (mut ws_sink, mut stream) = ws_stream.split();

        let join_ref = self.next_ref();
        let join = PhoenixMessage::join(&self.topic, &join_ref, &self.schema, &self.tables, &self.access_token);
        ws_sink.send(Message::text(join.encode()?)).await?;
        debug!("Sent join for {} ({} tables)", self.topic, self.tables.len());

        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + self.heartbeat_interval, self.heartbeat_interval);
        let mut joined = false;
        let mut pending_heartbeat: Option<String> = None;

        loop {
            select! {
                _ = shared.shutdown.notified() => {
                    debug!("Leaving {}", self.topic);
                    let msg_ref = self.next_ref();
                    let leave = PhoenixMessage::leave(&self.topic, &msg_ref);
                    let _ = ws_sink.send(Message::text(leave.encode()?)).await;
                    let _ = ws_sink.close().await;
                    return Ok(());
                }
                _ = &mut join_deadline, if !joined => {
                    return Err(ClientError::JoinTimeout(self.join_timeout));
                }
                _ = heartbeat.tick() => {
                    if pending_heartbeat.is_some() {
                        return Err(ClientError::HeartbeatTimeout);
                    }
                    let msg_ref = self.next_ref();
                    ws_sink.send(Message::text(PhoenixMessage::heartbeat(&msg_ref).encode()?)).await?;
                    pending_heartbeat = Some(msg_ref);
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let inbound = PhoenixMessage::decode(text.as_str())
                                .map_err(Into::into)
                                .and_then(|message| Inbound::classify(message, &self.topic, &join_ref));
                            match inbound {
                                Ok(Inbound::Joined) => {
                                    info!("Joined {}", self.topic);
                                    joined = true;
                                    sink.status(ChannelStatus::Subscribed);
                                }
                                Ok(Inbound::JoinRejected(reason)) => return Err(ClientError::JoinRejected(reason)),
                                Ok(Inbound::HeartbeatAck(msg_ref)) => {
                                    if pending_heartbeat.as_deref() == Some(msg_ref.as_str()) {
                                        pending_heartbeat = None;
                                    }
                                }
                                Ok(Inbound::Change(event)) => sink.change(event),
                                Ok(Inbound::ChannelError(reason)) => return Err(ClientError::Channel(reason)),
                                Ok(Inbound::ChannelClosed) => return Ok(()),
                                Ok(Inbound::Ignored) => {}
                                Err(e) => warn!("Failed to decode message on {}: {}", self.topic, e),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("WebSocket connection closed by server");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            info!("WebSocket stream closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
