use std::{future, time::Duration};

use futures::{Sink, SinkExt, StreamExt};
use reqwest::Url;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep, sleep_until, timeout_at},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::{
    config::{ClientConfig, ReconnectPolicy},
    dto::ws::{EVENT_REQUEST_UPDATE, Framing, InboundFrame, OutboundFrame, PushEvent},
};

/// Capacity of the channel carrying push events to the driver.
const EVENT_BUFFER: usize = 64;

/// Transitions and payloads reported by the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is up and accepts commands.
    Connected,
    /// An established connection was lost.
    Disconnected {
        /// Human readable cause, for logs.
        reason: String,
    },
    /// A connect attempt failed before the channel came up.
    ConnectError {
        /// Human readable cause, for logs.
        reason: String,
    },
    /// Application event received while connected.
    Event(PushEvent),
}

/// Requests the driver can make of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Ask the server to rebroadcast the current state.
    RequestUpdate,
}

/// Owning handle on a running push channel.
///
/// Dropping the handle aborts the channel task, pending reconnects included.
pub struct PushHandle {
    events: mpsc::Receiver<ChannelEvent>,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    task: Option<JoinHandle<()>>,
}

impl PushHandle {
    /// Assemble a handle from its channels and the task feeding them.
    pub fn from_parts(
        events: mpsc::Receiver<ChannelEvent>,
        commands: mpsc::UnboundedSender<ChannelCommand>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            events,
            commands,
            task,
        }
    }

    /// Next channel event, or `None` once the channel has given up or been closed.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Queue a `request_update` emit. Returns `false` when the channel is gone.
    pub fn request_update(&self) -> bool {
        self.commands.send(ChannelCommand::RequestUpdate).is_ok()
    }

    /// Stop the channel task and refuse further events.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory for push channels.
pub trait PushConnector: Send + Sync {
    /// Spawn a channel that connects, reconnects per its policy and reports through the handle.
    fn open(&self) -> PushHandle;
}

/// [`PushConnector`] speaking WebSocket via `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: Url,
    framing: Framing,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Connector for an explicit WebSocket endpoint.
    pub fn new(
        endpoint: Url,
        framing: Framing,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            framing,
            policy,
            connect_timeout,
        }
    }

    /// Connector derived from the backend origin, or `None` for non-HTTP(S) origins.
    pub fn from_config(backend: &Url, config: &ClientConfig) -> Option<Self> {
        let endpoint = config.framing.endpoint(backend)?;
        Some(Self::new(
            endpoint,
            config.framing,
            config.reconnect.clone(),
            config.connect_timeout,
        ))
    }

    /// Endpoint the channel dials.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl PushConnector for WebSocketConnector {
    fn open(&self) -> PushHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_channel(self.clone(), events_tx, commands_rx));
        PushHandle::from_parts(events_rx, commands_tx, Some(task))
    }
}

/// How a single connection attempt ended.
enum SessionEnd {
    /// The channel never came up.
    Failed(String),
    /// The channel was up, then dropped.
    Disconnected(String),
    /// The handle went away; stop for good.
    Closed,
}

fn session_end(connected: bool, reason: impl Into<String>) -> SessionEnd {
    if connected {
        SessionEnd::Disconnected(reason.into())
    } else {
        SessionEnd::Failed(reason.into())
    }
}

async fn run_channel(
    connector: WebSocketConnector,
    events: mpsc::Sender<ChannelEvent>,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
) {
    // Reconnect attempts since the last established connection.
    let mut attempt: u32 = 0;

    loop {
        while commands.try_recv().is_ok() {}

        let event = match run_session(&connector, &events, &mut commands).await {
            SessionEnd::Closed => return,
            SessionEnd::Disconnected(reason) => {
                attempt = 0;
                ChannelEvent::Disconnected { reason }
            }
            SessionEnd::Failed(reason) => ChannelEvent::ConnectError { reason },
        };
        if events.send(event).await.is_err() {
            return;
        }

        attempt = attempt.saturating_add(1);
        if !connector.policy.allows(attempt) {
            warn!(
                endpoint = %connector.endpoint,
                attempts = attempt - 1,
                "push channel reconnect attempts exhausted; giving up"
            );
            return;
        }

        let delay = connector.policy.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling push reconnect");
        sleep(delay).await;
    }
}

async fn run_session(
    connector: &WebSocketConnector,
    events: &mpsc::Sender<ChannelEvent>,
    commands: &mut mpsc::UnboundedReceiver<ChannelCommand>,
) -> SessionEnd {
    let framing = connector.framing;
    let handshake_deadline = Instant::now() + connector.connect_timeout;

    let socket = match timeout_at(handshake_deadline, connect_async(connector.endpoint.as_str())).await
    {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(err)) => return SessionEnd::Failed(err.to_string()),
        Err(_) => return SessionEnd::Failed("connect timed out".into()),
    };
    debug!(endpoint = %connector.endpoint, "push socket upgraded");

    let (mut sink, mut stream) = socket.split();
    let mut connected = false;
    let mut liveness: Option<Duration> = None;
    let mut last_seen = Instant::now();

    if framing.connected_on_upgrade() {
        connected = true;
        debug!(endpoint = %connector.endpoint, "push channel handshake complete");
        if events.send(ChannelEvent::Connected).await.is_err() {
            return SessionEnd::Closed;
        }
    }

    loop {
        let deadline = if connected {
            liveness.map(|window| last_seen + window)
        } else {
            Some(handshake_deadline)
        };

        tokio::select! {
            inbound = stream.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return session_end(connected, "closed by server");
                    }
                    Some(Ok(_)) => {
                        last_seen = Instant::now();
                        continue;
                    }
                    Some(Err(err)) => return session_end(connected, err.to_string()),
                };
                last_seen = Instant::now();

                let frame = match framing.decode(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "dropping undecodable push frame");
                        continue;
                    }
                };

                match frame {
                    InboundFrame::Open { liveness: window } => {
                        liveness = window;
                        if let Err(err) = send_frame(&mut sink, framing.encode(OutboundFrame::Connect)).await {
                            return session_end(connected, err.to_string());
                        }
                    }
                    InboundFrame::Connected => {
                        if !connected {
                            connected = true;
                            debug!(endpoint = %connector.endpoint, "push channel handshake complete");
                            if events.send(ChannelEvent::Connected).await.is_err() {
                                return SessionEnd::Closed;
                            }
                        }
                    }
                    InboundFrame::ConnectError(reason) => return SessionEnd::Failed(reason),
                    InboundFrame::Disconnect => {
                        return session_end(connected, "disconnected by server");
                    }
                    InboundFrame::Ping => {
                        if let Err(err) = send_frame(&mut sink, framing.encode(OutboundFrame::Pong)).await {
                            return session_end(connected, err.to_string());
                        }
                    }
                    InboundFrame::Event(event) => {
                        if events.send(ChannelEvent::Event(event)).await.is_err() {
                            return SessionEnd::Closed;
                        }
                    }
                    InboundFrame::Ignored => {}
                }
            }
            command = commands.recv(), if connected => {
                match command {
                    Some(ChannelCommand::RequestUpdate) => {
                        let frame = framing.encode(OutboundFrame::Emit(EVENT_REQUEST_UPDATE));
                        if let Err(err) = send_frame(&mut sink, frame).await {
                            return session_end(connected, err.to_string());
                        }
                        debug!("requested state rebroadcast");
                    }
                    None => return SessionEnd::Closed,
                }
            }
            _ = wait_until(deadline) => {
                let reason = if connected { "ping timeout" } else { "handshake timed out" };
                return session_end(connected, reason);
            }
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: Option<String>) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    match frame {
        Some(text) => sink.send(Message::Text(text)).await,
        None => Ok(()),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
