use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

use super::stomp::{self, StompCommand, StompFrame, negotiate_heartbeat};
use crate::config::EndpointConfig;
use crate::domain::{
    ConnectError, Connector, ControlFrame, FrameSink, Identity, InboundFrame, Link, LinkEvent,
    SendError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

const EVENT_CAPACITY: usize = 1024;

/// STOMP-over-WebSocket connector for the order update endpoint
/// Infrastructure component - handles WebSocket communication
pub struct StompConnector {
    url: Url,
    host: String,
    heartbeat: Duration,
    connect_timeout: Duration,
}

impl StompConnector {
    pub fn new(url: &str) -> Result<Self, ConnectError> {
        let url = Url::parse(url).map_err(|e| ConnectError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectError::InvalidUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        let host = url.host_str().unwrap_or("localhost").to_string();

        Ok(StompConnector {
            url,
            host,
            heartbeat: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, ConnectError> {
        let mut connector = StompConnector::new(&config.url)?
            .with_heartbeat(config.heartbeat())
            .with_connect_timeout(config.connect_timeout());
        if let Some(host) = &config.host {
            connector.host = host.clone();
        }
        Ok(connector)
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    async fn handshake(&self, identity: &Identity) -> Result<(WsWrite, WsRead, (u64, u64)), ConnectError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectError::Network(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let connect = StompFrame::connect(&self.host, identity.token.as_deref(), self.heartbeat);
        write
            .send(Message::Text(connect.encode().into()))
            .await
            .map_err(|e| ConnectError::Network(e.to_string()))?;

        let connected = await_connected(&mut read).await?;
        let server_heartbeat = connected.heart_beat().unwrap_or((0, 0));
        tracing::debug!(
            version = connected.get("version").unwrap_or("?"),
            ?server_heartbeat,
            "STOMP session established"
        );

        Ok((write, read, server_heartbeat))
    }
}

#[async_trait]
impl Connector for StompConnector {
    async fn connect(&self, identity: &Identity) -> Result<Link, ConnectError> {
        tracing::debug!(url = %self.url, user = %identity.user_id, "Connecting");

        let (write, read, server_heartbeat) = timeout(self.connect_timeout, self.handshake(identity))
            .await
            .map_err(|_| ConnectError::Handshake("timed out".to_string()))??;

        let ours = self.heartbeat.as_millis() as u64;
        let (send_every, expect_every) = negotiate_heartbeat((ours, ours), server_heartbeat);

        // Channel for sending control frames to the WebSocket
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Outgoing>();

        // Channel for receiving events from the WebSocket
        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(EVENT_CAPACITY);

        tokio::spawn(write_loop(write, out_rx, send_every, event_tx.clone()));
        tokio::spawn(read_loop(read, event_tx, expect_every));

        Ok(Link {
            sink: Arc::new(StompSink { tx: out_tx }),
            events: event_rx,
        })
    }
}

async fn await_connected(read: &mut WsRead) -> Result<StompFrame, ConnectError> {
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Close(frame)) => {
                return Err(ConnectError::Handshake(format!(
                    "closed before CONNECTED: {:?}",
                    frame
                )));
            }
            Ok(_) => continue,
            Err(e) => return Err(ConnectError::Network(e.to_string())),
        };

        let frames = stomp::decode(&text).map_err(|e| ConnectError::Handshake(e.to_string()))?;
        for frame in frames {
            match frame.command {
                StompCommand::Connected => return Ok(frame),
                StompCommand::Error => {
                    let message = frame.get("message").unwrap_or("").to_string();
                    return Err(ConnectError::Refused(format!("{} {}", message, frame.body)));
                }
                other => tracing::trace!(command = %other, "Ignoring frame before CONNECTED"),
            }
        }
    }

    Err(ConnectError::Handshake("stream ended before CONNECTED".to_string()))
}

enum Outgoing {
    Frame(ControlFrame),
    Close,
}

/// Outbound half handed to the session
struct StompSink {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl FrameSink for StompSink {
    fn send(&self, frame: ControlFrame) -> Result<(), SendError> {
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| SendError::ChannelClosed)
    }

    fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

async fn write_loop(
    mut write: WsWrite,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    send_every: Option<Duration>,
    events: mpsc::Sender<LinkEvent>,
) {
    let mut ticker = send_every.map(|every| {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let message = tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(Outgoing::Frame(frame)) => StompFrame::from(&frame).encode(),
                Some(Outgoing::Close) | None => break,
            },
            _ = next_tick(&mut ticker) => "\n".to_string(),
        };

        if let Err(e) = write.send(Message::Text(message.into())).await {
            let _ = events.send(LinkEvent::Error(e.to_string())).await;
            return;
        }
    }

    // Best-effort graceful teardown
    let _ = write
        .send(Message::Text(StompFrame::disconnect().encode().into()))
        .await;
    let _ = write.close().await;
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn read_loop(mut read: WsRead, events: mpsc::Sender<LinkEvent>, expect_every: Option<Duration>) {
    // Allow twice the negotiated interval before declaring the server gone
    let grace = expect_every.map(|every| every * 2);

    loop {
        let next = match grace {
            Some(grace) => match timeout(grace, read.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let _ = events
                        .send(LinkEvent::Error("heart-beat timeout".to_string()))
                        .await;
                    return;
                }
            },
            None => read.next().await,
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!("Dropping non UTF-8 binary message");
                    continue;
                }
            },
            Some(Ok(Message::Ping(data))) => {
                tracing::trace!("Received ping: {:?}", data);
                continue;
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!("Received close frame: {:?}", frame);
                let _ = events.send(LinkEvent::Closed).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                let _ = events.send(LinkEvent::Error(e.to_string())).await;
                return;
            }
            None => {
                let _ = events.send(LinkEvent::Closed).await;
                return;
            }
        };

        let frames = match stomp::decode(&text) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable STOMP frame");
                continue;
            }
        };

        for frame in frames {
            match frame.command {
                StompCommand::Message => {
                    let Some(destination) = frame.get("destination") else {
                        tracing::warn!("MESSAGE without destination header");
                        continue;
                    };
                    let inbound = InboundFrame::new(destination, frame.body.as_str());
                    if events.send(LinkEvent::Frame(inbound)).await.is_err() {
                        return;
                    }
                }
                StompCommand::Error => {
                    // Servers close the connection after ERROR
                    let message = frame.get("message").unwrap_or("").to_string();
                    let _ = events
                        .send(LinkEvent::Error(format!("STOMP ERROR {} {}", message, frame.body)))
                        .await;
                    return;
                }
                other => tracing::trace!(command = %other, "Ignoring frame"),
            }
        }
    }
}
