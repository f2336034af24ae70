use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use boards_types::events::OutboundMessage;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const OVERLAY_CONNECTING: &str = "Connecting to board";
pub const OVERLAY_CLOSED: &str = "Not connected, try refreshing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Socket open, handshake (authenticate then join) in flight.
    Authenticating,
    Connected,
    Closing,
    Closed,
}

impl ConnectionState {
    /// The UI accepts gestures only on a live, joined board.
    pub fn is_blocked(self) -> bool {
        self != Self::Connected
    }

    pub fn overlay_text(self) -> Option<&'static str> {
        match self {
            Self::Connected => None,
            Self::Connecting | Self::Authenticating => Some(OVERLAY_CONNECTING),
            Self::Closing | Self::Closed => Some(OVERLAY_CLOSED),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// What the transport task reports back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connecting,
    /// A socket is open. `generation` increases with every new socket.
    Opened { generation: u64 },
    Message(String),
    Closed { reason: String },
}

/// Requests from the session to the transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Message {
        generation: u64,
        message: OutboundMessage,
    },
    /// Drop the current socket and start over.
    Reconnect,
    Shutdown,
}

/// Sending half of the transport. Messages are stamped with the generation
/// they were produced for; the transport silently drops any message whose
/// generation is not the live socket's, or that arrives while disconnected.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbox {
    /// An outbox that is not wired to a socket. The receiver sees everything
    /// the session would send.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, generation: u64, message: OutboundMessage) {
        trace!("Queueing {} for generation {}", message.kind(), generation);
        if self
            .tx
            .send(Outgoing::Message {
                generation,
                message,
            })
            .is_err()
        {
            debug!("Transport gone, dropping outbound message");
        }
    }

    pub fn reconnect(&self) {
        let _ = self.tx.send(Outgoing::Reconnect);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Outgoing::Shutdown);
    }
}

/// Handshake and lifecycle bookkeeping for one session. Every transition
/// returns the new state when it actually changed.
#[derive(Debug, Clone)]
pub struct Link {
    state: ConnectionState,
    generation: Option<u64>,
    authenticated: bool,
    terminal: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl Link {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            generation: None,
            authenticated: false,
            terminal: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the open socket, if any.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn connecting(&mut self) -> Option<ConnectionState> {
        if self.terminal {
            return None;
        }
        self.generation = None;
        self.authenticated = false;
        self.set(ConnectionState::Connecting)
    }

    pub fn opened(&mut self, generation: u64) -> Option<ConnectionState> {
        if self.terminal {
            return None;
        }
        self.generation = Some(generation);
        self.authenticated = false;
        self.set(ConnectionState::Authenticating)
    }

    pub fn authenticated(&mut self) {
        if self.state == ConnectionState::Authenticating {
            self.authenticated = true;
        }
    }

    pub fn board_joined(&mut self) -> Option<ConnectionState> {
        if self.state != ConnectionState::Authenticating || !self.authenticated {
            return None;
        }
        self.set(ConnectionState::Connected)
    }

    pub fn dropped(&mut self) -> Option<ConnectionState> {
        self.generation = None;
        self.authenticated = false;
        self.set(ConnectionState::Closed)
    }

    pub fn close_requested(&mut self) -> Option<ConnectionState> {
        if self.terminal {
            return None;
        }
        self.terminal = true;
        if self.generation.is_none() {
            return self.set(ConnectionState::Closed);
        }
        self.set(ConnectionState::Closing)
    }

    fn set(&mut self, state: ConnectionState) -> Option<ConnectionState> {
        if self.state == state {
            return None;
        }
        info!("Board connection {} -> {}", self.state, state);
        self.state = state;
        Some(state)
    }
}

/// Start the transport task for `url`. It reconnects after `reconnect_delay`
/// whenever the socket fails or drops, until `Outbox::shutdown` is called or
/// the event receiver is dropped.
pub fn open(
    url: String,
    reconnect_delay: Duration,
) -> (Outbox, mpsc::UnboundedReceiver<TransportEvent>) {
    let (outbox, outgoing) = Outbox::pair();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_transport(url, reconnect_delay, outgoing, events_tx));
    (outbox, events_rx)
}

enum Exit {
    Shutdown,
    Dropped(String),
}

async fn run_transport(
    url: String,
    reconnect_delay: Duration,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut generation: u64 = 0;

    loop {
        if events.send(TransportEvent::Connecting).is_err() {
            return;
        }

        let reason = match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                generation += 1;
                info!("Connected to {} (generation {})", url, generation);
                if events.send(TransportEvent::Opened { generation }).is_err() {
                    return;
                }
                match pump(socket, generation, &mut outgoing, &events).await {
                    Exit::Shutdown => {
                        let _ = events.send(TransportEvent::Closed {
                            reason: "closed by client".into(),
                        });
                        info!("Transport for {} shut down", url);
                        return;
                    }
                    Exit::Dropped(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        warn!("Connection to {} lost: {}", url, reason);
        if events.send(TransportEvent::Closed { reason }).is_err() {
            return;
        }

        // Wait out the reconnect delay. Anything queued meanwhile was
        // produced for a socket that no longer exists.
        let sleep = tokio::time::sleep(reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                msg = outgoing.recv() => match msg {
                    None | Some(Outgoing::Shutdown) => {
                        info!("Transport for {} shut down while disconnected", url);
                        return;
                    }
                    Some(Outgoing::Message { message, .. }) => {
                        debug!("Not connected, dropping {}", message.kind());
                    }
                    Some(Outgoing::Reconnect) => {}
                },
            }
        }
    }
}

async fn pump(
    socket: Socket,
    generation: u64,
    outgoing: &mut mpsc::UnboundedReceiver<Outgoing>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Exit {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    trace!("<- {}", text.as_str());
                    if events.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                        let _ = sink.send(Message::Close(None)).await;
                        return Exit::Shutdown;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".into());
                    return Exit::Dropped(reason);
                }
                // Pings are answered by tungstenite; binary frames are not part
                // of the board protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Exit::Dropped(e.to_string()),
                None => return Exit::Dropped("stream ended".into()),
            },
            msg = outgoing.recv() => match msg {
                None | Some(Outgoing::Shutdown) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Exit::Shutdown;
                }
                Some(Outgoing::Reconnect) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Exit::Dropped("reconnect requested".into());
                }
                Some(Outgoing::Message { generation: stamped, message }) => {
                    if stamped != generation {
                        debug!(
                            "Dropping {} produced for stale generation {}",
                            message.kind(),
                            stamped
                        );
                        continue;
                    }
                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode {}: {}", message.kind(), e);
                            continue;
                        }
                    };
                    trace!("-> {}", text);
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        return Exit::Dropped(e.to_string());
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boards_types::events::BoardCommand;
    use uuid::Uuid;

    #[test]
    fn handshake_reaches_connected() {
        let mut link = Link::new();
        assert_eq!(link.state(), ConnectionState::Connecting);
        assert_eq!(link.opened(1), Some(ConnectionState::Authenticating));
        // joining before authentication does nothing
        assert_eq!(link.board_joined(), None);
        link.authenticated();
        assert_eq!(link.board_joined(), Some(ConnectionState::Connected));
        assert_eq!(link.board_joined(), None);
        assert_eq!(link.generation(), Some(1));
    }

    #[test]
    fn drop_then_reconnect_repeats_handshake() {
        let mut link = Link::new();
        link.opened(1);
        link.authenticated();
        link.board_joined();

        assert_eq!(link.dropped(), Some(ConnectionState::Closed));
        assert!(link.generation().is_none());
        assert_eq!(link.connecting(), Some(ConnectionState::Connecting));
        assert_eq!(link.opened(2), Some(ConnectionState::Authenticating));
        assert!(!link.authenticated);
    }

    #[test]
    fn close_is_terminal() {
        let mut link = Link::new();
        link.opened(1);
        assert_eq!(link.close_requested(), Some(ConnectionState::Closing));
        assert_eq!(link.dropped(), Some(ConnectionState::Closed));
        assert_eq!(link.connecting(), None);
        assert_eq!(link.opened(2), None);
        assert_eq!(link.state(), ConnectionState::Closed);
    }

    #[test]
    fn overlay_texts() {
        assert_eq!(ConnectionState::Connected.overlay_text(), None);
        assert_eq!(
            ConnectionState::Authenticating.overlay_text(),
            Some("Connecting to board")
        );
        assert_eq!(
            ConnectionState::Closed.overlay_text(),
            Some("Not connected, try refreshing")
        );
        assert!(ConnectionState::Closing.is_blocked());
    }

    #[test]
    fn outbox_stamps_generation() {
        let (outbox, mut rx) = Outbox::pair();
        let message = OutboundMessage::new(BoardCommand::ConnectBoard {
            board_id: Uuid::nil(),
        });
        outbox.send(3, message.clone());
        outbox.reconnect();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outgoing::Message {
                generation: 3,
                message
            }
        );
        assert_eq!(rx.try_recv().unwrap(), Outgoing::Reconnect);
    }
}
