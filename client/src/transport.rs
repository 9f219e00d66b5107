use thiserror::Error;

use pizarra_shared::stomp::{parse_frames, Command, Frame, HeartBeat, Negotiated, ACCEPT_VERSIONS};

pub type MessageHandler = Box<dyn FnMut(&str)>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not open socket to {url}: {reason}")]
    Socket { url: String, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Inactive,
    Connecting,
    Connected,
    /// Socket lost; a reconnect is scheduled.
    Waiting,
}

/// Pub/sub session as the session controller sees it.
///
/// `publish` is best effort: while disconnected it drops the body and
/// returns `false`. Subscriptions survive reconnects.
pub trait Transport {
    fn subscribe(&mut self, destination: &str, handler: MessageHandler);
    fn publish(&mut self, destination: &str, body: &str) -> bool;
    fn activate(&mut self) -> Result<(), TransportError>;
    fn deactivate(&mut self);
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub url: String,
    pub host: String,
    pub reconnect_delay_ms: u32,
    pub heartbeat: HeartBeat,
}

struct Subscription {
    id: String,
    destination: String,
    handler: MessageHandler,
}

/// What the socket driver should do after feeding the session a message.
#[derive(Debug, Default)]
pub struct Reaction {
    pub outgoing: Vec<Frame>,
    /// Set when this message completed the handshake.
    pub connected: Option<Negotiated>,
}

/// STOMP client protocol state, independent of any socket.
///
/// Also owns the reconnect and liveness decisions; the socket driver only
/// carries them out.
pub struct StompSession {
    host: String,
    heartbeat: HeartBeat,
    reconnect_delay_ms: u32,
    active: bool,
    last_inbound: f64,
    state: ConnectionState,
    negotiated: Negotiated,
    subscriptions: Vec<Subscription>,
    next_subscription: u32,
    next_receipt: u32,
}

impl StompSession {
    pub fn new(host: impl Into<String>, heartbeat: HeartBeat, reconnect_delay_ms: u32) -> Self {
        Self {
            host: host.into(),
            heartbeat,
            reconnect_delay_ms,
            active: false,
            last_inbound: 0.0,
            state: ConnectionState::Inactive,
            negotiated: Negotiated::default(),
            subscriptions: Vec::new(),
            next_subscription: 0,
            next_receipt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn negotiated(&self) -> Negotiated {
        self.negotiated
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns `false` when the session was already active.
    pub fn activate(&mut self) -> bool {
        !std::mem::replace(&mut self.active, true)
    }

    /// Returns `false` when the session was already inactive.
    pub fn deactivate(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
        self.negotiated = Negotiated::default();
    }

    /// The socket is open; the handshake starts with CONNECT.
    pub fn on_open(&mut self) -> Frame {
        self.state = ConnectionState::Connecting;
        Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSIONS)
            .header("host", self.host.clone())
            .header("heart-beat", self.heartbeat.to_string())
    }

    /// Forgets the connection after the socket closed or could not be
    /// opened. Subscriptions stay registered so they are re-issued after the
    /// next CONNECTED.
    ///
    /// Returns the delay before the next attempt. An active session retries
    /// forever at the same fixed delay; a deactivated one never does.
    pub fn on_closed(&mut self) -> Option<u32> {
        self.negotiated = Negotiated::default();
        if self.active {
            self.state = ConnectionState::Waiting;
            Some(self.reconnect_delay_ms)
        } else {
            self.state = ConnectionState::Inactive;
            None
        }
    }

    /// Records broker traffic, heart-beat EOLs included.
    pub fn note_inbound(&mut self, now_ms: f64) {
        self.last_inbound = now_ms;
    }

    /// True once the broker has been silent for more than twice the
    /// negotiated incoming heart-beat period.
    pub fn watchdog_expired(&self, now_ms: f64) -> bool {
        match self.negotiated.expect_every {
            Some(period) if self.is_connected() => {
                now_ms - self.last_inbound > f64::from(period) * 2.0
            }
            _ => false,
        }
    }

    pub fn subscribe(&mut self, destination: &str, handler: MessageHandler) -> Option<Frame> {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        let frame = subscribe_frame(&id, destination);
        self.subscriptions.push(Subscription {
            id,
            destination: destination.to_string(),
            handler,
        });
        self.is_connected().then_some(frame)
    }

    pub fn send_frame(&self, destination: &str, body: &str) -> Option<Frame> {
        if !self.is_connected() {
            return None;
        }
        Some(
            Frame::new(Command::Send)
                .header("destination", destination)
                .header("content-type", "application/json")
                .body(body),
        )
    }

    pub fn disconnect_frame(&mut self) -> Option<Frame> {
        if !self.is_connected() {
            return None;
        }
        let receipt = format!("close-{}", self.next_receipt);
        self.next_receipt += 1;
        Some(Frame::new(Command::Disconnect).header("receipt", receipt))
    }

    /// Feeds one socket text message. MESSAGE bodies reach their handlers
    /// in the order they appear.
    pub fn on_text(&mut self, text: &str) -> Reaction {
        let mut reaction = Reaction::default();
        let frames = match parse_frames(text) {
            Ok(frames) => frames,
            Err(error) => {
                log::warn!("Dropping unreadable STOMP message: {error}");
                return reaction;
            }
        };
        for frame in frames {
            match frame.command {
                Command::Connected => {
                    let server = frame
                        .get("heart-beat")
                        .and_then(HeartBeat::parse)
                        .unwrap_or(HeartBeat::DISABLED);
                    self.negotiated = self.heartbeat.negotiate(server);
                    self.state = ConnectionState::Connected;
                    log::info!(
                        "STOMP connected version={} heart-beat={server}",
                        frame.get("version").unwrap_or("1.0")
                    );
                    reaction.outgoing.extend(
                        self.subscriptions
                            .iter()
                            .map(|sub| subscribe_frame(&sub.id, &sub.destination)),
                    );
                    reaction.connected = Some(self.negotiated);
                }
                Command::Message => self.deliver(&frame),
                Command::Receipt => {
                    log::debug!("STOMP receipt {}", frame.get("receipt-id").unwrap_or(""));
                }
                Command::Error => {
                    log::warn!(
                        "STOMP error message={:?} body={:?}",
                        frame.get("message").unwrap_or(""),
                        frame.body
                    );
                }
                other => log::debug!("Ignoring unexpected {other} frame"),
            }
        }
        reaction
    }

    fn deliver(&mut self, frame: &Frame) {
        if !self.is_connected() {
            return;
        }
        let subscription = match frame.get("subscription") {
            Some(id) => self.subscriptions.iter_mut().find(|s| s.id == id),
            None => {
                let destination = frame.get("destination").unwrap_or("");
                self.subscriptions
                    .iter_mut()
                    .find(|s| s.destination == destination)
            }
        };
        match subscription {
            Some(subscription) => (subscription.handler)(&frame.body),
            None => log::debug!("MESSAGE for unknown subscription dropped"),
        }
    }
}

fn subscribe_frame(id: &str, destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", id)
        .header("destination", destination)
        .header("ack", "auto")
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
