use pizarra_shared::stomp::{parse_frames, Command, Frame, VERSION};
use pizarra_shared::{decode, Inbound};
use uuid::Uuid;

use crate::state::{Broker, Outbound};

const SERVER_NAME: &str = "pizarra-relay";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Feeds one socket text message from `sender` through the broker. Bare
/// EOLs are heart-beats and produce no frames.
pub fn apply_text(broker: &mut Broker, sender: Uuid, text: &str) -> Flow {
    let frames = match parse_frames(text) {
        Ok(frames) => frames,
        Err(error) => {
            tracing::warn!(%sender, %error, "unparsable frame");
            return reject(broker, sender, "malformed frame", &error.to_string());
        }
    };
    for frame in frames {
        if apply_frame(broker, sender, frame) == Flow::Close {
            return Flow::Close;
        }
    }
    Flow::Continue
}

pub fn apply_frame(broker: &mut Broker, sender: Uuid, frame: Frame) -> Flow {
    let connected = match broker.peers.get(&sender) {
        Some(peer) => peer.connected,
        None => return Flow::Close,
    };
    if !connected && !matches!(frame.command, Command::Connect | Command::Stomp) {
        return reject(broker, sender, "not connected", "CONNECT must be the first frame");
    }

    match frame.command {
        Command::Connect | Command::Stomp => {
            if let Some(peer) = broker.peers.get_mut(&sender) {
                peer.connected = true;
            }
            tracing::debug!(%sender, "stomp session opened");
            let reply = Frame::new(Command::Connected)
                .header("version", VERSION)
                .header("heart-beat", "0,0")
                .header("server", SERVER_NAME);
            send(broker, sender, &reply);
        }
        Command::Subscribe => {
            let (Some(id), Some(destination)) = (frame.get("id"), frame.get("destination")) else {
                return reject(broker, sender, "invalid SUBSCRIBE", "id and destination are required");
            };
            if let Some(peer) = broker.peers.get_mut(&sender) {
                peer.subscriptions
                    .push((id.to_string(), destination.to_string()));
            }
            tracing::debug!(%sender, id, destination, "subscribed");
        }
        Command::Unsubscribe => {
            if let (Some(id), Some(peer)) = (frame.get("id"), broker.peers.get_mut(&sender)) {
                peer.subscriptions.retain(|(sub, _)| sub != id);
            }
        }
        Command::Send => {
            let Some(destination) = frame.get("destination") else {
                return reject(broker, sender, "invalid SEND", "destination is required");
            };
            match broker.routes.resolve(destination).map(str::to_string) {
                Some(topic) => fan_out(broker, &topic, &frame),
                None => tracing::warn!(%sender, destination, "SEND to unrouted destination dropped"),
            }
        }
        Command::Disconnect => {
            acknowledge(broker, sender, &frame);
            tracing::debug!(%sender, "stomp session closed");
            return Flow::Close;
        }
        Command::Ack | Command::Nack | Command::Begin | Command::Commit | Command::Abort => {
            tracing::debug!(%sender, command = %frame.command, "ignored");
        }
        Command::Connected | Command::Message | Command::Receipt | Command::Error => {
            return reject(
                broker,
                sender,
                "unexpected frame",
                &format!("{} is a server frame", frame.command),
            );
        }
    }
    acknowledge(broker, sender, &frame);
    Flow::Continue
}

/// Delivers a SEND body to every subscription on `topic`, the sender's own
/// included. Callers hold the broker lock, so all peers see one order.
fn fan_out(broker: &mut Broker, topic: &str, frame: &Frame) {
    if tracing::enabled!(tracing::Level::TRACE) {
        let kind = match decode(&frame.body) {
            Inbound::Stroke(_) => "stroke",
            Inbound::Clear => "clear",
            Inbound::Unknown => "unknown",
        };
        tracing::trace!(topic, kind, "fan-out");
    }
    let message_id = broker.next_message_id;
    broker.next_message_id += 1;
    let content_type = frame.get("content-type").unwrap_or("application/json");

    let mut stale = Vec::new();
    for (peer_id, peer) in &broker.peers {
        for (subscription, destination) in &peer.subscriptions {
            if destination != topic {
                continue;
            }
            let message = Frame::new(Command::Message)
                .header("destination", topic)
                .header("subscription", subscription.as_str())
                .header("message-id", message_id.to_string())
                .header("content-type", content_type)
                .body(frame.body.as_str());
            if peer.tx.send(Outbound::Text(message.encode())).is_err() {
                stale.push(*peer_id);
            }
        }
    }
    for peer_id in stale {
        broker.leave(peer_id);
    }
}

fn acknowledge(broker: &Broker, sender: Uuid, frame: &Frame) {
    if let Some(receipt) = frame.get("receipt") {
        let reply = Frame::new(Command::Receipt).header("receipt-id", receipt);
        send(broker, sender, &reply);
    }
}

fn reject(broker: &Broker, sender: Uuid, message: &str, details: &str) -> Flow {
    let error = Frame::new(Command::Error)
        .header("message", message)
        .header("content-type", "text/plain")
        .body(details);
    send(broker, sender, &error);
    if let Some(peer) = broker.peers.get(&sender) {
        let _ = peer.tx.send(Outbound::Close);
    }
    Flow::Close
}

fn send(broker: &Broker, peer: Uuid, frame: &Frame) {
    if let Some(peer) = broker.peers.get(&peer) {
        let _ = peer.tx.send(Outbound::Text(frame.encode()));
    }
}
