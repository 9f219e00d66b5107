use std::cell::RefCell;
use std::rc::Rc;

use super::*;

const RECONNECT_MS: u32 = 5000;

fn session() -> StompSession {
    StompSession::new(
        "example.org",
        HeartBeat {
            outgoing: 10000,
            incoming: 10000,
        },
        RECONNECT_MS,
    )
}

fn recorder() -> (Rc<RefCell<Vec<String>>>, MessageHandler) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    (seen, Box::new(move |body: &str| sink.borrow_mut().push(body.to_string())))
}

fn message(subscription: &str, body: &str) -> String {
    Frame::new(Command::Message)
        .header("destination", "/topic/pizarra")
        .header("subscription", subscription)
        .header("message-id", "m-1")
        .body(body)
        .encode()
}

fn connect(session: &mut StompSession, heart_beat: &str) -> Reaction {
    session.activate();
    session.begin_connect();
    session.on_open();
    let connected = Frame::new(Command::Connected)
        .header("version", "1.2")
        .header("heart-beat", heart_beat)
        .encode();
    session.on_text(&connected)
}

#[test]
fn handshake_starts_with_connect() {
    let mut session = session();
    session.begin_connect();
    assert_eq!(session.state(), ConnectionState::Connecting);
    let frame = session.on_open();
    assert_eq!(frame.command, Command::Connect);
    assert_eq!(frame.get("accept-version"), Some("1.2,1.1,1.0"));
    assert_eq!(frame.get("host"), Some("example.org"));
    assert_eq!(frame.get("heart-beat"), Some("10000,10000"));
    assert!(!session.is_connected());
}

#[test]
fn connected_reissues_registered_subscriptions() {
    let mut session = session();
    let (_, handler) = recorder();
    assert!(session.subscribe("/topic/pizarra", handler).is_none());

    let reaction = connect(&mut session, "0,20000");
    assert!(session.is_connected());
    assert_eq!(reaction.outgoing.len(), 1);
    assert_eq!(reaction.outgoing[0].command, Command::Subscribe);
    assert_eq!(reaction.outgoing[0].get("id"), Some("sub-0"));
    assert_eq!(reaction.outgoing[0].get("destination"), Some("/topic/pizarra"));
    assert_eq!(
        reaction.connected,
        Some(Negotiated {
            send_every: Some(20000),
            expect_every: None,
        })
    );
}

#[test]
fn subscribing_while_connected_returns_the_frame() {
    let mut session = session();
    connect(&mut session, "0,0");
    let (_, handler) = recorder();
    let frame = session.subscribe("/topic/other", handler).expect("frame");
    assert_eq!(frame.get("destination"), Some("/topic/other"));
}

#[test]
fn messages_reach_their_handler_in_order() {
    let mut session = session();
    let (pizarra, handler) = recorder();
    session.subscribe("/topic/pizarra", handler);
    let (other, handler) = recorder();
    session.subscribe("/topic/other", handler);
    connect(&mut session, "0,0");

    let batch = format!(
        "{}\n{}{}",
        message("sub-0", "first"),
        message("sub-1", "elsewhere"),
        message("sub-0", "second")
    );
    session.on_text(&batch);

    assert_eq!(*pizarra.borrow(), vec!["first", "second"]);
    assert_eq!(*other.borrow(), vec!["elsewhere"]);
}

#[test]
fn messages_without_subscription_header_match_by_destination() {
    let mut session = session();
    let (seen, handler) = recorder();
    session.subscribe("/topic/pizarra", handler);
    connect(&mut session, "0,0");
    let frame = Frame::new(Command::Message)
        .header("destination", "/topic/pizarra")
        .body("{}")
        .encode();
    session.on_text(&frame);
    assert_eq!(*seen.borrow(), vec!["{}"]);
}

#[test]
fn send_requires_a_connection() {
    let mut session = session();
    assert!(session.send_frame("/app/draw", "{}").is_none());
    connect(&mut session, "0,0");
    let frame = session.send_frame("/app/draw", "{}").expect("frame");
    assert_eq!(frame.command, Command::Send);
    assert_eq!(frame.get("destination"), Some("/app/draw"));
    assert_eq!(frame.body, "{}");

    assert_eq!(session.on_closed(), Some(RECONNECT_MS));
    assert_eq!(session.state(), ConnectionState::Waiting);
    assert!(session.send_frame("/app/draw", "{}").is_none());
}

#[test]
fn reconnect_resubscribes_with_the_same_ids() {
    let mut session = session();
    let (seen, handler) = recorder();
    session.subscribe("/topic/pizarra", handler);
    connect(&mut session, "0,0");
    session.on_closed();

    session.on_text(&message("sub-0", "while-down"));
    let reaction = connect(&mut session, "0,0");
    assert_eq!(reaction.outgoing[0].get("id"), Some("sub-0"));
    session.on_text(&message("sub-0", "after"));
    assert_eq!(*seen.borrow(), vec!["after"]);
}

#[test]
fn disconnect_only_when_connected() {
    let mut session = session();
    assert!(session.disconnect_frame().is_none());
    connect(&mut session, "0,0");
    let frame = session.disconnect_frame().expect("frame");
    assert_eq!(frame.command, Command::Disconnect);
    assert!(frame.get("receipt").is_some());
    assert!(session.deactivate());
    assert_eq!(session.on_closed(), None);
    assert_eq!(session.state(), ConnectionState::Inactive);
}

#[test]
fn errors_and_garbage_are_tolerated() {
    let mut session = session();
    let (seen, handler) = recorder();
    session.subscribe("/topic/pizarra", handler);
    connect(&mut session, "0,0");

    let error = Frame::new(Command::Error)
        .header("message", "boom")
        .body("details")
        .encode();
    assert!(session.on_text(&error).outgoing.is_empty());
    assert!(session.on_text("NOT A FRAME").outgoing.is_empty());
    assert!(session.on_text("\n").outgoing.is_empty());
    assert!(seen.borrow().is_empty());
    assert!(session.is_connected());
}

#[test]
fn activation_is_idempotent() {
    let mut session = session();
    assert!(!session.is_active());
    assert!(session.activate());
    assert!(!session.activate());
    assert!(session.deactivate());
    assert!(!session.deactivate());
    assert!(!session.is_active());
}

#[test]
fn dropped_socket_schedules_a_reconnect_at_the_fixed_delay() {
    let mut session = session();
    let (seen, handler) = recorder();
    session.subscribe("/topic/pizarra", handler);
    connect(&mut session, "10000,10000");

    assert_eq!(session.on_closed(), Some(RECONNECT_MS));
    assert_eq!(session.state(), ConnectionState::Waiting);
    assert_eq!(session.negotiated(), Negotiated::default());

    // the timer fires and the new socket completes the handshake
    assert!(session.is_active());
    let reaction = connect(&mut session, "0,0");
    assert_eq!(reaction.outgoing[0].get("id"), Some("sub-0"));
    session.on_text(&message("sub-0", "back"));
    assert_eq!(*seen.borrow(), vec!["back"]);
}

#[test]
fn failed_reconnects_keep_retrying_without_backoff() {
    let mut session = session();
    connect(&mut session, "0,0");
    assert_eq!(session.on_closed(), Some(RECONNECT_MS));
    for _ in 0..5 {
        // the socket never opens
        session.begin_connect();
        assert_eq!(session.on_closed(), Some(RECONNECT_MS));
        assert_eq!(session.state(), ConnectionState::Waiting);
    }
}

#[test]
fn deactivated_session_does_not_reconnect() {
    let mut session = session();
    connect(&mut session, "0,0");
    session.on_closed();
    // shutdown lands while the reconnect timer is pending
    session.deactivate();
    assert!(!session.is_active());
    assert_eq!(session.on_closed(), None);
    assert_eq!(session.state(), ConnectionState::Inactive);
}

#[test]
fn watchdog_fires_after_twice_the_incoming_period() {
    let mut session = session();
    // server sends every 4000ms; the client accepts every 10000ms or slower
    let reaction = connect(&mut session, "4000,0");
    let period = reaction
        .connected
        .and_then(|negotiated| negotiated.expect_every)
        .expect("incoming heart-beats");
    assert_eq!(period, 10000);

    session.note_inbound(1000.0);
    assert!(!session.watchdog_expired(1000.0 + 20000.0));
    assert!(session.watchdog_expired(1000.0 + 20001.0));

    // any inbound traffic resets the clock
    session.note_inbound(21000.0);
    assert!(!session.watchdog_expired(30000.0));
}

#[test]
fn watchdog_stays_quiet_without_incoming_heartbeats() {
    let mut silent = session();
    connect(&mut silent, "0,0");
    silent.note_inbound(0.0);
    assert!(!silent.watchdog_expired(1.0e9));

    let mut closed = session();
    connect(&mut closed, "4000,0");
    closed.note_inbound(0.0);
    closed.on_closed();
    assert!(!closed.watchdog_expired(1.0e9));
}
