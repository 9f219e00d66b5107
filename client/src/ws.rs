use std::cell::RefCell;
use std::rc::{Rc, Weak};

use gloo_timers::callback::{Interval, Timeout};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

use pizarra_shared::stomp::{Frame, Negotiated, HEARTBEAT_EOL};

use crate::transport::{
    ConnectionState, MessageHandler, StompSession, Transport, TransportConfig, TransportError,
};

/// STOMP over a browser WebSocket with fixed-delay reconnects.
///
/// Socket callbacks and timers only hold weak references, so dropping the
/// client releases everything even if the page keeps the socket object.
pub struct StompClient {
    shared: Rc<RefCell<Shared>>,
}

struct Shared {
    config: TransportConfig,
    session: StompSession,
    socket: Option<WebSocket>,
    handlers: Option<SocketHandlers>,
    reconnect: Option<Timeout>,
    heartbeat: Option<Interval>,
    watchdog: Option<Interval>,
}

struct SocketHandlers {
    _onopen: Closure<dyn FnMut(Event)>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
    _onerror: Closure<dyn FnMut(Event)>,
}

impl StompClient {
    pub fn new(config: TransportConfig) -> Self {
        let session = StompSession::new(
            config.host.clone(),
            config.heartbeat,
            config.reconnect_delay_ms,
        );
        Self {
            shared: Rc::new(RefCell::new(Shared {
                config,
                session,
                socket: None,
                handlers: None,
                reconnect: None,
                heartbeat: None,
                watchdog: None,
            })),
        }
    }

    pub fn url(&self) -> String {
        self.shared.borrow().config.url.clone()
    }
}

impl Transport for StompClient {
    fn subscribe(&mut self, destination: &str, handler: MessageHandler) {
        let mut shared = self.shared.borrow_mut();
        if let Some(frame) = shared.session.subscribe(destination, handler) {
            shared.send(&frame);
        }
    }

    fn publish(&mut self, destination: &str, body: &str) -> bool {
        let shared = self.shared.borrow();
        match shared.session.send_frame(destination, body) {
            Some(frame) => shared.send(&frame),
            None => false,
        }
    }

    fn activate(&mut self) -> Result<(), TransportError> {
        if !self.shared.borrow_mut().session.activate() {
            return Ok(());
        }
        let result = connect(&self.shared);
        if result.is_err() {
            self.shared.borrow_mut().session.deactivate();
        }
        result
    }

    fn deactivate(&mut self) {
        let mut shared = self.shared.borrow_mut();
        if !shared.session.deactivate() {
            return;
        }
        if let Some(frame) = shared.session.disconnect_frame() {
            shared.send(&frame);
        }
        shared.reconnect = None;
        shared.stop_heartbeats();
        shared.close_socket();
        shared.session.on_closed();
        log::info!("Disconnected from {}", shared.config.url);
    }

    fn state(&self) -> ConnectionState {
        self.shared.borrow().session.state()
    }
}

impl Drop for StompClient {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl Shared {
    fn send(&self, frame: &Frame) -> bool {
        self.send_raw(&frame.encode())
    }

    fn send_raw(&self, text: &str) -> bool {
        match &self.socket {
            Some(socket) if socket.ready_state() == WebSocket::OPEN => {
                socket.send_with_str(text).is_ok()
            }
            _ => false,
        }
    }

    /// Must not run from inside one of the socket's own callbacks, since it
    /// drops them.
    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            detach(&socket);
            let _ = socket.close();
        }
        self.handlers = None;
    }

    fn stop_heartbeats(&mut self) {
        self.heartbeat = None;
        self.watchdog = None;
    }

    fn start_heartbeats(&mut self, negotiated: Negotiated, weak: Weak<RefCell<Shared>>) {
        self.stop_heartbeats();
        self.heartbeat = negotiated.send_every.map(|period| {
            let weak = weak.clone();
            Interval::new(period, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.borrow().send_raw(HEARTBEAT_EOL);
                }
            })
        });
        self.watchdog = negotiated.expect_every.map(|period| {
            Interval::new(period, move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let shared = shared.borrow();
                if shared.session.watchdog_expired(js_sys::Date::now()) {
                    log::warn!("No broker traffic for over {}ms, closing socket", period * 2);
                    if let Some(socket) = &shared.socket {
                        let _ = socket.close();
                    }
                }
            })
        });
    }
}

fn detach(socket: &WebSocket) {
    socket.set_onopen(None);
    socket.set_onmessage(None);
    socket.set_onclose(None);
    socket.set_onerror(None);
}

fn connect(shared: &Rc<RefCell<Shared>>) -> Result<(), TransportError> {
    let weak = Rc::downgrade(shared);
    let mut state = shared.borrow_mut();
    state.close_socket();
    let url = state.config.url.clone();
    let socket = WebSocket::new(&url).map_err(|error| TransportError::Socket {
        url: url.clone(),
        reason: format!("{error:?}"),
    })?;
    state.session.begin_connect();
    state.handlers = Some(attach(&socket, &weak));
    state.socket = Some(socket);
    log::info!("Connecting to {url}");
    Ok(())
}

fn attach(socket: &WebSocket, weak: &Weak<RefCell<Shared>>) -> SocketHandlers {
    let onopen = {
        let weak = weak.clone();
        Closure::<dyn FnMut(Event)>::new(move |_| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut state = shared.borrow_mut();
            state.session.note_inbound(js_sys::Date::now());
            let frame = state.session.on_open();
            state.send(&frame);
            log::debug!("Socket open, sent CONNECT");
        })
    };
    socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));

    let onmessage = {
        let weak = weak.clone();
        Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let Some(text) = event.data().as_string() else {
                log::debug!("Ignoring non-text socket message");
                return;
            };
            on_text(&shared, &text);
        })
    };
    socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

    let onclose = {
        let weak = weak.clone();
        Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            on_closed(&shared, event.code(), &event.reason());
        })
    };
    socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));

    let onerror = {
        let url = socket.url();
        Closure::<dyn FnMut(Event)>::new(move |_| {
            log::warn!("Socket error on {url}");
        })
    };
    socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));

    SocketHandlers {
        _onopen: onopen,
        _onmessage: onmessage,
        _onclose: onclose,
        _onerror: onerror,
    }
}

fn on_text(shared: &Rc<RefCell<Shared>>, text: &str) {
    let weak = Rc::downgrade(shared);
    let mut state = shared.borrow_mut();
    state.session.note_inbound(js_sys::Date::now());
    let reaction = state.session.on_text(text);
    for frame in &reaction.outgoing {
        state.send(frame);
    }
    if let Some(negotiated) = reaction.connected {
        state.start_heartbeats(negotiated, weak);
    }
}

fn on_closed(shared: &Rc<RefCell<Shared>>, code: u16, reason: &str) {
    let weak = Rc::downgrade(shared);
    let mut state = shared.borrow_mut();
    state.stop_heartbeats();
    // handlers stay alive until the next connect replaces them
    if let Some(socket) = state.socket.take() {
        detach(&socket);
    }
    let Some(delay) = state.session.on_closed() else {
        return;
    };
    log::warn!("Socket closed code={code} reason={reason:?}, reconnecting in {delay}ms");
    schedule_reconnect(&mut state, delay, weak);
}

fn schedule_reconnect(state: &mut Shared, delay: u32, weak: Weak<RefCell<Shared>>) {
    state.reconnect = Some(Timeout::new(delay, move || {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        if !shared.borrow().session.is_active() {
            return;
        }
        if let Err(error) = connect(&shared) {
            log::warn!("Reconnect failed: {error}");
            let weak = Rc::downgrade(&shared);
            let mut state = shared.borrow_mut();
            if let Some(delay) = state.session.on_closed() {
                schedule_reconnect(&mut state, delay, weak);
            }
        }
    }));
}
