use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::Reflect;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, Document, HtmlButtonElement, HtmlCanvasElement, HtmlInputElement,
    HtmlSpanElement, Window,
};

use crate::config::SessionConfig;
use crate::dom::{event_to_point, find_element, get_element, set_tool_button, update_size_label, Listener};
use crate::render;
use crate::session::SessionController;
use crate::tools::ToolState;
use crate::transport::ConnectionState;
use crate::ws::StompClient;

const BOARD_ID: &str = "board";

thread_local! {
    static MOUNTED: RefCell<Option<Whiteboard>> = const { RefCell::new(None) };
}

fn debug_enabled(window: &Window) -> bool {
    let search = window.location().search().ok().unwrap_or_default();
    search.contains("debug=1") || search.contains("debug=true")
}

fn document_ready_state(document: &Document) -> Option<String> {
    Reflect::get(document.as_ref(), &JsValue::from_str("readyState"))
        .ok()?
        .as_string()
}

fn to_js(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let level = if debug_enabled(&window) {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    // a second module instance on the page already installed the logger
    let _ = console_log::init_with_level(level);

    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    if document_ready_state(&document).as_deref() == Some("loading") {
        let onready = Closure::once_into_js(move || {
            if let Err(err) = auto_mount() {
                web_sys::console::error_1(&err);
            }
        });
        document.add_event_listener_with_callback("DOMContentLoaded", onready.unchecked_ref())?;
        return Ok(());
    }
    auto_mount()
}

/// Mounts on `<canvas id="board">` when the page has one. Its `data-config`
/// attribute holds the session configuration as JSON.
fn auto_mount() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    let Some(canvas) = find_element::<HtmlCanvasElement>(&document, BOARD_ID) else {
        log::debug!("No #{BOARD_ID} canvas on the page, waiting for an embedder");
        return Ok(());
    };
    let config = canvas.get_attribute("data-config");
    let board = Whiteboard::mount(&window, &document, canvas, config.as_deref(), true)?;
    MOUNTED.with(|slot| {
        if let Some(mut previous) = slot.replace(Some(board)) {
            previous.unmount();
        }
    });
    Ok(())
}

struct Board {
    controller: SessionController<StompClient>,
    tools: ToolState,
    pointer: Option<(i32, i32)>,
    ctx: CanvasRenderingContext2d,
}

impl Board {
    /// One animation frame: sample the pointer, then upload what changed.
    fn frame(&mut self) {
        if self.controller.is_shut_down() {
            return;
        }
        if let Some((x, y)) = self.pointer {
            if self.controller.is_active() {
                self.controller.tick(x, y, &self.tools);
            }
        }
        let ctx = &self.ctx;
        if let Err(err) = self.controller.with_surface(|surface| render::present(ctx, surface)) {
            log::warn!("Canvas upload failed: {err:?}");
        }
    }
}

/// `requestAnimationFrame` loop, cancelled when dropped.
struct FrameLoop {
    window: Window,
    callback: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>,
    handle: Rc<Cell<Option<i32>>>,
}

impl FrameLoop {
    fn start(window: &Window, board: Rc<RefCell<Board>>) -> Result<Self, JsValue> {
        let callback: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::new(RefCell::new(None));
        let handle = Rc::new(Cell::new(None));
        {
            let next = callback.clone();
            let handle = handle.clone();
            let window = window.clone();
            *callback.borrow_mut() = Some(Closure::<dyn FnMut(f64)>::new(move |_: f64| {
                board.borrow_mut().frame();
                if let Some(cb) = next.borrow().as_ref() {
                    handle.set(window.request_animation_frame(cb.as_ref().unchecked_ref()).ok());
                }
            }));
        }
        let first = arm(&*callback, |cb| {
            window.request_animation_frame(cb.as_ref().unchecked_ref())
        })?;
        handle.set(first);
        Ok(Self {
            window: window.clone(),
            callback,
            handle,
        })
    }
}

/// Requests the first frame for the callback in `slot`. On failure the slot
/// is emptied, which frees the callback along with the slot handle it holds.
fn arm<C, E>(
    slot: &RefCell<Option<C>>,
    request: impl FnOnce(&C) -> Result<i32, E>,
) -> Result<Option<i32>, E> {
    let result = match slot.borrow().as_ref() {
        Some(callback) => request(callback).map(Some),
        None => Ok(None),
    };
    if result.is_err() {
        slot.borrow_mut().take();
    }
    result
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if let Some(id) = self.handle.take() {
            let _ = self.window.cancel_animation_frame(id);
        }
        // breaks the closure -> Rc cycle
        self.callback.borrow_mut().take();
    }
}

/// A mounted whiteboard. Embedders with their own toolbar drive it through
/// the exported methods; `unmount` (or `free`) releases the socket, the
/// frame loop, every listener and the pixel buffer.
#[wasm_bindgen]
pub struct Whiteboard {
    board: Rc<RefCell<Board>>,
    listeners: Vec<Listener>,
    frame: Option<FrameLoop>,
}

#[wasm_bindgen]
impl Whiteboard {
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: &str, config_json: Option<String>) -> Result<Whiteboard, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("Missing document"))?;
        let canvas: HtmlCanvasElement = get_element(&document, canvas_id)?;
        Self::mount(&window, &document, canvas, config_json.as_deref(), false)
    }

    pub fn unmount(&mut self) {
        self.listeners.clear();
        self.frame = None;
        self.board.borrow_mut().controller.shutdown();
    }

    pub fn request_clear(&self) -> bool {
        self.board.borrow_mut().controller.request_clear()
    }

    pub fn set_color(&self, color: &str) {
        self.board.borrow_mut().tools.set_color(color);
    }

    pub fn set_thickness(&self, thickness: u32) {
        self.board.borrow_mut().tools.set_thickness(thickness);
    }

    pub fn set_eraser(&self, eraser: bool) {
        self.board.borrow_mut().tools.set_eraser(eraser);
    }

    pub fn is_connected(&self) -> bool {
        self.board.borrow().controller.connection_state() == ConnectionState::Connected
    }
}

impl Whiteboard {
    fn mount(
        window: &Window,
        document: &Document,
        canvas: HtmlCanvasElement,
        config_json: Option<&str>,
        with_toolbar: bool,
    ) -> Result<Whiteboard, JsValue> {
        let config = match config_json.map(str::trim) {
            Some(text) if !text.is_empty() => SessionConfig::from_json(text).map_err(to_js)?,
            _ => SessionConfig::default(),
        };
        canvas.set_width(config.width);
        canvas.set_height(config.height);
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("Missing 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;

        let location = window.location();
        let url = config
            .endpoint_url(&location.protocol()?, &location.host()?)
            .map_err(to_js)?;
        let transport = StompClient::new(config.transport(url));
        let controller = SessionController::initialize(&config, transport).map_err(to_js)?;

        let board = Rc::new(RefCell::new(Board {
            controller,
            tools: ToolState::default(),
            pointer: None,
            ctx,
        }));
        let mut listeners = pointer_listeners(window, &canvas, &board)?;
        if with_toolbar {
            listeners.extend(toolbar_listeners(document, &board)?);
        }
        {
            let board = board.clone();
            listeners.push(Listener::new(window.as_ref(), "beforeunload", move |_| {
                board.borrow_mut().controller.shutdown();
            })?);
        }
        let frame = FrameLoop::start(window, board.clone())?;

        Ok(Whiteboard {
            board,
            listeners,
            frame: Some(frame),
        })
    }
}

impl Drop for Whiteboard {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Presses start on the canvas; moves and releases are tracked on the
/// window so a stroke keeps going when the pointer leaves the canvas.
fn pointer_listeners(
    window: &Window,
    canvas: &HtmlCanvasElement,
    board: &Rc<RefCell<Board>>,
) -> Result<Vec<Listener>, JsValue> {
    let mut listeners = Vec::new();
    {
        let board = board.clone();
        let target = canvas.clone();
        listeners.push(Listener::pointer(canvas.as_ref(), "pointerdown", move |event| {
            let Some((x, y)) = event_to_point(&target, event) else {
                return;
            };
            let mut board = board.borrow_mut();
            board.pointer = Some((x, y));
            if board.controller.pointer_down(x, y) {
                event.prevent_default();
                let _ = target.set_pointer_capture(event.pointer_id());
            }
        })?);
    }
    {
        let board = board.clone();
        let target = canvas.clone();
        listeners.push(Listener::pointer(window.as_ref(), "pointermove", move |event| {
            if let Some(point) = event_to_point(&target, event) {
                board.borrow_mut().pointer = Some(point);
            }
        })?);
    }
    for kind in ["pointerup", "pointercancel"] {
        let board = board.clone();
        listeners.push(Listener::pointer(window.as_ref(), kind, move |_| {
            board.borrow_mut().controller.pointer_up();
        })?);
    }
    Ok(listeners)
}

/// Wires the page's toolbar. Every control is optional.
fn toolbar_listeners(document: &Document, board: &Rc<RefCell<Board>>) -> Result<Vec<Listener>, JsValue> {
    let mut listeners = Vec::new();

    if let Some(color_input) = find_element::<HtmlInputElement>(document, "color") {
        board.borrow_mut().tools.set_color(color_input.value());
        let board = board.clone();
        let input = color_input.clone();
        listeners.push(Listener::new(color_input.as_ref(), "input", move |_| {
            board.borrow_mut().tools.set_color(input.value());
        })?);
    }

    if let Some(size_input) = find_element::<HtmlInputElement>(document, "size") {
        let size_value = find_element::<HtmlSpanElement>(document, "sizeValue");
        let apply = {
            let board = board.clone();
            let input = size_input.clone();
            move || {
                if let Ok(thickness) = input.value().trim().parse::<u32>() {
                    board.borrow_mut().tools.set_thickness(thickness);
                }
                if let Some(label) = &size_value {
                    update_size_label(&input, label);
                }
            }
        };
        apply();
        listeners.push(Listener::new(size_input.as_ref(), "input", move |_| apply())?);
    }

    if let Some(eraser_button) = find_element::<HtmlButtonElement>(document, "eraser") {
        set_tool_button(&eraser_button, board.borrow().tools.eraser());
        let board = board.clone();
        let button = eraser_button.clone();
        listeners.push(Listener::new(eraser_button.as_ref(), "click", move |_| {
            let eraser = board.borrow_mut().tools.toggle_eraser();
            set_tool_button(&button, eraser);
            log::debug!("Eraser {}", if eraser { "on" } else { "off" });
        })?);
    }

    if let Some(clear_button) = find_element::<HtmlButtonElement>(document, "clear") {
        let board = board.clone();
        listeners.push(Listener::new(clear_button.as_ref(), "click", move |_| {
            board.borrow_mut().controller.request_clear();
        })?);
    }

    Ok(listeners)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stands in for the frame closure, which captures its own slot.
    struct Callback {
        _slot: Rc<RefCell<Option<Callback>>>,
    }

    fn cyclic_slot() -> Rc<RefCell<Option<Callback>>> {
        let slot = Rc::new(RefCell::new(None));
        *slot.borrow_mut() = Some(Callback { _slot: slot.clone() });
        slot
    }

    #[test]
    fn failed_first_frame_frees_the_callback() {
        let slot = cyclic_slot();
        let weak = Rc::downgrade(&slot);

        let result: Result<Option<i32>, &str> = arm(&*slot, |_| Err("no frames"));
        assert_eq!(result, Err("no frames"));
        assert!(slot.borrow().is_none());

        drop(slot);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn armed_callback_stays_in_place() {
        let slot = cyclic_slot();
        let result: Result<Option<i32>, &str> = arm(&*slot, |_| Ok(7));
        assert_eq!(result, Ok(Some(7)));
        assert!(slot.borrow().is_some());

        // dropping the loop breaks the cycle the same way
        slot.borrow_mut().take();
        assert_eq!(Rc::strong_count(&slot), 1);
    }
}
