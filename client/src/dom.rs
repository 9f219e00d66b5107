use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Event, EventTarget, HtmlButtonElement, HtmlCanvasElement, HtmlInputElement,
    HtmlSpanElement, PointerEvent,
};

pub fn get_element<T: JsCast>(document: &Document, id: &str) -> Result<T, JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("Missing element: {id}")))?;
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {id}")))
}

/// Like `get_element`, for controls the page may leave out.
pub fn find_element<T: JsCast>(document: &Document, id: &str) -> Option<T> {
    document.get_element_by_id(id)?.dyn_into::<T>().ok()
}

pub fn update_size_label(input: &HtmlInputElement, value: &HtmlSpanElement) {
    value.set_text_content(Some(&input.value()));
}

pub fn set_tool_button(button: &HtmlButtonElement, active: bool) {
    let pressed = if active { "true" } else { "false" };
    let _ = button.set_attribute("aria-pressed", pressed);
}

/// Maps a pointer position onto surface pixels. The canvas may be displayed
/// at a different CSS size than its backing store, and its border is not
/// part of the drawing area.
pub fn event_to_point(canvas: &HtmlCanvasElement, event: &PointerEvent) -> Option<(i32, i32)> {
    let rect = canvas.get_bounding_client_rect();
    let x = to_surface(
        f64::from(event.client_x()) - rect.left(),
        canvas.client_left(),
        canvas.client_width(),
        canvas.width(),
    )?;
    let y = to_surface(
        f64::from(event.client_y()) - rect.top(),
        canvas.client_top(),
        canvas.client_height(),
        canvas.height(),
    )?;
    Some((x, y))
}

/// One axis of `event_to_point`. `offset` is measured from the outer edge
/// of the element's box; `border` and `content` come from `clientLeft` and
/// `clientWidth` (or their vertical twins).
pub fn to_surface(offset: f64, border: i32, content: i32, backing: u32) -> Option<i32> {
    if content <= 0 {
        return None;
    }
    let scale = f64::from(backing) / f64::from(content);
    Some(((offset - f64::from(border)) * scale).round() as i32)
}

/// Event listener that unregisters itself when dropped.
pub struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl Listener {
    pub fn new(
        target: &EventTarget,
        kind: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(Event)>::new(handler);
        target.add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            kind,
            callback,
        })
    }

    /// Pointer variant; other event types reaching it are ignored.
    pub fn pointer(
        target: &EventTarget,
        kind: &'static str,
        mut handler: impl FnMut(&PointerEvent) + 'static,
    ) -> Result<Self, JsValue> {
        Self::new(target, kind, move |event: Event| {
            if let Some(event) = event.dyn_ref::<PointerEvent>() {
                handler(event);
            }
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref());
    }
}
