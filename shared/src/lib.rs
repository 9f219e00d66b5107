use serde::Serialize;
use serde_json::{Map, Value};

pub mod stomp;

/// Topic every client subscribes to; all strokes and clears fan out here.
pub const SUBSCRIPTION_TOPIC: &str = "/topic/pizarra";
/// Destination clients publish strokes and clears to.
pub const PUBLISH_DESTINATION: &str = "/app/draw";

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 500;
pub const MIN_THICKNESS: u32 = 1;
pub const MAX_THICKNESS: u32 = 20;

/// Stroke color as it travels on the wire: a CSS color string, or a numeric
/// grey level. `255` is the background sentinel used by the eraser.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum StrokeColor {
    Css(String),
    Luminance(u8),
}

impl StrokeColor {
    pub const BACKGROUND: StrokeColor = StrokeColor::Luminance(255);

    pub fn is_background(&self) -> bool {
        *self == Self::BACKGROUND
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StrokeSegment {
    pub from_x: i32,
    pub from_y: i32,
    pub to_x: i32,
    pub to_y: i32,
    pub color: StrokeColor,
    pub thickness: u32,
}

impl StrokeSegment {
    /// Whether both endpoints lie inside `[0, width] x [0, height]`.
    pub fn within(&self, width: u32, height: u32) -> bool {
        let inside = |x: i32, y: i32| {
            x >= 0 && y >= 0 && i64::from(x) <= i64::from(width) && i64::from(y) <= i64::from(height)
        };
        inside(self.from_x, self.from_y) && inside(self.to_x, self.to_y)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    Stroke(StrokeSegment),
    Clear,
}

/// Result of decoding an incoming payload. Anything that is neither a clear
/// nor a well-formed stroke is `Unknown` and should be dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Stroke(StrokeSegment),
    Clear,
    Unknown,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Marker {
    Clear,
}

pub fn encode(message: &WireMessage) -> Result<String, serde_json::Error> {
    match message {
        WireMessage::Stroke(segment) => serde_json::to_string(segment),
        WireMessage::Clear => serde_json::to_string(&Marker::Clear),
    }
}

pub fn decode(text: &str) -> Inbound {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Inbound::Unknown;
    };
    let Some(object) = value.as_object() else {
        return Inbound::Unknown;
    };
    if object.get("type").and_then(Value::as_str) == Some("clear") {
        return Inbound::Clear;
    }
    match stroke_from_object(object) {
        Some(segment) => Inbound::Stroke(segment),
        None => Inbound::Unknown,
    }
}

impl Inbound {
    pub fn into_message(self) -> Option<WireMessage> {
        match self {
            Inbound::Stroke(segment) => Some(WireMessage::Stroke(segment)),
            Inbound::Clear => Some(WireMessage::Clear),
            Inbound::Unknown => None,
        }
    }
}

fn stroke_from_object(object: &Map<String, Value>) -> Option<StrokeSegment> {
    let from_x = coordinate(object.get("fromX")?)?;
    let from_y = coordinate(object.get("fromY")?)?;
    let to_x = coordinate(object.get("toX")?)?;
    let to_y = coordinate(object.get("toY")?)?;
    let color = match object.get("color")? {
        Value::String(color) => StrokeColor::Css(color.clone()),
        value @ Value::Number(_) => {
            StrokeColor::Luminance(finite(value)?.round().clamp(0.0, 255.0) as u8)
        }
        _ => return None,
    };
    // Negative thickness saturates to 0 and draws nothing.
    let thickness = finite(object.get("thickness")?)?.round() as u32;
    Some(StrokeSegment {
        from_x,
        from_y,
        to_x,
        to_y,
        color,
        thickness,
    })
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|value| value.is_finite())
}

fn coordinate(value: &Value) -> Option<i32> {
    finite(value).map(|value| value.round() as i32)
}
