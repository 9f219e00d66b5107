use pizarra_shared::{StrokeColor, MAX_THICKNESS, MIN_THICKNESS};

pub const DEFAULT_COLOR: &str = "#000000";
pub const DEFAULT_THICKNESS: u32 = 2;

/// Toolbar selection. Owned by the page, read by the sampler on every tick.
///
/// Fields are only reachable through the setters, so the color is never
/// empty and the thickness always lies in `MIN_THICKNESS..=MAX_THICKNESS`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolState {
    color: String,
    thickness: u32,
    eraser: bool,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            thickness: DEFAULT_THICKNESS,
            eraser: false,
        }
    }
}

impl ToolState {
    pub fn new(color: impl Into<String>, thickness: u32, eraser: bool) -> Self {
        let mut tools = Self::default();
        tools.set_color(color);
        tools.set_thickness(thickness);
        tools.set_eraser(eraser);
        tools
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn thickness(&self) -> u32 {
        self.thickness
    }

    pub fn eraser(&self) -> bool {
        self.eraser
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        let color = color.into();
        if !color.is_empty() {
            self.color = color;
        }
    }

    pub fn set_thickness(&mut self, thickness: u32) {
        self.thickness = sanitize_thickness(thickness);
    }

    pub fn set_eraser(&mut self, eraser: bool) {
        self.eraser = eraser;
    }

    pub fn toggle_eraser(&mut self) -> bool {
        self.eraser = !self.eraser;
        self.eraser
    }

    pub fn stroke_color(&self) -> StrokeColor {
        if self.eraser {
            StrokeColor::BACKGROUND
        } else {
            StrokeColor::Css(self.color.clone())
        }
    }
}

pub fn sanitize_thickness(thickness: u32) -> u32 {
    thickness.clamp(MIN_THICKNESS, MAX_THICKNESS)
}
