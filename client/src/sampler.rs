use serde::Deserialize;

use pizarra_shared::StrokeSegment;

use crate::tools::ToolState;

/// What happens when an active pointer wanders off the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// Keep the last in-bounds point; re-entering draws a chord across the gap.
    #[default]
    Chord,
    /// Leaving the surface ends the stroke as if the pointer was released.
    Pause,
}

/// Turns pointer state sampled once per frame into stroke segments.
///
/// The sampler is active exactly when it holds a last position, so an
/// active sampler always has somewhere to draw from.
pub struct StrokeSampler {
    width: u32,
    height: u32,
    policy: ExitPolicy,
    last: Option<(i32, i32)>,
}

impl StrokeSampler {
    pub fn new(width: u32, height: u32, policy: ExitPolicy) -> Self {
        Self {
            width,
            height,
            policy,
            last: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.last.is_some()
    }

    pub fn last(&self) -> Option<(i32, i32)> {
        self.last
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && i64::from(x) <= i64::from(self.width) && i64::from(y) <= i64::from(self.height)
    }

    /// Starts a stroke. Presses outside the surface are ignored.
    pub fn pointer_down(&mut self, x: i32, y: i32) -> bool {
        if !self.contains(x, y) {
            return false;
        }
        self.last = Some((x, y));
        true
    }

    pub fn pointer_up(&mut self) {
        self.last = None;
    }

    pub fn tick(&mut self, x: i32, y: i32, tools: &ToolState) -> Option<StrokeSegment> {
        let (from_x, from_y) = self.last?;
        if !self.contains(x, y) {
            if self.policy == ExitPolicy::Pause {
                self.pointer_up();
            }
            return None;
        }
        self.last = Some((x, y));
        Some(StrokeSegment {
            from_x,
            from_y,
            to_x: x,
            to_y: y,
            color: tools.stroke_color(),
            thickness: tools.thickness(),
        })
    }
}
