use thiserror::Error;

use pizarra_shared::StrokeSegment;

use crate::color::Rgb;

/// Largest accepted side length, in pixels.
pub const MAX_SIDE: u32 = 8192;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface dimensions {width}x{height} are invalid")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("surface of {width}x{height} exceeds the {MAX_SIDE}px side limit")]
    TooLarge { width: u32, height: u32 },
    #[error("could not allocate a {width}x{height} pixel buffer")]
    OutOfMemory { width: u32, height: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn union(self, other: Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        Rect {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}

/// Fixed-size RGBA8 canvas. Every client rasterises with this same code, so
/// a given sequence of segments yields the same pixels everywhere.
pub struct RasterSurface {
    width: u32,
    height: u32,
    background: Rgb,
    pixels: Vec<u8>,
    dirty: Option<Rect>,
    disposed: bool,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, background: Rgb) -> Result<Self, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::InvalidDimensions { width, height });
        }
        if width > MAX_SIDE || height > MAX_SIDE {
            return Err(SurfaceError::TooLarge { width, height });
        }
        let len = width as usize * height as usize * 4;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| SurfaceError::OutOfMemory { width, height })?;
        pixels.resize(len, 0);

        let mut surface = Self {
            width,
            height,
            background,
            pixels,
            dirty: None,
            disposed: false,
        };
        surface.clear();
        Ok(surface)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn background(&self) -> Rgb {
        self.background
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Paints a round-capped line `thickness` pixels wide. Pixels whose centre
    /// lies within `thickness / 2` of the segment take the stroke color.
    pub fn draw_segment(&mut self, segment: &StrokeSegment) {
        if self.disposed || segment.thickness == 0 {
            return;
        }
        let Ok(color) = Rgb::try_from(&segment.color) else {
            log::debug!("Skipping segment with unreadable color {:?}", segment.color);
            return;
        };

        let radius = f64::from(segment.thickness) / 2.0;
        let (x1, y1) = (f64::from(segment.from_x), f64::from(segment.from_y));
        let (x2, y2) = (f64::from(segment.to_x), f64::from(segment.to_y));
        let min_x = (x1.min(x2) - radius).floor().max(0.0);
        let min_y = (y1.min(y2) - radius).floor().max(0.0);
        let max_x = (x1.max(x2) + radius).ceil().min(f64::from(self.width - 1));
        let max_y = (y1.max(y2) + radius).ceil().min(f64::from(self.height - 1));
        if min_x > max_x || min_y > max_y {
            return;
        }

        let (min_x, min_y, max_x, max_y) = (min_x as u32, min_y as u32, max_x as u32, max_y as u32);
        let rgba = color.to_rgba();
        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let distance = distance_to_segment(
                    f64::from(px) + 0.5,
                    f64::from(py) + 0.5,
                    x1,
                    y1,
                    x2,
                    y2,
                );
                if distance <= radius {
                    self.put(px, py, rgba);
                }
            }
        }
        self.mark_dirty(Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        });
    }

    pub fn clear(&mut self) {
        if self.disposed {
            return;
        }
        let rgba = self.background.to_rgba();
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
        self.dirty = Some(self.bounds());
    }

    /// Releases the pixel buffer. Later draws and clears are ignored.
    pub fn dispose(&mut self) {
        self.pixels = Vec::new();
        self.dirty = None;
        self.disposed = true;
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if self.disposed || x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        let p = &self.pixels[offset..offset + 4];
        Some(Rgb::new(p[0], p[1], p[2]))
    }

    pub fn rgba(&self) -> &[u8] {
        &self.pixels
    }

    /// Area changed since the previous call.
    pub fn take_dirty(&mut self) -> Option<Rect> {
        self.dirty.take()
    }

    /// Copies a region out row by row, ready for an `ImageData` upload.
    pub fn region_rgba(&self, rect: Rect) -> Vec<u8> {
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize * 4);
        if self.disposed {
            return out;
        }
        for y in rect.y..rect.y + rect.height {
            let start = self.offset(rect.x, y);
            out.extend_from_slice(&self.pixels[start..start + rect.width as usize * 4]);
        }
        out
    }

    fn bounds(&self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    fn put(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let offset = self.offset(x, y);
        self.pixels[offset..offset + 4].copy_from_slice(&rgba);
    }

    fn mark_dirty(&mut self, rect: Rect) {
        self.dirty = Some(match self.dirty {
            Some(dirty) => dirty.union(rect),
            None => rect,
        });
    }
}

pub fn distance_to_segment(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    if dx.abs() < f64::EPSILON && dy.abs() < f64::EPSILON {
        return ((px - x1).powi(2) + (py - y1).powi(2)).sqrt();
    }
    let t = ((px - x1) * dx + (py - y1) * dy) / (dx * dx + dy * dy);
    let t = t.clamp(0.0, 1.0);
    let proj_x = x1 + t * dx;
    let proj_y = y1 + t * dy;
    ((px - proj_x).powi(2) + (py - proj_y).powi(2)).sqrt()
}

#[cfg(test)]
#[path = "raster_test.rs"]
mod tests;
