use wasm_bindgen::{Clamped, JsValue};
use web_sys::{CanvasRenderingContext2d, ImageData};

use crate::raster::RasterSurface;

/// Copies whatever changed on the surface since the last frame onto the
/// canvas. A disposed or untouched surface costs nothing.
pub fn present(ctx: &CanvasRenderingContext2d, surface: &mut RasterSurface) -> Result<(), JsValue> {
    let Some(rect) = surface.take_dirty() else {
        return Ok(());
    };
    let data = surface.region_rgba(rect);
    let image = ImageData::new_with_u8_clamped_array_and_sh(Clamped(&data), rect.width, rect.height)?;
    ctx.put_image_data(&image, f64::from(rect.x), f64::from(rect.y))
}
