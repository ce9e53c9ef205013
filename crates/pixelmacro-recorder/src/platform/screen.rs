//! Screen pixel sampling via xcap

use crate::pixel::{PixelError, PixelSource};
use pixelmacro_core::Rgb;
use xcap::Monitor;

/// Samples the live screen. Each call captures the monitor under the
/// coordinate, so results are never stale.
#[derive(Debug, Default)]
pub struct ScreenPixels;

impl ScreenPixels {
    pub fn new() -> Self {
        Self
    }
}

impl PixelSource for ScreenPixels {
    fn sample(&mut self, x: u32, y: u32) -> Result<Rgb, PixelError> {
        let monitors = Monitor::all().map_err(|e| PixelError::Capture(e.to_string()))?;
        let (px, py) = (x as i64, y as i64);
        let monitor = monitors
            .into_iter()
            .find(|m| {
                let (mx, my) = (m.x() as i64, m.y() as i64);
                px >= mx
                    && py >= my
                    && px < mx + m.width() as i64
                    && py < my + m.height() as i64
            })
            .ok_or(PixelError::OutOfBounds { x, y })?;

        let image = monitor
            .capture_image()
            .map_err(|e| PixelError::Capture(e.to_string()))?;

        // Captures are in physical pixels; monitor geometry may be logical
        let sx = image.width() as f64 / monitor.width().max(1) as f64;
        let sy = image.height() as f64 / monitor.height().max(1) as f64;
        let ix = ((px - monitor.x() as i64) as f64 * sx) as u32;
        let iy = ((py - monitor.y() as i64) as f64 * sy) as u32;

        let pixel = image
            .get_pixel_checked(ix, iy)
            .ok_or(PixelError::OutOfBounds { x, y })?;
        let image::Rgba([r, g, b, _]) = *pixel;
        Ok(Rgb::new(r, g, b))
    }
}
