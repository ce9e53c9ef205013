//! OS backends: rdev for capture, enigo for injection, xcap for pixels

pub mod capture;
pub mod inject;
pub mod screen;

pub use capture::RdevHook;
pub use inject::EnigoInput;
pub use screen::ScreenPixels;

use crate::controller::Backends;
use anyhow::Context;

/// Backends for the machine we are running on
pub fn native() -> anyhow::Result<Backends> {
    let sink = EnigoInput::new().context("input injection unavailable")?;
    Ok(Backends {
        hook: RdevHook::global(),
        sink: Box::new(sink),
        pixels: Box::new(ScreenPixels::new()),
    })
}
