pub mod frame;

use std::path::Path;
use std::time::Duration;

use crate::error::RenderError;

/// Drawing operations the playback controller needs from a display.
///
/// Every call must be safe to repeat; failures are reported, never fatal.
pub trait RenderBackend {
    /// Tear down and recreate the rendering target.
    fn reset_surface(&mut self) -> Result<(), RenderError>;

    /// Decode `path`, scale it to fit, center it on black and present it.
    fn draw_image(&mut self, path: &Path) -> Result<(), RenderError>;

    /// Present solid black, then hold for `hold`.
    fn blank(&mut self, hold: Duration) -> Result<(), RenderError>;

    /// Present the solid error-indicator color.
    fn present_error_frame(&mut self) -> Result<(), RenderError>;
}
