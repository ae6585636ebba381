//! Page display and highlight placement.
//!
//! Pages are laid out at a display scale that fits the container width, and
//! rasterized at that scale times the oversampling factor. Highlights are
//! always positioned against the display viewport.

mod highlight;
mod session;
mod source;
mod viewport;

pub use highlight::{flip_y, transform_highlight, HighlightOverlay, ScreenRect};
pub use session::{PageRenderer, RenderSession, SessionStatus};
pub use source::PdfPageSource;
pub use viewport::{CanvasTarget, PageViewState, RenderQuality, SmoothingQuality, Transform, Viewport};
