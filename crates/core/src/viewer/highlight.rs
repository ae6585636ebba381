use super::viewport::Viewport;
use crate::error::ViewerError;
use crate::models::BoundingBox;
use serde::{Deserialize, Serialize};

/// Overlay rectangle in display pixels, relative to the page's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightOverlay {
    pub page: u32,
    pub bbox: BoundingBox,
    pub rect: ScreenRect,
}

/// Distance of `y` below the top edge of the page box. For pages whose box
/// starts at the origin this is `page_height - y`.
pub fn flip_y(y: f32, viewport: &Viewport) -> f32 {
    viewport.page_height() - (y - viewport.view_box.y0)
}

/// Maps a box in PDF points (bottom-left origin) onto the display viewport.
///
/// Corners may arrive in any order; the rectangle always takes the minimum of
/// the transformed corners and absolute extents. Must be given the display
/// viewport, never the oversampled raster one.
pub fn transform_highlight(bbox: &BoundingBox, display: &Viewport) -> Result<ScreenRect, ViewerError> {
    if !bbox.is_finite() {
        return Err(ViewerError::MalformedBox(bbox.to_string()));
    }

    let (ax, ay) = display.convert_point(bbox.x0, flip_y(bbox.y0, display));
    let (bx, by) = display.convert_point(bbox.x1, flip_y(bbox.y1, display));

    Ok(ScreenRect {
        left: ax.min(bx),
        top: ay.min(by),
        width: (bx - ax).abs(),
        height: (by - ay).abs(),
    })
}
