use crate::models::{BoundingBox, PageGeometry};
use serde::{Deserialize, Serialize};

/// `[a b c d e f]`: `x' = a*u + c*v + e`, `y' = b*u + d*v + f`.
pub type Transform = [f32; 6];

/// Maps page coordinates, measured in points from the page's top-left corner,
/// to pixels on a surface. Scale, rotation and offset are all folded into
/// `transform`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub view_box: BoundingBox,
    pub scale: f32,
    pub rotation: u16,
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
    pub transform: Transform,
}

impl Viewport {
    pub fn new(view_box: BoundingBox, scale: f32, rotation: u16) -> Self {
        Self::with_offset(view_box, scale, rotation, 0.0, 0.0)
    }

    pub fn for_page(geometry: &PageGeometry, scale: f32) -> Self {
        Self::new(geometry.view_box, scale, geometry.rotation)
    }

    pub fn with_offset(
        view_box: BoundingBox,
        scale: f32,
        rotation: u16,
        offset_x: f32,
        offset_y: f32,
    ) -> Self {
        let view_box = view_box.normalized();
        let rotation = normalize_rotation(rotation);
        let (w, h) = (view_box.width(), view_box.height());
        let s = scale;

        let (transform, width, height) = match rotation {
            90 => ([0.0, s, -s, 0.0, s * h, 0.0], h * s, w * s),
            180 => ([-s, 0.0, 0.0, -s, s * w, s * h], w * s, h * s),
            270 => ([0.0, -s, s, 0.0, 0.0, s * w], h * s, w * s),
            _ => ([s, 0.0, 0.0, s, 0.0, 0.0], w * s, h * s),
        };

        let mut transform: Transform = transform;
        transform[4] += offset_x;
        transform[5] += offset_y;

        Self {
            view_box,
            scale,
            rotation,
            offset_x,
            offset_y,
            width,
            height,
            transform,
        }
    }

    /// Same page and rotation at another scale.
    pub fn clone_with_scale(&self, scale: f32) -> Self {
        Self::with_offset(
            self.view_box,
            scale,
            self.rotation,
            self.offset_x,
            self.offset_y,
        )
    }

    /// Unrotated page height in points.
    pub fn page_height(&self) -> f32 {
        self.view_box.height()
    }

    /// Width in points of the page as it appears after rotation.
    pub fn rotated_page_width(&self) -> f32 {
        if self.rotation % 180 == 0 {
            self.view_box.width()
        } else {
            self.view_box.height()
        }
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Applies the transform to `(x, flipped_y)`, where `x` is a PDF x
    /// coordinate and `flipped_y` is already measured down from the page top.
    pub fn convert_point(&self, x: f32, flipped_y: f32) -> (f32, f32) {
        let u = x - self.view_box.x0;
        let v = flipped_y;
        let [a, b, c, d, e, f] = self.transform;
        (a * u + c * v + e, b * u + d * v + f)
    }
}

fn normalize_rotation(rotation: u16) -> u16 {
    (rotation % 360) / 90 * 90
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingQuality {
    Low,
    Medium,
    #[default]
    High,
}

/// Rendering options the target surface supports, fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderQuality {
    /// Raster oversampling; affects canvas pixel density only.
    pub oversample: f32,
    pub image_smoothing: bool,
    pub smoothing_quality: SmoothingQuality,
}

impl Default for RenderQuality {
    fn default() -> Self {
        Self {
            oversample: 2.0,
            image_smoothing: true,
            smoothing_quality: SmoothingQuality::High,
        }
    }
}

/// Pixel buffer and on-screen size a renderer should draw one page into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasTarget {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub display_width: f32,
    pub display_height: f32,
    pub raster: Viewport,
    pub quality: RenderQuality,
}

/// Viewports for one rendered page. Layout and highlights use `display`;
/// only rasterization uses `raster`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageViewState {
    pub page: u32,
    pub display: Viewport,
    pub display_scale: f32,
    pub landscape: bool,
    pub raster: Viewport,
}

impl PageViewState {
    /// Scales the page so its rotated width fills `container_width` pixels.
    pub fn fit_width(geometry: &PageGeometry, container_width: f32, quality: &RenderQuality) -> Self {
        let unit = Viewport::for_page(geometry, 1.0);
        let page_width = unit.rotated_page_width();
        let display_scale = if page_width > 0.0 && container_width > 0.0 {
            container_width / page_width
        } else {
            1.0
        };

        Self::at_scale(geometry, display_scale, quality)
    }

    pub fn at_scale(geometry: &PageGeometry, display_scale: f32, quality: &RenderQuality) -> Self {
        let display = Viewport::for_page(geometry, display_scale);
        let raster = display.clone_with_scale(display_scale * quality.oversample.max(1.0));

        Self {
            page: geometry.page,
            display,
            display_scale,
            landscape: display.is_landscape(),
            raster,
        }
    }

    pub fn canvas(&self, quality: &RenderQuality) -> CanvasTarget {
        CanvasTarget {
            pixel_width: self.raster.width.ceil().max(1.0) as u32,
            pixel_height: self.raster.height.ceil().max(1.0) as u32,
            display_width: self.display.width,
            display_height: self.display.height,
            raster: self.raster,
            quality: *quality,
        }
    }
}
