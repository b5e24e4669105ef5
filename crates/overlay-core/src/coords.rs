//! Coordinate transformation between pointer, rendered-page and page space
//!
//! Three spaces are involved when a field is placed on a rendered page:
//!
//! 1. viewport/pointer space: CSS pixels relative to the viewport, already
//!    affected by scrolling (device pixels are divided by the device pixel ratio)
//! 2. rendered-page space: pointer space minus the page element's origin,
//!    still multiplied by the active zoom factor
//! 3. page space: rendered-page space divided by the zoom factor (scale = 1).
//!    Top-left origin. This is what a [`crate::Field`] stores.
//!
//! The PDF user space (bottom-left origin) only appears in [`invert_y`].

use serde::{Deserialize, Serialize};

/// Smallest width a field can be resized to, in page-space units
pub const MIN_FIELD_WIDTH: f64 = 24.0;
/// Smallest height a field can be resized to, in page-space units
pub const MIN_FIELD_HEIGHT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// US Letter in points
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// Apply the minimum interactable bounds
    pub fn at_least_min(self) -> Self {
        Self {
            width: self.width.max(MIN_FIELD_WIDTH),
            height: self.height.max(MIN_FIELD_HEIGHT),
        }
    }
}

/// Zoom factors that would divide by zero or flip the page fall back to 1.0
fn effective_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Convert device pixels (e.g. from a high-DPI canvas) to CSS pixels
pub fn device_to_css(point: Point, device_pixel_ratio: f64) -> Point {
    let ratio = effective_scale(device_pixel_ratio);
    Point::new(point.x / ratio, point.y / ratio)
}

/// Convert a pointer position to page space.
///
/// `page_origin` is the page element's top-left corner in the same viewport
/// space as `pointer`, measured at the time of the event.
pub fn to_page_space(pointer: Point, page_origin: Point, scale: f64) -> Point {
    let scale = effective_scale(scale);
    Point::new(
        (pointer.x - page_origin.x) / scale,
        (pointer.y - page_origin.y) / scale,
    )
}

/// Convert a page-space point back to the viewport (inverse of [`to_page_space`])
pub fn from_page_space(point: Point, page_origin: Point, scale: f64) -> Point {
    let scale = effective_scale(scale);
    Point::new(
        point.x * scale + page_origin.x,
        point.y * scale + page_origin.y,
    )
}

/// Clamp a point into `[0, page.width] x [0, page.height]`
pub fn clamp_to_page(point: Point, page: Size) -> Point {
    Point::new(
        point.x.clamp(0.0, page.width.max(0.0)),
        point.y.clamp(0.0, page.height.max(0.0)),
    )
}

/// Clamp a size so the field stays on the page without going under the minimum.
///
/// The minimum wins when the field sits so close to the edge that both cannot hold.
pub fn clamp_size(position: Point, size: Size, page: Size) -> Size {
    let max_width = (page.width - position.x).max(MIN_FIELD_WIDTH);
    let max_height = (page.height - position.y).max(MIN_FIELD_HEIGHT);
    Size::new(
        size.width.clamp(MIN_FIELD_WIDTH, max_width),
        size.height.clamp(MIN_FIELD_HEIGHT, max_height),
    )
}

/// New size after dragging a resize handle by `pointer_delta` viewport pixels
pub fn resized(original: Size, pointer_delta: Point, scale: f64) -> Size {
    let scale = effective_scale(scale);
    Size::new(
        (original.width + pointer_delta.x / scale).max(MIN_FIELD_WIDTH),
        (original.height + pointer_delta.y / scale).max(MIN_FIELD_HEIGHT),
    )
}

/// Convert a top-left page-space y to the PDF bottom-left y of the box's lower edge
pub fn invert_y(y: f64, height: f64, page_height: f64) -> f64 {
    page_height - y - height
}

/// Offset between the pointer and a field's top-left corner, captured at drag start.
///
/// Stored in page space so that scrolling or re-rendering between drag start
/// and drop does not change it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragGrab {
    offset: Point,
}

impl DragGrab {
    pub fn begin(pointer: Point, field_position: Point, page_origin: Point, scale: f64) -> Self {
        let grab = to_page_space(pointer, page_origin, scale);
        Self {
            offset: Point::new(grab.x - field_position.x, grab.y - field_position.y),
        }
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Page-space top-left corner for a drop at `pointer`
    pub fn drop_position(&self, pointer: Point, page_origin: Point, scale: f64) -> Point {
        let p = to_page_space(pointer, page_origin, scale);
        Point::new(p.x - self.offset.x, p.y - self.offset.y)
    }
}

/// Field size captured when a resize handle is grabbed.
///
/// Pointer deltas reported during the gesture are cumulative from the grab,
/// so every update starts from this size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeGrab {
    original: Size,
}

impl ResizeGrab {
    pub fn begin(original: Size) -> Self {
        Self { original }
    }

    pub fn original(&self) -> Size {
        self.original
    }

    /// Size for a cumulative `pointer_delta` in viewport pixels
    pub fn size_for(&self, pointer_delta: Point, scale: f64) -> Size {
        resized(self.original, pointer_delta, scale)
    }
}
