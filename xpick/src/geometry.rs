// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Coordinate mapping
//!
//! Maps a pointer position, a view size and a zoom factor onto the
//! magnifier's screen placement and onto the capture pixels it samples.
//! Sampling is clamp-to-edge: a view near the border of the source repeats
//! the edge pixels instead of reading outside the capture.

/// A position in screen or capture coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A width/height pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Smaller of the two dimensions.
    pub fn min_dimension(&self) -> i32 {
        self.width.min(self.height)
    }
}

/// An axis-aligned rectangle.
///
/// For overlay rectangles the X11 outline convention applies: an outline of
/// width `w` covers `w + 1` pixel columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Whether `p` lies in `[x, x + width) × [y, y + height)`.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Nearest point inside the rectangle.
    pub fn clamp_point(&self, p: Point) -> Point {
        Point::new(
            clamp_span(p.x, self.x, self.x + self.width - 1),
            clamp_span(p.y, self.y, self.y + self.height - 1),
        )
    }
}

/// Clamp `value` to `[lo, hi]`. When the span is empty the lower bound wins.
fn clamp_span(value: i32, lo: i32, hi: i32) -> i32 {
    value.min(hi).max(lo)
}

/// Round `dim` down to a multiple of `zoom`, floored at `zoom`.
///
/// `dim` is first limited to `limit` so the view never outgrows the source.
pub fn quantize(dim: i32, zoom: i32, limit: i32) -> i32 {
    let zoom = zoom.max(1);
    let dim = dim.min(limit);
    (dim / zoom * zoom).max(zoom)
}

/// [`quantize`] applied to both dimensions.
pub fn quantize_view(view: Size, zoom: i32, limit: Size) -> Size {
    Size::new(
        quantize(view.width, zoom, limit.width),
        quantize(view.height, zoom, limit.height),
    )
}

/// Resolve a dimension given on the command line.
///
/// Negative values are a percentage of `reference`.
pub fn resolve_dimension(value: i32, reference: i32) -> i32 {
    if value < 0 {
        let resolved = -i64::from(value) * i64::from(reference) / 100;
        resolved.clamp(0, i64::from(i32::MAX)) as i32
    } else {
        value
    }
}

/// Result of mapping a pointer position onto the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewMapping {
    /// Magnifier placement in screen coordinates.
    pub dest: Rect,
    /// Capture coordinate sampled by block `(0, 0)`, before clamping.
    pub sample_origin: Point,
    /// Number of source columns shown.
    pub cols: i32,
    /// Number of source rows shown.
    pub rows: i32,
    /// Output pixels per source pixel.
    pub zoom: i32,
    /// Capture dimensions.
    pub bounds: Size,
}

impl ViewMapping {
    /// Capture pixel shown by block `(col, row)`.
    pub fn sample(&self, col: i32, row: i32) -> Point {
        Point::new(
            clamp_span(self.sample_origin.x + col, 0, self.bounds.width - 1),
            clamp_span(self.sample_origin.y + row, 0, self.bounds.height - 1),
        )
    }

    /// Block under the crosshair.
    pub fn center_block(&self) -> (i32, i32) {
        (self.cols / 2, self.rows / 2)
    }

    /// Capture pixel under the crosshair.
    pub fn center_sample(&self) -> Point {
        let (col, row) = self.center_block();
        self.sample(col, row)
    }

    /// The capture rectangle actually read, in capture coordinates.
    pub fn source_rect(&self) -> Rect {
        let first = self.sample(0, 0);
        let last = self.sample(self.cols - 1, self.rows - 1);
        Rect::new(first.x, first.y, last.x - first.x + 1, last.y - first.y + 1)
    }

    /// Outline around the crosshair block, in view coordinates.
    pub fn crosshair(&self) -> Rect {
        let (col, row) = self.center_block();
        Rect::new(col * self.zoom, row * self.zoom, self.zoom, self.zoom)
    }

    /// Outline around the whole view, in view coordinates.
    pub fn border(&self) -> Rect {
        Rect::new(0, 0, self.dest.width - 1, self.dest.height - 1)
    }
}

/// Map `pointer` (screen coordinates) onto `source` for a quantized view.
///
/// `view` must already be quantized for `zoom`. The placement is clamped
/// inside `source`, which for the root window is the whole display.
pub fn map_view(pointer: Point, view: Size, zoom: i32, source: Rect) -> ViewMapping {
    let zoom = zoom.max(1);
    let dest = Rect::new(
        clamp_span(
            pointer.x - view.width / 2,
            source.x,
            source.x + source.width - view.width,
        ),
        clamp_span(
            pointer.y - view.height / 2,
            source.y,
            source.y + source.height - view.height,
        ),
        view.width,
        view.height,
    );

    let cols = view.width / zoom;
    let rows = view.height / zoom;

    ViewMapping {
        dest,
        sample_origin: Point::new(
            pointer.x - source.x - cols / 2,
            pointer.y - source.y - rows / 2,
        ),
        cols,
        rows,
        zoom,
        bounds: source.size(),
    }
}
