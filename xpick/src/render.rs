// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! View synthesis
//!
//! Nearest-neighbor magnification by integer block replication, plus the
//! inverting overlays (crosshair and border). Overlays are returned as
//! rectangles rather than burned into the raster so the rendered pixels
//! stay untouched for color readback.

use crate::capture::CaptureBuffer;
use crate::geometry::{Point, Rect, Size, ViewMapping};
use crate::raster::Raster;
use crate::{Error, Result};

/// A rendered view, ready to be pushed to a surface.
#[derive(Debug)]
pub struct ViewFrame<'a> {
    /// Block-scaled pixels
    pub raster: &'a Raster,
    /// Placement in screen coordinates
    pub placement: Rect,
    /// Outlines to draw with an inverting paint, in view coordinates
    pub overlays: Vec<Rect>,
}

impl ViewFrame<'_> {
    /// Copy of the raster with overlays XORed with `value`.
    pub fn composited(&self, value: u32) -> Raster {
        let mut raster = self.raster.clone();
        for rect in &self.overlays {
            raster.xor_outline(*rect, value);
        }
        raster
    }
}

/// Owns the view buffer and renders into it.
pub struct ViewRenderer {
    raster: Raster,
    zoom: i32,
}

impl ViewRenderer {
    /// Allocate a renderer for a quantized view size.
    pub fn new(size: Size, zoom: i32) -> Result<Self> {
        Ok(Self {
            raster: Raster::try_new(size)?,
            zoom: zoom.max(1),
        })
    }

    pub fn size(&self) -> Size {
        self.raster.size()
    }

    pub fn zoom(&self) -> i32 {
        self.zoom
    }

    /// Replace the view buffer. On failure the previous buffer is kept.
    pub fn reallocate(&mut self, size: Size, zoom: i32) -> Result<()> {
        if size == self.raster.size() {
            self.zoom = zoom.max(1);
            return Ok(());
        }
        self.raster = Raster::try_new(size)?;
        self.zoom = zoom.max(1);
        Ok(())
    }

    /// Render `capture` through `mapping`.
    ///
    /// Rendering twice with the same inputs produces identical frames.
    pub fn render(
        &mut self,
        capture: &CaptureBuffer,
        mapping: &ViewMapping,
        magnify_only: bool,
    ) -> Result<ViewFrame<'_>> {
        if mapping.dest.size() != self.raster.size() || mapping.zoom != self.zoom {
            return Err(Error::ViewSize {
                expected: self.raster.size(),
                actual: mapping.dest.size(),
            });
        }

        let zoom = mapping.zoom;
        for row in 0..mapping.rows {
            for col in 0..mapping.cols {
                let pixel = capture.pixel(mapping.sample(col, row));
                self.raster.fill_block(col * zoom, row * zoom, zoom, pixel);
            }
        }

        let mut overlays = Vec::with_capacity(2);
        if !magnify_only {
            overlays.push(mapping.crosshair());
        }
        overlays.push(mapping.border());

        Ok(ViewFrame {
            raster: &self.raster,
            placement: mapping.dest,
            overlays,
        })
    }

    /// Pixel in the middle of the last rendered view.
    ///
    /// This lies in the crosshair block.
    pub fn center_pixel(&self) -> u32 {
        let size = self.raster.size();
        self.raster
            .get_clamped(Point::new(size.width / 2, size.height / 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::stub::StubCapture;
    use crate::capture::SourceCapture;
    use crate::geometry::{map_view, quantize_view};

    fn setup(zoom: i32, view: Size) -> (CaptureBuffer, ViewRenderer, Size) {
        let mut capture = StubCapture::new(Rect::new(0, 0, 64, 48));
        let buffer = capture.capture().unwrap();
        let size = quantize_view(view, zoom, buffer.bounds());
        let renderer = ViewRenderer::new(size, zoom).unwrap();
        (buffer, renderer, size)
    }

    #[test]
    fn test_render_block_replication() {
        let (buffer, mut renderer, size) = setup(4, Size::new(40, 40));
        let mapping = map_view(Point::new(20, 20), size, 4, buffer.region());
        let frame = renderer.render(&buffer, &mapping, false).unwrap();

        for y in 0..size.height {
            for x in 0..size.width {
                let expected = buffer.pixel(mapping.sample(x / 4, y / 4));
                assert_eq!(frame.raster.get(x, y), Some(expected));
            }
        }
    }

    #[test]
    fn test_render_idempotent() {
        let (buffer, mut renderer, size) = setup(3, Size::new(31, 20));
        let mapping = map_view(Point::new(2, 47), size, 3, buffer.region());
        let first = renderer.render(&buffer, &mapping, false).unwrap().raster.clone();
        let second = renderer.render(&buffer, &mapping, false).unwrap().raster.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_overlays() {
        let (buffer, mut renderer, size) = setup(5, Size::new(30, 30));
        let mapping = map_view(Point::new(30, 30), size, 5, buffer.region());

        let frame = renderer.render(&buffer, &mapping, false).unwrap();
        assert_eq!(frame.overlays, vec![Rect::new(15, 15, 5, 5), Rect::new(0, 0, 29, 29)]);

        let frame = renderer.render(&buffer, &mapping, true).unwrap();
        assert_eq!(frame.overlays, vec![Rect::new(0, 0, 29, 29)]);
    }

    #[test]
    fn test_composited_keeps_raster() {
        let (buffer, mut renderer, size) = setup(5, Size::new(30, 30));
        let mapping = map_view(Point::new(30, 30), size, 5, buffer.region());
        let frame = renderer.render(&buffer, &mapping, false).unwrap();
        let composited = frame.composited(0xffffff);
        assert_ne!(&composited, frame.raster);
        assert_eq!(composited.get(0, 0), frame.raster.get(0, 0).map(|p| p ^ 0xffffff));
        assert_eq!(composited.get(10, 10), frame.raster.get(10, 10));
    }

    #[test]
    fn test_center_pixel_under_crosshair() {
        let (buffer, mut renderer, size) = setup(5, Size::new(45, 35));
        let mapping = map_view(Point::new(17, 9), size, 5, buffer.region());
        renderer.render(&buffer, &mapping, false).unwrap();
        assert_eq!(renderer.center_pixel(), buffer.pixel(Point::new(17, 9)));
        assert_eq!(renderer.center_pixel(), buffer.pixel(mapping.center_sample()));
    }

    #[test]
    fn test_render_rejects_mismatched_mapping() {
        let (buffer, mut renderer, _) = setup(5, Size::new(30, 30));
        let mapping = map_view(Point::new(0, 0), Size::new(40, 40), 5, buffer.region());
        assert!(renderer.render(&buffer, &mapping, false).is_err());
    }

    #[test]
    fn test_reallocate_failure_keeps_view() {
        let (_, mut renderer, size) = setup(5, Size::new(30, 30));
        assert!(renderer.reallocate(Size::new(0, 10), 2).is_err());
        assert_eq!(renderer.size(), size);
        assert_eq!(renderer.zoom(), 5);
    }
}
