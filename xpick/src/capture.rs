// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Source capture backends
//!
//! A capture is a read-only snapshot of the source region. It is replaced
//! wholesale on refresh and never modified in place.

use crate::geometry::{Point, Rect, Size};
use crate::raster::Raster;
use crate::Result;

/// Snapshot of the source region.
#[derive(Clone, Debug)]
pub struct CaptureBuffer {
    /// Source region in screen coordinates
    region: Rect,
    /// Pixels, `region.size()` large
    raster: Raster,
    /// Number of the capture that produced this buffer, starting at 1
    generation: u64,
}

impl CaptureBuffer {
    pub fn new(region: Rect, raster: Raster, generation: u64) -> Self {
        debug_assert_eq!(region.size(), raster.size());
        Self {
            region,
            raster,
            generation,
        }
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    /// Capture dimensions.
    pub fn bounds(&self) -> Size {
        self.raster.size()
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pixel at `p` in capture coordinates, clamped to the edges.
    pub fn pixel(&self, p: Point) -> u32 {
        self.raster.get_clamped(p)
    }
}

/// Source capture trait
pub trait SourceCapture {
    /// Source region in screen coordinates
    fn region(&self) -> Rect;

    /// Take a new snapshot of the whole source region
    fn capture(&mut self) -> Result<CaptureBuffer>;
}

/// X11 capture using GetImage on the source drawable
pub mod x11 {
    use super::*;
    use log::debug;
    use x11rb::image::Image;
    use x11rb::protocol::xproto::Window;
    use x11rb::rust_connection::RustConnection;

    use crate::Error;

    pub struct X11Capture<'c> {
        conn: &'c RustConnection,
        /// Window the pixels are read from
        source: Window,
        /// Its region in root coordinates
        region: Rect,
        generation: u64,
    }

    impl<'c> X11Capture<'c> {
        pub fn new(conn: &'c RustConnection, source: Window, region: Rect) -> Self {
            Self {
                conn,
                source,
                region,
                generation: 0,
            }
        }
    }

    impl SourceCapture for X11Capture<'_> {
        fn region(&self) -> Rect {
            self.region
        }

        fn capture(&mut self) -> Result<CaptureBuffer> {
            let (width, height) = (
                u16::try_from(self.region.width)
                    .map_err(|_| Error::Capture(format!("width {}", self.region.width)))?,
                u16::try_from(self.region.height)
                    .map_err(|_| Error::Capture(format!("height {}", self.region.height)))?,
            );

            let (image, _visual) = Image::get(self.conn, self.source, 0, 0, width, height)?;

            let mut raster = Raster::try_new(self.region.size())?;
            for y in 0..height {
                for x in 0..width {
                    raster.put(i32::from(x), i32::from(y), image.get_pixel(x, y));
                }
            }

            self.generation += 1;
            debug!(
                "Captured {width}x{height} from window {:#x} (generation {})",
                self.source, self.generation
            );

            Ok(CaptureBuffer::new(self.region, raster, self.generation))
        }
    }
}

/// Stub capture producing a synthetic pattern
pub mod stub {
    use super::*;

    pub struct StubCapture {
        region: Rect,
        generation: u64,
        /// Fixed content, if any
        raster: Option<Raster>,
    }

    impl StubCapture {
        /// Gradient pattern: `0xRRGGBB` with `R = x`, `G = y`, `B = generation`.
        pub fn new(region: Rect) -> Self {
            Self {
                region,
                generation: 0,
                raster: None,
            }
        }

        /// Always capture the given raster.
        pub fn with_raster(origin: Point, raster: Raster) -> Self {
            let size = raster.size();
            Self {
                region: Rect::new(origin.x, origin.y, size.width, size.height),
                generation: 0,
                raster: Some(raster),
            }
        }

        pub fn captures(&self) -> u64 {
            self.generation
        }
    }

    impl SourceCapture for StubCapture {
        fn region(&self) -> Rect {
            self.region
        }

        fn capture(&mut self) -> Result<CaptureBuffer> {
            self.generation += 1;

            let raster = match &self.raster {
                Some(raster) => raster.clone(),
                None => {
                    let mut raster = Raster::try_new(self.region.size())?;
                    let phase = (self.generation & 0xff) as u32;
                    for y in 0..self.region.height {
                        for x in 0..self.region.width {
                            let pixel = ((x as u32 & 0xff) << 16) | ((y as u32 & 0xff) << 8) | phase;
                            raster.put(x, y, pixel);
                        }
                    }
                    raster
                }
            };

            Ok(CaptureBuffer::new(self.region, raster, self.generation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_capture_pattern() {
        let mut capture = stub::StubCapture::new(Rect::new(0, 0, 32, 16));
        let buffer = capture.capture().unwrap();
        assert_eq!(buffer.bounds(), Size::new(32, 16));
        assert_eq!(buffer.pixel(Point::new(3, 5)), 0x030501);
        assert_eq!(buffer.generation(), 1);
    }

    #[test]
    fn test_stub_capture_replaced_on_refresh() {
        let mut capture = stub::StubCapture::new(Rect::new(0, 0, 8, 8));
        let first = capture.capture().unwrap();
        let second = capture.capture().unwrap();
        assert_eq!(capture.captures(), 2);
        assert_ne!(first.raster(), second.raster());
        assert_eq!(second.pixel(Point::new(1, 1)), 0x010102);
    }

    #[test]
    fn test_capture_pixel_clamped() {
        let raster = Raster::from_pixels(Size::new(2, 1), vec![10, 20]).unwrap();
        let mut capture = stub::StubCapture::with_raster(Point::new(5, 5), raster);
        assert_eq!(capture.region(), Rect::new(5, 5, 2, 1));
        let buffer = capture.capture().unwrap();
        assert_eq!(buffer.pixel(Point::new(-4, 0)), 10);
        assert_eq!(buffer.pixel(Point::new(7, 3)), 20);
    }
}
