// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Owned pixel rasters
//!
//! Pixels are kept as native pixel values (as returned by the server for
//! the capture's visual), one `u32` per pixel, row-major.

use crate::geometry::{Point, Rect, Size};
use crate::{Error, Result};

/// A 2-D buffer of native pixel values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: i32,
    height: i32,
    pixels: Vec<u32>,
}

impl Raster {
    /// Allocate a zeroed raster.
    ///
    /// Fails instead of aborting when the buffer cannot be reserved.
    pub fn try_new(size: Size) -> Result<Self> {
        let err = Error::Allocation {
            width: size.width,
            height: size.height,
        };
        if size.width <= 0 || size.height <= 0 {
            return Err(err);
        }
        let len = (size.width as usize)
            .checked_mul(size.height as usize)
            .ok_or(Error::Allocation {
                width: size.width,
                height: size.height,
            })?;

        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|_| err)?;
        pixels.resize(len, 0);

        Ok(Self {
            width: size.width,
            height: size.height,
            pixels,
        })
    }

    /// Wrap existing pixel data. Returns `None` if the length does not match.
    pub fn from_pixels(size: Size, pixels: Vec<u32>) -> Option<Self> {
        if size.width <= 0 || size.height <= 0 {
            return None;
        }
        if pixels.len() != size.width as usize * size.height as usize {
            return None;
        }
        Some(Self {
            width: size.width,
            height: size.height,
            pixels,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Pixel at `(x, y)`, or `None` outside the raster.
    pub fn get(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Pixel at `p`, with coordinates clamped to the raster.
    pub fn get_clamped(&self, p: Point) -> u32 {
        let x = p.x.clamp(0, self.width - 1);
        let y = p.y.clamp(0, self.height - 1);
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn put(&mut self, x: i32, y: i32, pixel: u32) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = pixel;
        }
    }

    /// Fill a `size`×`size` block with its top left corner at `(x, y)`.
    pub fn fill_block(&mut self, x: i32, y: i32, size: i32, pixel: u32) {
        let x0 = x.max(0);
        let x1 = (x + size).min(self.width);
        if x0 >= x1 {
            return;
        }
        for row in y.max(0)..(y + size).min(self.height) {
            let start = row as usize * self.width as usize;
            self.pixels[start + x0 as usize..start + x1 as usize].fill(pixel);
        }
    }

    /// XOR the outline of `rect` with `value`, each pixel exactly once.
    pub fn xor_outline(&mut self, rect: Rect, value: u32) {
        let (x0, y0) = (rect.x, rect.y);
        let (x1, y1) = (rect.x + rect.width, rect.y + rect.height);

        let mut xor = |x: i32, y: i32| {
            if let Some(i) = self.index(x, y) {
                self.pixels[i] ^= value;
            }
        };

        for x in x0..=x1 {
            xor(x, y0);
            if y1 != y0 {
                xor(x, y1);
            }
        }
        for y in y0 + 1..y1 {
            xor(x0, y);
            if x1 != x0 {
                xor(x1, y);
            }
        }
    }
}
