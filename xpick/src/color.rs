// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Color reporting
//!
//! Converts native pixel values to 8-bit RGB and prints them as `#rrggbb`.

use std::fmt;
use std::io::{self, Write};

use crate::Result;

/// An 8-bit per channel color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// From 16-bit channels, as found in X11 color replies.
    pub fn from_u16(r: u16, g: u16, b: u16) -> Self {
        Self::new((r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8)
    }

    /// `#rrggbb`, lowercase.
    pub fn hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Maps native pixel values to colors.
pub trait Palette {
    fn lookup(&self, pixel: u32) -> Result<Rgb>;
}

/// Palette for true-color visuals, decoding channels from the visual masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskPalette {
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

impl MaskPalette {
    pub const fn new(red_mask: u32, green_mask: u32, blue_mask: u32) -> Self {
        Self {
            red_mask,
            green_mask,
            blue_mask,
        }
    }

    /// The usual 24-bit `0xRRGGBB` layout.
    pub const fn rgb888() -> Self {
        Self::new(0xff0000, 0x00ff00, 0x0000ff)
    }

    fn channel(pixel: u32, mask: u32) -> u8 {
        if mask == 0 {
            return 0;
        }
        let shift = mask.trailing_zeros();
        let bits = (mask >> shift).count_ones();
        let value = (pixel & mask) >> shift;
        let max = (1u64 << bits) - 1;
        (u64::from(value) * 255 / max) as u8
    }
}

impl Palette for MaskPalette {
    fn lookup(&self, pixel: u32) -> Result<Rgb> {
        Ok(Rgb::new(
            Self::channel(pixel, self.red_mask),
            Self::channel(pixel, self.green_mask),
            Self::channel(pixel, self.blue_mask),
        ))
    }
}

/// Writes color reports to an output stream.
pub struct ColorReporter<W: Write> {
    out: W,
    reports: usize,
}

impl<W: Write> ColorReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, reports: 0 }
    }

    /// Print `color`, optionally followed by a newline, and flush.
    pub fn report(&mut self, color: Rgb, newline: bool) -> io::Result<()> {
        write!(self.out, "{color}")?;
        if newline {
            writeln!(self.out)?;
        }
        self.out.flush()?;
        self.reports += 1;
        Ok(())
    }

    /// Number of colors reported so far.
    pub fn reports(&self) -> usize {
        self.reports
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hex() {
        assert_eq!(Rgb::new(255, 0, 0).hex(), "#ff0000");
        assert_eq!(Rgb::new(0, 0, 0).hex(), "#000000");
        assert_eq!(Rgb::new(0x12, 0xab, 0x0f).to_string(), "#12ab0f");
    }

    #[test]
    fn test_from_u16() {
        assert_eq!(Rgb::from_u16(0xffff, 0x0000, 0x8080), Rgb::new(255, 0, 128));
    }

    #[test]
    fn test_mask_palette_rgb888() {
        let palette = MaskPalette::rgb888();
        assert_eq!(palette.lookup(0xff0000).unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(palette.lookup(0x00ff7f).unwrap(), Rgb::new(0, 255, 127));
    }

    #[test]
    fn test_mask_palette_rgb565() {
        let palette = MaskPalette::new(0xf800, 0x07e0, 0x001f);
        assert_eq!(palette.lookup(0xf800).unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(palette.lookup(0x07e0).unwrap(), Rgb::new(0, 255, 0));
        assert_eq!(palette.lookup(0xffff).unwrap().hex(), "#ffffff");
    }

    #[test]
    fn test_reporter_newline_policy() {
        let mut reporter = ColorReporter::new(Vec::new());
        reporter.report(Rgb::new(1, 2, 3), true).unwrap();
        reporter.report(Rgb::new(255, 0, 0), false).unwrap();
        assert_eq!(reporter.reports(), 2);
        assert_eq!(reporter.into_inner(), b"#010203\n#ff0000");
    }
}
