// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! xpick
//!
//! An X11 screen color picker and pixel magnifier. A snapshot of the root
//! window (or of one selected window) is taken at startup, a magnifier
//! window follows the pointer showing a block-scaled view of the snapshot,
//! and the color under the crosshair is printed as `#rrggbb` on click or
//! key press.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Event Loop (app)                       │
//! │  - poll() on the X connection                               │
//! │  - signal flag                                              │
//! └─────────────────────────────────────────────────────────────┘
//!                            │ Input
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Session (state machine)                  │
//! │  - pointer / zoom / view size / flags                       │
//! └─────────────────────────────────────────────────────────────┘
//!                            │ Effect
//!          ┌─────────────────┼─────────────────┐
//!          ▼                 ▼                 ▼
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ Capture     │   │ Coordinate  │   │ Color       │
//! │ Buffer      │──▶│ Mapper +    │   │ Reporter    │
//! │             │   │ Renderer    │   │             │
//! └─────────────┘   └─────────────┘   └─────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Magnifier Window (display)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything except [`display`], [`app`] and the `x11` capture backend is
//! independent of a running X server.
//!
//! # Modules
//!
//! - [`geometry`]: View quantization and the coordinate mapper
//! - [`raster`]: Owned pixel rasters
//! - [`capture`]: Source snapshots
//! - [`render`]: Block-scaled view synthesis
//! - [`color`]: Pixel to `#rrggbb` conversion and reporting
//! - [`keys`]: Keysyms and key bindings
//! - [`session`]: Session state and input handling
//! - [`config`]: Command line configuration
//! - [`display`]: X11 connection and magnifier window
//! - [`app`]: Event loop

pub mod app;
pub mod capture;
pub mod color;
pub mod config;
pub mod display;
pub mod geometry;
pub mod keys;
pub mod raster;
pub mod render;
pub mod session;

pub use capture::{CaptureBuffer, SourceCapture};
pub use color::{ColorReporter, MaskPalette, Palette, Rgb};
pub use config::{Config, ConfigError, Parsed};
pub use geometry::{Point, Rect, Size, ViewMapping};
pub use raster::Raster;
pub use render::{ViewFrame, ViewRenderer};
pub use session::{Effect, Input, RunState, Session};

/// Result type for picker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Picker error types.
///
/// Startup code treats every variant as fatal. Inside the event loop,
/// [`Error::Allocation`] is recovered from by keeping the previous view.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The display server could not be reached.
    #[error("Failed to open display: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    /// The connection to the display server broke.
    #[error("Display connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    /// A request returned an X11 error or the connection broke while
    /// waiting for a reply.
    #[error("Display request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    /// Allocating an X resource id failed.
    #[error("Failed to allocate X resource: {0}")]
    ResourceId(#[from] x11rb::errors::ReplyOrIdError),

    /// The server's image format could not be interpreted.
    #[error("Unsupported image format: {0}")]
    Parse(#[from] x11rb::errors::ParseError),

    /// The configured screen does not exist.
    #[error("Screen {0} not found")]
    NoScreen(usize),

    /// The attributes of the source window could not be read.
    #[error("Failed to get window attributes: {0:#x}")]
    SourceAttributes(u32),

    /// The source could not be captured.
    #[error("Failed to capture source: {0}")]
    Capture(String),

    /// A pixel buffer could not be allocated.
    #[error("Failed to allocate {width}x{height} raster")]
    Allocation { width: i32, height: i32 },

    /// A rendered view did not match the buffer it was drawn into.
    #[error("View size mismatch: expected {expected:?}, got {actual:?}")]
    ViewSize { expected: Size, actual: Size },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
