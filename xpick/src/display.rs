// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! X11 display and magnifier window
//!
//! Wraps the connection to the X server and the resources of the
//! magnifier window. Resources are released in reverse order of
//! acquisition, and only those that were actually acquired.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::image::Image;
use x11rb::protocol::xproto::{
    Colormap, ConfigureWindowAux, ConnectionExt as XprotoExt, CreateGCAux, CreateWindowAux,
    Cursor, EventMask, Gcontext, GrabMode, GrabStatus, InputFocus, Rectangle, Screen, StackMode,
    SubwindowMode, Window, WindowClass, GX,
};
use x11rb::rust_connection::RustConnection;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT, CURRENT_TIME, NONE};

use crate::app::Surface;
use crate::color::{Palette, Rgb};
use crate::geometry::{Point, Rect};
use crate::keys::Keymap;
use crate::render::ViewFrame;
use crate::{Error, Result};

/// Spacing between focus attempts
pub const FOCUS_RETRY_INTERVAL: Duration = Duration::from_millis(10);
/// Focus losses after which reassertion is given up
pub const MAX_FOCUS_EPISODES: u32 = 100;

/// Bounded retry policy for taking the input focus back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FocusRetry {
    /// Attempts per focus loss
    pub attempts: u32,
    pub interval: Duration,
    /// Focus losses handled before giving up for good
    pub max_episodes: u32,
}

impl FocusRetry {
    /// Spread `timeout` over attempts spaced by [`FOCUS_RETRY_INTERVAL`].
    pub fn from_timeout(timeout: Duration) -> Self {
        let attempts = timeout.as_millis() / FOCUS_RETRY_INTERVAL.as_millis();
        Self {
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX).max(1),
            interval: FOCUS_RETRY_INTERVAL,
            max_episodes: MAX_FOCUS_EPISODES,
        }
    }
}

impl Default for FocusRetry {
    fn default() -> Self {
        Self::from_timeout(Duration::from_millis(1000))
    }
}

/// Connection to the X server.
pub struct X11Display {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    keymap: Keymap,
}

impl X11Display {
    /// Connect to `$DISPLAY`.
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or(Error::NoScreen(screen_num))?
            .root;

        let setup = conn.setup();
        let count = setup.max_keycode - setup.min_keycode + 1;
        let reply = conn
            .get_keyboard_mapping(setup.min_keycode, count)?
            .reply()?;
        let keymap = Keymap::new(setup.min_keycode, reply.keysyms_per_keycode, reply.keysyms);

        info!("Connected to X server, screen {screen_num}");

        Ok(Self {
            conn,
            screen_num,
            root,
            keymap,
        })
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn root(&self) -> Window {
        self.root
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn screen(&self) -> &Screen {
        // Checked in connect().
        &self.conn.setup().roots[self.screen_num]
    }

    /// Pointer position in root coordinates and the top level child of the
    /// root under it (`NONE` if there is none).
    pub fn query_pointer(&self) -> Result<(Point, Window)> {
        let reply = self.conn.query_pointer(self.root)?.reply()?;
        Ok((
            Point::new(i32::from(reply.root_x), i32::from(reply.root_y)),
            reply.child,
        ))
    }

    /// Region covered by `window`, in root coordinates.
    pub fn window_region(&self, window: Window) -> Result<Rect> {
        let geometry = self
            .conn
            .get_geometry(window)?
            .reply()
            .map_err(|_| Error::SourceAttributes(window))?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)?
            .reply()
            .map_err(|_| Error::SourceAttributes(window))?;
        Ok(Rect::new(
            i32::from(origin.dst_x),
            i32::from(origin.dst_y),
            i32::from(geometry.width),
            i32::from(geometry.height),
        ))
    }

    /// Move the pointer to `p` in root coordinates.
    pub fn warp_pointer(&self, p: Point) -> Result<()> {
        self.conn
            .warp_pointer(NONE, self.root, 0, 0, 0, 0, clamp_i16(p.x), clamp_i16(p.y))?;
        self.conn.flush()?;
        Ok(())
    }

    /// Round trip to the server; all earlier requests have been processed
    /// when this returns.
    pub fn sync(&self) -> Result<()> {
        self.conn.get_input_focus()?.reply()?;
        Ok(())
    }

    /// Palette resolving pixels through the default colormap.
    pub fn palette(&self) -> ColormapPalette<'_> {
        ColormapPalette {
            conn: &self.conn,
            colormap: self.screen().default_colormap,
        }
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn clamp_u16(value: i32) -> u16 {
    value.clamp(0, i32::from(u16::MAX)) as u16
}

/// Side of the invisible cursor bitmap
const CURSOR_SIZE: u16 = 1;

/// Rectangle covering a whole `width` x `height` drawable.
fn cover(width: u16, height: u16) -> Rectangle {
    Rectangle {
        x: 0,
        y: 0,
        width,
        height,
    }
}

/// Resolves pixels with QueryColors on a colormap.
pub struct ColormapPalette<'c> {
    conn: &'c RustConnection,
    colormap: Colormap,
}

impl Palette for ColormapPalette<'_> {
    fn lookup(&self, pixel: u32) -> Result<Rgb> {
        let reply = self.conn.query_colors(self.colormap, &[pixel])?.reply()?;
        let color = reply
            .colors
            .first()
            .ok_or_else(|| Error::Capture(format!("no color for pixel {pixel:#x}")))?;
        Ok(Rgb::from_u16(color.red, color.green, color.blue))
    }
}

/// X resources owned by the magnifier, freed on drop.
struct Resources<'c> {
    conn: &'c RustConnection,
    cursor: Option<Cursor>,
    window: Option<Window>,
    copy_gc: Option<Gcontext>,
    xor_gc: Option<Gcontext>,
}

impl Drop for Resources<'_> {
    fn drop(&mut self) {
        // Valid even when the pointer is not grabbed.
        self.conn.ungrab_pointer(CURRENT_TIME).ok();
        if let Some(gc) = self.xor_gc.take() {
            self.conn.free_gc(gc).ok();
        }
        if let Some(gc) = self.copy_gc.take() {
            self.conn.free_gc(gc).ok();
        }
        if let Some(window) = self.window.take() {
            self.conn.destroy_window(window).ok();
        }
        if let Some(cursor) = self.cursor.take() {
            self.conn.free_cursor(cursor).ok();
        }
        self.conn.flush().ok();
        debug!("Magnifier resources released");
    }
}

/// The pointer-following magnifier window.
pub struct MagnifierWindow<'c> {
    display: &'c X11Display,
    res: Resources<'c>,
    window: Window,
    copy_gc: Gcontext,
    xor_gc: Gcontext,
    focus: FocusRetry,
    focus_episodes: u32,
}

impl<'c> MagnifierWindow<'c> {
    /// Create the (unmapped) window, its invisible cursor and its GCs.
    pub fn new(display: &'c X11Display, focus: FocusRetry) -> Result<Self> {
        let conn = display.conn();
        let screen = display.screen();
        let root = display.root();

        let mut res = Resources {
            conn,
            cursor: None,
            window: None,
            copy_gc: None,
            xor_gc: None,
        };

        // Cleared 1x1 bitmap as both source and mask: an invisible cursor.
        // New pixmaps have undefined contents.
        let empty = conn.generate_id()?;
        conn.create_pixmap(1, empty, root, CURSOR_SIZE, CURSOR_SIZE)?;
        let clear_gc = conn.generate_id()?;
        conn.create_gc(clear_gc, empty, &CreateGCAux::new().foreground(0u32))?;
        conn.poly_fill_rectangle(empty, clear_gc, &[cover(CURSOR_SIZE, CURSOR_SIZE)])?;
        conn.free_gc(clear_gc)?;
        let cursor = conn.generate_id()?;
        let created = conn.create_cursor(cursor, empty, empty, 0, 0, 0, 0, 0, 0, 0, 0);
        conn.free_pixmap(empty)?;
        created?;
        res.cursor = Some(cursor);

        let window = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .event_mask(
                    EventMask::BUTTON_PRESS
                        | EventMask::POINTER_MOTION
                        | EventMask::KEY_PRESS
                        | EventMask::FOCUS_CHANGE,
                )
                .background_pixel(screen.black_pixel)
                .override_redirect(1u32)
                .cursor(cursor),
        )?;
        res.window = Some(window);

        let copy_gc = conn.generate_id()?;
        conn.create_gc(
            copy_gc,
            root,
            &CreateGCAux::new()
                .function(GX::COPY)
                .plane_mask(!0u32)
                .subwindow_mode(SubwindowMode::INCLUDE_INFERIORS)
                .foreground(screen.white_pixel)
                .background(screen.black_pixel),
        )?;
        res.copy_gc = Some(copy_gc);

        let xor_gc = conn.generate_id()?;
        conn.create_gc(
            xor_gc,
            root,
            &CreateGCAux::new()
                .function(GX::XOR)
                .line_width(1u32)
                .subwindow_mode(SubwindowMode::INCLUDE_INFERIORS)
                .foreground(screen.white_pixel)
                .background(screen.black_pixel),
        )?;
        res.xor_gc = Some(xor_gc);

        // Surfaces creation errors before the window is used.
        display.sync()?;
        debug!("Magnifier window {window:#x} created");

        Ok(Self {
            display,
            res,
            window,
            copy_gc,
            xor_gc,
            focus,
            focus_episodes: 0,
        })
    }

    pub fn id(&self) -> Window {
        self.window
    }

    pub fn map(&self) -> Result<()> {
        self.res.conn.map_window(self.window)?;
        self.res.conn.flush()?;
        Ok(())
    }

    /// Unmap and wait until the server has processed it.
    pub fn unmap(&self) -> Result<()> {
        self.res.conn.unmap_window(self.window)?;
        self.display.sync()
    }

    /// Confine the pointer to the magnifier. Failure is not fatal.
    pub fn grab_pointer(&self) -> Result<bool> {
        let reply = self
            .res
            .conn
            .grab_pointer(
                true,
                self.window,
                EventMask::NO_EVENT,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                self.window,
                NONE,
                CURRENT_TIME,
            )?
            .reply()?;
        if reply.status == GrabStatus::SUCCESS {
            Ok(true)
        } else {
            warn!("Cannot grab the pointer: {:?}", reply.status);
            Ok(false)
        }
    }
}

impl Surface for MagnifierWindow<'_> {
    /// Take the input focus back and raise the window.
    ///
    /// Retries as configured by [`FocusRetry`] and gives up silently.
    fn reassert_focus(&mut self) -> Result<()> {
        self.focus_episodes += 1;
        if self.focus_episodes > self.focus.max_episodes {
            return Ok(());
        }

        let conn = self.res.conn;
        for _ in 0..self.focus.attempts {
            if conn.get_input_focus()?.reply()?.focus == self.window {
                return Ok(());
            }
            conn.set_input_focus(InputFocus::PARENT, self.window, CURRENT_TIME)?;
            conn.configure_window(
                self.window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
            conn.flush()?;
            thread::sleep(self.focus.interval);
        }
        debug!("Could not take the input focus back");
        Ok(())
    }

    /// Place the window and draw `frame` into it.
    fn present(&mut self, frame: &ViewFrame<'_>) -> Result<()> {
        let conn = self.res.conn;
        let placement = frame.placement;

        conn.configure_window(
            self.window,
            &ConfigureWindowAux::new()
                .x(placement.x)
                .y(placement.y)
                .width(placement.width.max(1) as u32)
                .height(placement.height.max(1) as u32),
        )?;

        let raster = frame.raster;
        let (width, height) = (clamp_u16(raster.width()), clamp_u16(raster.height()));
        let mut image = Image::allocate_native(width, height, self.display.screen().root_depth, conn.setup())?;
        for y in 0..height {
            for x in 0..width {
                if let Some(pixel) = raster.get(i32::from(x), i32::from(y)) {
                    image.put_pixel(x, y, pixel);
                }
            }
        }
        image.put(conn, self.window, self.copy_gc, 0, 0)?;

        let rectangles: Vec<Rectangle> = frame
            .overlays
            .iter()
            .map(|r| Rectangle {
                x: clamp_i16(r.x),
                y: clamp_i16(r.y),
                width: clamp_u16(r.width),
                height: clamp_u16(r.height),
            })
            .collect();
        conn.poly_rectangle(self.window, self.xor_gc, &rectangles)?;
        conn.flush()?;
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        self.unmap()
    }

    fn show(&mut self) -> Result<()> {
        self.map()?;
        self.grab_pointer()?;
        Ok(())
    }

    fn warp_pointer(&mut self, p: Point) -> Result<()> {
        self.display.warp_pointer(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_retry_default() {
        let retry = FocusRetry::default();
        assert_eq!(retry.attempts, 100);
        assert_eq!(retry.interval, Duration::from_millis(10));
        assert_eq!(retry.max_episodes, 100);
    }

    #[test]
    fn test_focus_retry_from_timeout() {
        assert_eq!(FocusRetry::from_timeout(Duration::from_millis(250)).attempts, 25);
        assert_eq!(FocusRetry::from_timeout(Duration::ZERO).attempts, 1);
    }

    #[test]
    fn test_clamp_helpers() {
        assert_eq!(clamp_i16(40000), i16::MAX);
        assert_eq!(clamp_i16(-5), -5);
        assert_eq!(clamp_u16(-5), 0);
        assert_eq!(clamp_u16(70000), u16::MAX);
    }

    #[test]
    fn test_cover_whole_cursor_bitmap() {
        let rect = cover(CURSOR_SIZE, CURSOR_SIZE);
        assert_eq!((rect.x, rect.y), (0, 0));
        assert_eq!((rect.width, rect.height), (1, 1));
    }
}
