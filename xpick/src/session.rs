// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Session state and input handling
//!
//! The session is the single mutable record of a picker run. Inputs come
//! from the event loop; the session updates itself and answers with the
//! effects the loop has to carry out, in order.

use log::{debug, error};

use crate::geometry::{map_view, quantize_view, Point, Rect, Size, ViewMapping};
use crate::keys::{bind, Command, Direction};

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Terminating normally, exit code 0
    Finished,
    /// Terminating on error, signal or unknown key, exit code 1
    Failed,
}

/// Mouse buttons as numbered by the core protocol.
pub mod buttons {
    pub const WHEEL_UP: u8 = 4;
    pub const WHEEL_DOWN: u8 = 5;
}

/// Inputs fed to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    /// Pointer moved to this screen position
    Motion(Point),
    /// Mouse button pressed
    Button(u8),
    /// Key pressed, as a keysym
    Key { keysym: u32, shift: bool },
    /// The magnifier lost input focus
    FocusLost,
    /// SIGINT or SIGTERM was received
    Signal,
}

/// Work for the event loop, carried out in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Re-render the view and push it to the window
    Render,
    /// Reallocate the view for the new size or zoom
    Reallocate,
    /// Recapture the source
    Recapture,
    /// Print the color under the crosshair
    Report { newline: bool },
    /// Move the real pointer to this screen position
    WarpPointer(Point),
    /// Take the input focus back
    ReassertFocus,
}

/// Startup values of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub view_size: Size,
    pub zoom: i32,
    /// Resize step in pixels
    pub increment: i32,
    pub magnify_only: bool,
    pub auto_refresh: bool,
    /// Newline after the final report
    pub newline: bool,
    /// Scale the zoom along with Shift+resize
    pub co_scale: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            view_size: Size::new(90, 90),
            zoom: 5,
            increment: 10,
            magnify_only: false,
            auto_refresh: false,
            newline: true,
            co_scale: false,
        }
    }
}

/// The parts of the session that size the view buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewSettings {
    pub view_size: Size,
    pub zoom: i32,
}

/// Session state.
#[derive(Clone, Debug)]
pub struct Session {
    /// Pointer in screen coordinates
    pointer: Point,
    /// Requested view size, before quantization
    view_size: Size,
    zoom: i32,
    increment: i32,
    magnify_only: bool,
    auto_refresh: bool,
    newline: bool,
    co_scale: bool,
    /// Source region in screen coordinates
    source: Rect,
    state: RunState,
}

impl Session {
    pub fn new(options: SessionOptions, source: Rect, pointer: Point) -> Self {
        Self {
            pointer: source.clamp_point(pointer),
            view_size: Size::new(options.view_size.width.max(1), options.view_size.height.max(1)),
            zoom: options.zoom.max(1),
            increment: options.increment.max(1),
            magnify_only: options.magnify_only,
            auto_refresh: options.auto_refresh,
            newline: options.newline,
            co_scale: options.co_scale,
            source,
            state: RunState::Running,
        }
    }

    pub fn pointer(&self) -> Point {
        self.pointer
    }

    pub fn view_size(&self) -> Size {
        self.view_size
    }

    pub fn zoom(&self) -> i32 {
        self.zoom
    }

    pub fn increment(&self) -> i32 {
        self.increment
    }

    pub fn magnify_only(&self) -> bool {
        self.magnify_only
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn source(&self) -> Rect {
        self.source
    }

    /// View size rounded to whole zoom blocks.
    pub fn quantized_view(&self) -> Size {
        quantize_view(self.view_size, self.zoom, self.source.size())
    }

    /// Current placement and sampling of the view.
    pub fn mapping(&self) -> ViewMapping {
        map_view(self.pointer, self.quantized_view(), self.zoom, self.source)
    }

    pub fn settings(&self) -> ViewSettings {
        ViewSettings {
            view_size: self.view_size,
            zoom: self.zoom,
        }
    }

    /// Roll back a view change whose reallocation failed.
    pub fn restore(&mut self, settings: ViewSettings) {
        self.view_size = settings.view_size;
        self.zoom = settings.zoom;
    }

    /// Terminate from outside the input path.
    pub fn fail(&mut self) {
        self.state = RunState::Failed;
    }

    /// Apply one input.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if !self.is_running() {
            return Vec::new();
        }

        match input {
            Input::Motion(p) => {
                self.pointer = self.source.clamp_point(p);
                if self.auto_refresh {
                    vec![Effect::Recapture, Effect::Render]
                } else {
                    vec![Effect::Render]
                }
            }
            Input::Button(buttons::WHEEL_UP) => self.set_zoom(self.zoom.saturating_add(1)),
            Input::Button(buttons::WHEEL_DOWN) => self.set_zoom(self.zoom - 1),
            Input::Button(button) if button < buttons::WHEEL_UP => {
                self.state = RunState::Finished;
                if self.magnify_only {
                    Vec::new()
                } else {
                    vec![Effect::Report {
                        newline: self.newline,
                    }]
                }
            }
            Input::Button(button) => {
                debug!("Ignoring button {button}");
                Vec::new()
            }
            Input::Key { keysym, shift } => self.command(bind(keysym, shift)),
            Input::FocusLost => vec![Effect::ReassertFocus],
            Input::Signal => {
                self.state = RunState::Failed;
                Vec::new()
            }
        }
    }

    fn command(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Pick => {
                self.state = RunState::Finished;
                vec![Effect::Report {
                    newline: self.newline,
                }]
            }
            Command::Sample => vec![Effect::Report { newline: true }],
            Command::Move(direction) => self.move_view(direction),
            Command::Refresh => vec![Effect::Recapture, Effect::Render],
            Command::ToggleAutoRefresh => {
                self.auto_refresh = !self.auto_refresh;
                debug!("Auto refresh {}", if self.auto_refresh { "on" } else { "off" });
                Vec::new()
            }
            Command::ToggleMagnify => {
                self.magnify_only = !self.magnify_only;
                vec![Effect::Render]
            }
            Command::SquareFit => {
                let side = self.view_size.min_dimension();
                self.view_size = Size::new(side, side);
                self.set_zoom(side / 9)
            }
            Command::Grow(shift) => {
                let height = self.view_size.height;
                if shift && self.co_scale {
                    let grown = i64::from(height) + i64::from(self.increment);
                    self.zoom = scaled_zoom(self.zoom, grown, height).max(2);
                }
                self.view_size = Size::new(
                    self.view_size.width.saturating_add(self.increment),
                    height.saturating_add(self.increment),
                );
                vec![Effect::Reallocate, Effect::Render]
            }
            Command::Shrink(shift) => {
                let height = self.view_size.height;
                let shrunk = (height - self.increment).max(1);
                if shift && self.co_scale {
                    self.zoom = scaled_zoom(self.zoom, i64::from(shrunk), height).max(1);
                }
                self.view_size = Size::new((self.view_size.width - self.increment).max(1), shrunk);
                vec![Effect::Reallocate, Effect::Render]
            }
            Command::ZoomIn => self.set_zoom(self.zoom.saturating_add(1)),
            Command::ZoomOut => self.set_zoom(self.zoom - 1),
            Command::SetZoom(zoom) => self.set_zoom(zoom),
            Command::Ignore => Vec::new(),
            Command::Quit => {
                self.state = RunState::Finished;
                Vec::new()
            }
            Command::Unknown(name) => {
                error!("Unknown key '{name}'. Exiting.");
                self.state = RunState::Failed;
                Vec::new()
            }
        }
    }

    fn set_zoom(&mut self, zoom: i32) -> Vec<Effect> {
        self.zoom = zoom.max(1);
        vec![Effect::Reallocate, Effect::Render]
    }

    /// Step of a keyboard move along a view dimension.
    fn step(&self, dimension: i32) -> i32 {
        (dimension / self.zoom / 2 - 3).max(1)
    }

    fn move_view(&mut self, direction: Direction) -> Vec<Effect> {
        let (dx, dy) = match direction {
            Direction::Up => (0, -self.step(self.view_size.height)),
            Direction::Down => (0, self.step(self.view_size.height)),
            Direction::Left => (-self.step(self.view_size.width), 0),
            Direction::Right => (self.step(self.view_size.width), 0),
        };
        self.pointer = self
            .source
            .clamp_point(Point::new(self.pointer.x + dx, self.pointer.y + dy));
        vec![Effect::WarpPointer(self.pointer), Effect::Render]
    }
}

/// `zoom * num / den`, saturating at `i32::MAX`.
fn scaled_zoom(zoom: i32, num: i64, den: i32) -> i32 {
    let scaled = i64::from(zoom) * num / i64::from(den.max(1));
    i32::try_from(scaled).unwrap_or(i32::MAX)
}
