// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Event loop
//!
//! [`Picker`] owns one session together with everything its effects act
//! on: the source capture, the current snapshot, the view renderer, the
//! surface the view is shown on and the color output. It is independent
//! of X11; [`run`] wires it to a live display and drives it from the
//! connection's events.
//!
//! ```text
//!   X events ──▶ Input ──▶ Session::handle ──▶ [Effect] ──▶ Picker::apply
//!                                                             │
//!        ┌──────────────┬──────────────┬──────────────┬──────┘
//!        ▼              ▼              ▼              ▼
//!    Renderer       Capture        Surface        Reporter
//! ```

use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::KeyButMask;
use x11rb::protocol::Event;
use x11rb::NONE;

use crate::capture::x11::X11Capture;
use crate::capture::{CaptureBuffer, SourceCapture};
use crate::color::{ColorReporter, Palette};
use crate::config::{Config, SourceSelection};
use crate::display::{FocusRetry, MagnifierWindow, X11Display};
use crate::geometry::Point;
use crate::keys::Keymap;
use crate::render::{ViewFrame, ViewRenderer};
use crate::session::{Effect, Input, RunState, Session};
use crate::{Error, Result};

/// Where the view is shown.
pub trait Surface {
    /// Move the surface to the frame's placement and draw it.
    fn present(&mut self, frame: &ViewFrame<'_>) -> Result<()>;

    /// Take the surface off screen so it does not end up in a capture.
    fn hide(&mut self) -> Result<()>;

    /// Put the surface back on screen after [`Surface::hide`].
    fn show(&mut self) -> Result<()>;

    fn warp_pointer(&mut self, p: Point) -> Result<()>;

    fn reassert_focus(&mut self) -> Result<()>;
}

/// A running picker.
pub struct Picker<C, S, P, W>
where
    C: SourceCapture,
    S: Surface,
    P: Palette,
    W: Write,
{
    session: Session,
    capture: C,
    /// Current snapshot of the source
    buffer: CaptureBuffer,
    renderer: ViewRenderer,
    surface: S,
    palette: P,
    reporter: ColorReporter<W>,
}

impl<C, S, P, W> Picker<C, S, P, W>
where
    C: SourceCapture,
    S: Surface,
    P: Palette,
    W: Write,
{
    /// Take the initial snapshot and allocate the view.
    ///
    /// The surface must not be on screen yet.
    pub fn new(session: Session, mut capture: C, surface: S, palette: P, out: W) -> Result<Self> {
        let buffer = capture.capture()?;
        let renderer = ViewRenderer::new(session.quantized_view(), session.zoom())?;
        debug!(
            "View {:?} at zoom {} over {:?}",
            renderer.size(),
            renderer.zoom(),
            buffer.region()
        );

        Ok(Self {
            session,
            capture,
            buffer,
            renderer,
            surface,
            palette,
            reporter: ColorReporter::new(out),
        })
    }

    /// Show the surface and draw the first view.
    pub fn start(&mut self) -> Result<()> {
        self.surface.show()?;
        self.surface.reassert_focus()?;
        self.apply(Effect::Render)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    pub fn renderer(&self) -> &ViewRenderer {
        &self.renderer
    }

    pub fn state(&self) -> RunState {
        self.session.state()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Feed one input to the session and carry out its effects in order.
    pub fn handle(&mut self, input: Input) -> Result<RunState> {
        let settings = self.session.settings();
        for effect in self.session.handle(input) {
            match self.apply(effect) {
                Err(Error::Allocation { width, height }) => {
                    error!("Cannot allocate a {width}x{height} view, keeping the previous one");
                    self.session.restore(settings);
                }
                result => result?,
            }
        }
        Ok(self.session.state())
    }

    fn apply(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::Render => {
                let mapping = self.session.mapping();
                let frame = self
                    .renderer
                    .render(&self.buffer, &mapping, self.session.magnify_only())?;
                self.surface.present(&frame)
            }
            Effect::Reallocate => self
                .renderer
                .reallocate(self.session.quantized_view(), self.session.zoom()),
            Effect::Recapture => {
                self.surface.hide()?;
                let captured = self.capture.capture();
                self.surface.show()?;
                match captured {
                    Ok(buffer) => self.buffer = buffer,
                    Err(e) => warn!("Recapture failed, keeping the previous snapshot: {e}"),
                }
                Ok(())
            }
            Effect::Report { newline } => {
                let color = self.palette.lookup(self.renderer.center_pixel())?;
                info!("Picked {color} at {:?}", self.session.pointer());
                self.reporter.report(color, newline)?;
                Ok(())
            }
            Effect::WarpPointer(p) => self.surface.warp_pointer(p),
            Effect::ReassertFocus => self.surface.reassert_focus(),
        }
    }

    /// Handle inputs from `next` until it has none left.
    ///
    /// `next` is asked again after each batch, so inputs that arrive while
    /// a batch is handled are not left waiting. Consecutive motions within
    /// a batch are coalesced.
    pub fn drain<F>(&mut self, mut next: F) -> Result<RunState>
    where
        F: FnMut() -> Result<Option<Input>>,
    {
        while self.is_running() {
            let mut inputs = Vec::new();
            while let Some(input) = next()? {
                inputs.push(input);
            }
            if inputs.is_empty() {
                break;
            }
            for input in coalesce_motion(inputs) {
                if self.handle(input)? != RunState::Running {
                    break;
                }
            }
        }
        Ok(self.state())
    }

    /// Release the surface and return the output stream.
    pub fn finish(self) -> (S, W) {
        (self.surface, self.reporter.into_inner())
    }
}

/// Translate an X event to a session input.
fn translate(keymap: &Keymap, event: Event) -> Option<Input> {
    match event {
        Event::MotionNotify(e) => Some(Input::Motion(Point::new(
            i32::from(e.root_x),
            i32::from(e.root_y),
        ))),
        Event::ButtonPress(e) => Some(Input::Button(e.detail)),
        Event::KeyPress(e) => Some(Input::Key {
            keysym: keymap.keysym(e.detail),
            shift: u16::from(e.state) & u16::from(KeyButMask::SHIFT) != 0,
        }),
        Event::FocusOut(_) => Some(Input::FocusLost),
        Event::Error(e) => {
            warn!("X11 error: {e:?}");
            None
        }
        _ => None,
    }
}

/// Drop pointer motions that are followed by another motion.
pub fn coalesce_motion(inputs: Vec<Input>) -> Vec<Input> {
    let mut out: Vec<Input> = Vec::with_capacity(inputs.len());
    for input in inputs {
        if let (Input::Motion(_), Some(Input::Motion(_))) = (&input, out.last()) {
            out.pop();
        }
        out.push(input);
    }
    out
}

/// Block until `fd` is readable or a signal arrives.
fn wait_readable(fd: RawFd) -> io::Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a valid pollfd that outlives the call
    let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    Ok(())
}

/// Run the picker on the display named by `$DISPLAY` until it finishes,
/// fails or `stop` is raised.
pub fn run(config: &Config, stop: &AtomicBool) -> Result<RunState> {
    let display = X11Display::connect()?;
    let conn = display.conn();

    let (pointer, child) = display.query_pointer()?;
    let source = match config.source {
        SourceSelection::Root => display.root(),
        SourceSelection::UnderPointer if child == NONE => {
            info!("No window under the pointer, picking from the root window");
            display.root()
        }
        SourceSelection::UnderPointer => child,
        SourceSelection::Window(id) => id,
    };
    let region = display.window_region(source)?;
    info!("Source window {source:#x} covers {region:?}");

    let pointer = if region.contains(pointer) {
        pointer
    } else {
        let center = region.center();
        display.warp_pointer(center)?;
        center
    };

    let session = Session::new(config.session_options(region.size()), region, pointer);
    let window = MagnifierWindow::new(&display, FocusRetry::from_timeout(config.focus_timeout))?;
    debug!("Magnifier window is {:#x}", window.id());

    let capture = X11Capture::new(conn, source, region);
    let mut picker = Picker::new(session, capture, window, display.palette(), io::stdout().lock())?;
    picker.start()?;

    let fd = conn.stream().as_raw_fd();
    while picker.is_running() {
        if stop.load(Ordering::SeqCst) {
            info!("Interrupted");
            picker.handle(Input::Signal)?;
            break;
        }

        // Replies waited on while handling read later events into the
        // connection's queue, where poll() cannot see them.
        picker.drain(|| {
            while let Some(event) = conn.poll_for_event()? {
                if let Some(input) = translate(display.keymap(), event) {
                    return Ok(Some(input));
                }
            }
            Ok(None)
        })?;

        if picker.is_running() {
            conn.flush()?;
            wait_readable(fd)?;
        }
    }

    let state = picker.state();
    info!("Picker finished: {state:?}");
    Ok(state)
}

/// Surface recording what is done to it
pub mod stub {
    use super::*;
    use crate::geometry::Rect;
    use crate::raster::Raster;

    /// Overlay value of the stub, white on a 24-bit visual
    pub const XOR_VALUE: u32 = 0xffffff;

    #[derive(Debug, Default)]
    pub struct StubSurface {
        /// Placement of each presented frame
        pub placements: Vec<Rect>,
        /// Overlays of the last frame
        pub overlays: Vec<Rect>,
        /// Last frame with its overlays applied
        pub last: Option<Raster>,
        pub warps: Vec<Point>,
        pub focus_requests: usize,
        pub hides: usize,
        pub shows: usize,
    }

    impl StubSurface {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn frames(&self) -> usize {
            self.placements.len()
        }
    }

    impl Surface for StubSurface {
        fn present(&mut self, frame: &ViewFrame<'_>) -> Result<()> {
            self.placements.push(frame.placement);
            self.overlays = frame.overlays.clone();
            self.last = Some(frame.composited(XOR_VALUE));
            Ok(())
        }

        fn hide(&mut self) -> Result<()> {
            self.hides += 1;
            Ok(())
        }

        fn show(&mut self) -> Result<()> {
            self.shows += 1;
            Ok(())
        }

        fn warp_pointer(&mut self, p: Point) -> Result<()> {
            self.warps.push(p);
            Ok(())
        }

        fn reassert_focus(&mut self) -> Result<()> {
            self.focus_requests += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StubSurface;
    use super::*;
    use crate::capture::stub::StubCapture;
    use crate::color::MaskPalette;
    use crate::geometry::{Rect, Size};
    use crate::keys::keysyms;
    use crate::session::SessionOptions;

    type TestPicker = Picker<StubCapture, StubSurface, MaskPalette, Vec<u8>>;

    fn picker(options: SessionOptions) -> TestPicker {
        let source = Rect::new(0, 0, 200, 100);
        let session = Session::new(options, source, Point::new(100, 50));
        let mut picker = Picker::new(
            session,
            StubCapture::new(source),
            StubSurface::new(),
            MaskPalette::rgb888(),
            Vec::new(),
        )
        .unwrap();
        picker.start().unwrap();
        picker
    }

    fn key(keysym: u32) -> Input {
        Input::Key {
            keysym,
            shift: false,
        }
    }

    #[test]
    fn test_start_shows_and_renders() {
        let picker = picker(SessionOptions::default());
        let surface = picker.surface();
        assert_eq!(surface.shows, 1);
        assert_eq!(surface.focus_requests, 1);
        assert_eq!(surface.frames(), 1);
        assert_eq!(surface.overlays.len(), 2);
    }

    #[test]
    fn test_pick_reports_crosshair_color() {
        let mut picker = picker(SessionOptions::default());
        assert_eq!(picker.handle(key(keysyms::RETURN)).unwrap(), RunState::Finished);

        // Stub pattern at (100, 50), first capture.
        let (_, out) = picker.finish();
        assert_eq!(String::from_utf8(out).unwrap(), "#643201\n");
    }

    #[test]
    fn test_sample_keeps_running() {
        let mut picker = picker(SessionOptions::default());
        assert_eq!(picker.handle(key(keysyms::SPACE)).unwrap(), RunState::Running);
        assert_eq!(picker.handle(key(keysyms::SPACE)).unwrap(), RunState::Running);
        let (_, out) = picker.finish();
        assert_eq!(String::from_utf8(out).unwrap(), "#643201\n#643201\n");
    }

    #[test]
    fn test_quit_reports_nothing() {
        let mut picker = picker(SessionOptions::default());
        assert_eq!(picker.handle(key(keysyms::Q)).unwrap(), RunState::Finished);
        let (_, out) = picker.finish();
        assert!(out.is_empty());
    }

    #[test]
    fn test_refresh_hides_during_capture() {
        let mut picker = picker(SessionOptions::default());
        assert_eq!(picker.buffer().generation(), 1);

        picker.handle(key(keysyms::R)).unwrap();
        assert_eq!(picker.buffer().generation(), 2);
        assert_eq!(picker.surface().hides, 1);
        assert_eq!(picker.surface().shows, 2);
        assert_eq!(picker.surface().frames(), 2);
    }

    #[test]
    fn test_auto_refresh_on_motion() {
        let mut picker = picker(SessionOptions {
            auto_refresh: true,
            ..Default::default()
        });
        picker.handle(Input::Motion(Point::new(10, 10))).unwrap();
        picker.handle(Input::Motion(Point::new(11, 10))).unwrap();
        assert_eq!(picker.buffer().generation(), 3);
    }

    #[test]
    fn test_zoom_change_reallocates() {
        let mut picker = picker(SessionOptions::default());
        picker.handle(key(keysyms::KEY_0 + 3)).unwrap();
        assert_eq!(picker.renderer().zoom(), 3);
        assert_eq!(picker.renderer().size(), picker.session().quantized_view());
        assert_eq!(picker.surface().frames(), 2);
    }

    #[test]
    fn test_move_warps_pointer() {
        let mut picker = picker(SessionOptions::default());
        picker.handle(key(keysyms::LEFT)).unwrap();
        let warped = picker.surface().warps.clone();
        assert_eq!(warped, vec![picker.session().pointer()]);
        assert!(picker.session().pointer().x < 100);
    }

    #[test]
    fn test_focus_loss_reasserts() {
        let mut picker = picker(SessionOptions::default());
        picker.handle(Input::FocusLost).unwrap();
        assert_eq!(picker.surface().focus_requests, 2);
    }

    #[test]
    fn test_signal_fails_without_report() {
        let mut picker = picker(SessionOptions::default());
        assert_eq!(picker.handle(Input::Signal).unwrap(), RunState::Failed);
        assert!(picker.finish().1.is_empty());
    }

    #[test]
    fn test_view_matches_session() {
        let picker = picker(SessionOptions {
            view_size: Size::new(47, 31),
            zoom: 4,
            ..Default::default()
        });
        let last = picker.surface().last.clone().unwrap();
        assert_eq!(last.size(), Size::new(44, 28));
        assert_eq!(picker.surface().placements[0].size(), Size::new(44, 28));
    }

    #[test]
    fn test_coalesce_motion() {
        let inputs = vec![
            Input::Motion(Point::new(1, 1)),
            Input::Motion(Point::new(2, 2)),
            key(keysyms::SPACE),
            Input::Motion(Point::new(3, 3)),
            Input::Motion(Point::new(4, 4)),
            Input::Motion(Point::new(5, 5)),
        ];
        assert_eq!(
            coalesce_motion(inputs),
            vec![
                Input::Motion(Point::new(2, 2)),
                key(keysyms::SPACE),
                Input::Motion(Point::new(5, 5)),
            ]
        );
    }

    #[test]
    fn test_drain_picks_up_late_inputs() {
        use std::collections::VecDeque;

        let mut picker = picker(SessionOptions::default());
        // `None` ends a batch; the Return arrives while the motions are handled.
        let mut queue = VecDeque::from([
            Some(Input::Motion(Point::new(10, 10))),
            Some(Input::Motion(Point::new(20, 30))),
            None,
            Some(key(keysyms::RETURN)),
            None,
        ]);
        let state = picker.drain(|| Ok(queue.pop_front().flatten())).unwrap();

        assert_eq!(state, RunState::Finished);
        assert!(queue.is_empty());
        assert_eq!(picker.surface().frames(), 2);
        let (_, out) = picker.finish();
        assert_eq!(String::from_utf8(out).unwrap(), "#141e01\n");
    }

    #[test]
    fn test_drain_stops_at_termination() {
        use std::collections::VecDeque;

        let mut picker = picker(SessionOptions::default());
        let mut queue = VecDeque::from([
            Some(key(keysyms::Q)),
            None,
            Some(key(keysyms::SPACE)),
            None,
        ]);
        let state = picker.drain(|| Ok(queue.pop_front().flatten())).unwrap();

        assert_eq!(state, RunState::Finished);
        assert_eq!(queue.len(), 2);
        assert!(picker.finish().1.is_empty());
    }

    #[test]
    fn test_failed_reallocation_keeps_view() {
        let mut picker = picker(SessionOptions {
            view_size: Size::new(1, 1),
            increment: i32::MAX,
            co_scale: true,
            ..Default::default()
        });
        let placement = picker.surface().placements[0];
        assert_eq!(picker.renderer().size(), Size::new(5, 5));

        // The zoom saturates and the view no longer fits in memory.
        let state = picker
            .handle(Input::Key {
                keysym: keysyms::I,
                shift: true,
            })
            .unwrap();

        assert_eq!(state, RunState::Running);
        assert_eq!(picker.session().zoom(), 5);
        assert_eq!(picker.session().view_size(), Size::new(1, 1));
        assert_eq!(picker.renderer().size(), Size::new(5, 5));
        assert_eq!(picker.renderer().zoom(), 5);
        assert_eq!(picker.surface().frames(), 2);
        assert_eq!(picker.surface().placements[1], placement);
    }
}
