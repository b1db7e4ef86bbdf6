// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Key handling
//!
//! Keycodes are translated to group 0, level 0 keysyms through the server's
//! keyboard mapping; keysyms are then bound to picker commands. Shift is
//! passed separately so `r` and `Shift+r` can mean different things.

/// Keysym values used by the bindings (from `X11/keysymdef.h`).
pub mod keysyms {
    pub const SPACE: u32 = 0x0020;
    pub const MINUS: u32 = 0x002d;
    pub const EQUAL: u32 = 0x003d;
    pub const KEY_0: u32 = 0x0030;
    pub const KEY_9: u32 = 0x0039;

    pub const D: u32 = 0x0064;
    pub const H: u32 = 0x0068;
    pub const I: u32 = 0x0069;
    pub const J: u32 = 0x006a;
    pub const K: u32 = 0x006b;
    pub const L: u32 = 0x006c;
    pub const M: u32 = 0x006d;
    pub const O: u32 = 0x006f;
    pub const P: u32 = 0x0070;
    pub const Q: u32 = 0x0071;
    pub const R: u32 = 0x0072;
    pub const S: u32 = 0x0073;

    pub const RETURN: u32 = 0xff0d;
    pub const ESCAPE: u32 = 0xff1b;
    pub const LEFT: u32 = 0xff51;
    pub const UP: u32 = 0xff52;
    pub const RIGHT: u32 = 0xff53;
    pub const DOWN: u32 = 0xff54;
    pub const SHIFT_L: u32 = 0xffe1;
    pub const SHIFT_R: u32 = 0xffe2;
}

/// Direction of a keyboard move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// What a key press asks the picker to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Report the color and finish
    Pick,
    /// Report the color and keep running
    Sample,
    /// Move the view
    Move(Direction),
    /// Recapture the source
    Refresh,
    ToggleAutoRefresh,
    ToggleMagnify,
    /// Square view with a matching zoom
    SquareFit,
    /// Grow the view by the increment; `true` co-scales the zoom
    Grow(bool),
    /// Shrink the view by the increment; `true` co-scales the zoom
    Shrink(bool),
    ZoomIn,
    ZoomOut,
    /// Set the zoom to a fixed value
    SetZoom(i32),
    /// Modifier keys
    Ignore,
    /// Finish without reporting
    Quit,
    /// Unbound key, carrying its name
    Unknown(String),
}

/// Resolve a keysym to a command.
pub fn bind(keysym: u32, shift: bool) -> Command {
    use keysyms::*;

    match keysym {
        RETURN => Command::Pick,
        SPACE => Command::Sample,
        K | UP => Command::Move(Direction::Up),
        J | DOWN => Command::Move(Direction::Down),
        H | LEFT => Command::Move(Direction::Left),
        L | RIGHT => Command::Move(Direction::Right),
        R if shift => Command::ToggleAutoRefresh,
        R => Command::Refresh,
        M => Command::ToggleMagnify,
        P => Command::SquareFit,
        I => Command::Grow(shift),
        D => Command::Shrink(shift),
        MINUS | S => Command::ZoomOut,
        EQUAL | O => Command::ZoomIn,
        KEY_0 => Command::SetZoom(10),
        KEY_0..=KEY_9 => Command::SetZoom((keysym - KEY_0) as i32),
        SHIFT_L | SHIFT_R => Command::Ignore,
        ESCAPE | Q => Command::Quit,
        _ => Command::Unknown(keysym_name(keysym)),
    }
}

/// Human readable keysym name for diagnostics.
pub fn keysym_name(keysym: u32) -> String {
    use keysyms::*;

    match keysym {
        0 => "NoSymbol".to_string(),
        RETURN => "Return".to_string(),
        ESCAPE => "Escape".to_string(),
        LEFT => "Left".to_string(),
        UP => "Up".to_string(),
        RIGHT => "Right".to_string(),
        DOWN => "Down".to_string(),
        SPACE => "space".to_string(),
        0xff08 => "BackSpace".to_string(),
        0xff09 => "Tab".to_string(),
        0xffbe..=0xffc9 => format!("F{}", keysym - 0xffbe + 1),
        0x21..=0x7e => char::from_u32(keysym).map_or_else(|| format!("{keysym:#x}"), String::from),
        _ => format!("{keysym:#x}"),
    }
}

/// Keycode to keysym table, as returned by GetKeyboardMapping.
#[derive(Clone, Debug, Default)]
pub struct Keymap {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl Keymap {
    pub fn new(min_keycode: u8, keysyms_per_keycode: u8, keysyms: Vec<u32>) -> Self {
        Self {
            min_keycode,
            keysyms_per_keycode,
            keysyms,
        }
    }

    /// First keysym bound to `keycode`, or 0 (NoSymbol).
    pub fn keysym(&self, keycode: u8) -> u32 {
        if keycode < self.min_keycode || self.keysyms_per_keycode == 0 {
            return 0;
        }
        let index = usize::from(keycode - self.min_keycode) * usize::from(self.keysyms_per_keycode);
        self.keysyms.get(index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::keysyms::*;
    use super::*;

    #[test]
    fn test_bind_digits() {
        assert_eq!(bind(KEY_0, false), Command::SetZoom(10));
        assert_eq!(bind(KEY_0 + 1, false), Command::SetZoom(1));
        assert_eq!(bind(KEY_9, false), Command::SetZoom(9));
    }

    #[test]
    fn test_bind_shift_variants() {
        assert_eq!(bind(R, false), Command::Refresh);
        assert_eq!(bind(R, true), Command::ToggleAutoRefresh);
        assert_eq!(bind(I, true), Command::Grow(true));
        assert_eq!(bind(D, false), Command::Shrink(false));
    }

    #[test]
    fn test_bind_movement() {
        assert_eq!(bind(K, false), Command::Move(Direction::Up));
        assert_eq!(bind(DOWN, false), Command::Move(Direction::Down));
        assert_eq!(bind(H, false), Command::Move(Direction::Left));
        assert_eq!(bind(RIGHT, true), Command::Move(Direction::Right));
    }

    #[test]
    fn test_bind_quit_and_unknown() {
        assert_eq!(bind(ESCAPE, false), Command::Quit);
        assert_eq!(bind(Q, false), Command::Quit);
        assert_eq!(bind(SHIFT_L, true), Command::Ignore);
        assert_eq!(bind(0x0078, false), Command::Unknown("x".to_string()));
        assert_eq!(bind(0xffbe, false), Command::Unknown("F1".to_string()));
    }

    #[test]
    fn test_keymap_lookup() {
        // Two keysyms per keycode, keycodes 8..=10.
        let keymap = Keymap::new(8, 2, vec![Q, 0x51, R, 0x52, RETURN, 0]);
        assert_eq!(keymap.keysym(8), Q);
        assert_eq!(keymap.keysym(9), R);
        assert_eq!(keymap.keysym(10), RETURN);
        assert_eq!(keymap.keysym(11), 0);
        assert_eq!(keymap.keysym(7), 0);
    }
}
