// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! Command line configuration
//!
//! Sizes and the resize increment may be given as pixels or, when negative,
//! as a percentage of the source region. Percentages are resolved once the
//! source region is known.

use std::ffi::OsString;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::geometry::{resolve_dimension, Size};
use crate::session::SessionOptions;

/// Default zoom factor
pub const DEFAULT_ZOOM: i32 = 5;
/// Default resize increment: 5% of the smaller source dimension
pub const DEFAULT_INCREMENT: i32 = -5;
/// Default view side: 30% of the smaller source dimension
pub const DEFAULT_LENGTH: i32 = -30;
/// Default focus reassertion budget
pub const DEFAULT_FOCUS_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration errors, reported before connecting to the display.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Rejected by the argument parser (unknown flag, missing value, ...).
    #[error("{0}")]
    Usage(String),

    #[error("Cannot convert '{0}' to int.")]
    NotAnInteger(String),

    #[error("scale must be 1 or more.")]
    ZoomTooSmall,

    #[error("{0} cannot be zero.")]
    Zero(&'static str),

    #[error("{0} is out of range.")]
    OutOfRange(String),
}

/// Which window the colors are picked from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceSelection {
    /// The whole screen
    Root,
    /// The top level window under the pointer at startup
    UnderPointer,
    /// An explicit window id
    Window(u32),
}

/// Initial view dimensions. Negative values are percentages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewSpec {
    Square(i32),
    Rect { width: i32, height: i32 },
}

/// Picker configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub source: SourceSelection,
    pub zoom: i32,
    pub increment: i32,
    pub view: ViewSpec,
    pub magnify_only: bool,
    pub newline: bool,
    pub auto_refresh: bool,
    pub co_scale: bool,
    pub focus_timeout: Duration,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceSelection::Root,
            zoom: DEFAULT_ZOOM,
            increment: DEFAULT_INCREMENT,
            view: ViewSpec::Square(DEFAULT_LENGTH),
            magnify_only: false,
            newline: true,
            auto_refresh: false,
            co_scale: false,
            focus_timeout: DEFAULT_FOCUS_TIMEOUT,
            verbose: false,
        }
    }
}

/// Outcome of argument parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parsed {
    Run(Config),
    /// `-h` was given; the rendered help
    Help(String),
    /// `-V` was given; the rendered version
    Version(String),
}

fn value_arg(id: &'static str, short: char, value_name: &'static str) -> Arg {
    Arg::new(id)
        .short(short)
        .long(id)
        .value_name(value_name)
        .allow_hyphen_values(true)
}

fn flag_arg(id: &'static str, short: char) -> Arg {
    Arg::new(id).short(short).long(id).action(ArgAction::SetTrue)
}

/// The command line definition.
pub fn command() -> Command {
    Command::new("xpick")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Pick a color from the screen through a magnifier")
        .args_override_self(true)
        .arg(flag_arg("active", 'a').help("Pick from the window under the pointer"))
        .arg(value_arg("window", 'f', "WINDOWID").help("Pick from this window instead of the root"))
        .arg(flag_arg("magnify", 'm').help("Start as a magnifier: no crosshair, no report on click"))
        .arg(flag_arg("no-newline", 'n').help("Don't print a newline after the last color"))
        .arg(flag_arg("refresh", 'r').help("Recapture the source on pointer motion"))
        .arg(value_arg("scale", 's', "N").help("Magnification factor, 1 or more [default: 5]"))
        .arg(
            value_arg("increment", 'i', "N")
                .help("Resize increment in pixels, percent of the source when negative [default: -5]"),
        )
        .arg(
            value_arg("length", 'l', "N")
                .help("Side of a square view, percent of the source when negative [default: -30]"),
        )
        .arg(value_arg("width", 'w', "N").help("View width, percent of the source when negative"))
        .arg(value_arg("height", 'g', "N").help("View height, percent of the source when negative"))
        .arg(flag_arg("co-scale", 'c').help("Scale the zoom along with Shift+i / Shift+d"))
        .arg(
            value_arg("focus-timeout", 't', "MS")
                .help("Time spent taking the focus back after losing it [default: 1000]"),
        )
        .arg(flag_arg("verbose", 'v').help("Enable verbose logging"))
}

/// One line usage summary.
pub fn usage() -> String {
    command().render_usage().to_string()
}

/// Parse an integer the way `strtol(str, &end, 0)` does: optional sign,
/// `0x` for hexadecimal, a leading `0` for octal, decimal otherwise.
pub fn parse_int(text: &str) -> Result<i64, ConfigError> {
    let err = || ConfigError::NotAnInteger(text.to_string());

    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(err());
    }
    let value = i64::from_str_radix(digits, radix).map_err(|_| err())?;
    Ok(if negative { -value } else { value })
}

fn int_value(matches: &ArgMatches, id: &str) -> Result<Option<i64>, ConfigError> {
    matches
        .get_one::<String>(id)
        .map(|text| parse_int(text))
        .transpose()
}

fn to_i32(value: i64) -> Result<i32, ConfigError> {
    i32::try_from(value).map_err(|_| ConfigError::OutOfRange(value.to_string()))
}

/// Position of the last occurrence of `id` on the command line.
fn last_index(matches: &ArgMatches, id: &str) -> Option<usize> {
    if matches.value_source(id) != Some(ValueSource::CommandLine) {
        return None;
    }
    matches.indices_of(id).and_then(Iterator::max)
}

/// Size flags apply in command line order: `-l` sets both sides and makes
/// the view square, `-w` and `-g` set one side each.
fn view_spec(matches: &ArgMatches) -> Result<ViewSpec, ConfigError> {
    let mut given = Vec::with_capacity(3);
    for id in ["length", "width", "height"] {
        if let (Some(value), Some(at)) = (non_zero(matches, id, id)?, last_index(matches, id)) {
            given.push((at, id, value));
        }
    }
    given.sort_unstable();

    let (mut width, mut height, mut square) = (DEFAULT_LENGTH, DEFAULT_LENGTH, true);
    for (_, id, value) in given {
        match id {
            "length" => {
                width = value;
                height = value;
                square = true;
            }
            "width" => {
                width = value;
                square = false;
            }
            _ => {
                height = value;
                square = false;
            }
        }
    }

    Ok(if square {
        ViewSpec::Square(width)
    } else {
        ViewSpec::Rect { width, height }
    })
}

fn non_zero(matches: &ArgMatches, id: &str, name: &'static str) -> Result<Option<i32>, ConfigError> {
    match int_value(matches, id)? {
        Some(0) => Err(ConfigError::Zero(name)),
        Some(value) => Ok(Some(to_i32(value)?)),
        None => Ok(None),
    }
}

impl Config {
    /// Parse `args`, the first item being the program name.
    pub fn parse_from<I, T>(args: I) -> Result<Parsed, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match command().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) => {
                return match e.kind() {
                    ErrorKind::DisplayHelp => Ok(Parsed::Help(e.to_string())),
                    ErrorKind::DisplayVersion => Ok(Parsed::Version(e.to_string())),
                    _ => Err(ConfigError::Usage(e.to_string())),
                };
            }
        };

        Self::from_matches(&matches).map(Parsed::Run)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let window = match int_value(matches, "window")? {
            Some(id) => {
                let id = u32::try_from(id).map_err(|_| ConfigError::OutOfRange(id.to_string()))?;
                if id == 0 {
                    return Err(ConfigError::Zero("window id"));
                }
                Some(id)
            }
            None => None,
        };
        config.source = match (window, last_index(matches, "active"), last_index(matches, "window")) {
            (Some(_), Some(active), Some(at)) if active > at => SourceSelection::UnderPointer,
            (Some(id), _, _) => SourceSelection::Window(id),
            (None, Some(_), _) => SourceSelection::UnderPointer,
            (None, None, _) => SourceSelection::Root,
        };

        config.magnify_only = matches.get_flag("magnify");
        config.newline = !matches.get_flag("no-newline");
        config.auto_refresh = matches.get_flag("refresh");
        config.co_scale = matches.get_flag("co-scale");
        config.verbose = matches.get_flag("verbose");

        if let Some(zoom) = int_value(matches, "scale")? {
            if zoom < 1 {
                return Err(ConfigError::ZoomTooSmall);
            }
            config.zoom = to_i32(zoom)?;
        }

        if let Some(increment) = non_zero(matches, "increment", "increment")? {
            config.increment = increment;
        }

        config.view = view_spec(matches)?;

        if let Some(ms) = int_value(matches, "focus-timeout")? {
            let ms = u64::try_from(ms).map_err(|_| ConfigError::OutOfRange(ms.to_string()))?;
            config.focus_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Resolve percentages against the source region.
    pub fn session_options(&self, source: Size) -> SessionOptions {
        let min = source.min_dimension();
        let view_size = match self.view {
            ViewSpec::Square(side) => {
                let side = resolve_dimension(side, min).max(1);
                Size::new(side, side)
            }
            ViewSpec::Rect { width, height } => Size::new(
                resolve_dimension(width, source.width).max(1),
                resolve_dimension(height, source.height).max(1),
            ),
        };

        SessionOptions {
            view_size,
            zoom: self.zoom,
            increment: resolve_dimension(self.increment, min).max(1),
            magnify_only: self.magnify_only,
            auto_refresh: self.auto_refresh,
            newline: self.newline,
            co_scale: self.co_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Parsed, ConfigError> {
        Config::parse_from(std::iter::once("xpick").chain(args.iter().copied()))
    }

    fn config(args: &[&str]) -> Config {
        match parse(args) {
            Ok(Parsed::Run(config)) => config,
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn test_parse_int_bases() {
        assert_eq!(parse_int("42"), Ok(42));
        assert_eq!(parse_int("-10"), Ok(-10));
        assert_eq!(parse_int("0x1a"), Ok(26));
        assert_eq!(parse_int("010"), Ok(8));
        assert_eq!(parse_int("0"), Ok(0));
        assert!(parse_int("12px").is_err());
        assert!(parse_int("").is_err());
        assert!(parse_int("--3").is_err());
    }

    #[test]
    fn test_clustered_flags() {
        let c = config(&["-mnr"]);
        assert!(c.magnify_only);
        assert!(!c.newline);
        assert!(c.auto_refresh);
    }

    #[test]
    fn test_attached_and_negative_values() {
        let c = config(&["-s3", "-i", "-10", "-w", "-50", "-g", "200"]);
        assert_eq!(c.zoom, 3);
        assert_eq!(c.increment, -10);
        assert_eq!(c.view, ViewSpec::Rect { width: -50, height: 200 });
    }

    #[test]
    fn test_width_only_keeps_default_height() {
        let c = config(&["-w", "300"]);
        assert_eq!(c.view, ViewSpec::Rect { width: 300, height: DEFAULT_LENGTH });
    }

    #[test]
    fn test_window_source() {
        assert_eq!(config(&["-f", "0x3a00004"]).source, SourceSelection::Window(0x3a00004));
        assert_eq!(config(&["-a"]).source, SourceSelection::UnderPointer);
        assert_eq!(config(&["-a", "-f", "12"]).source, SourceSelection::Window(12));
        assert_eq!(config(&["-f", "12", "-a"]).source, SourceSelection::UnderPointer);
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(parse(&["-s", "0"]), Err(ConfigError::ZoomTooSmall));
        assert_eq!(parse(&["-i", "0"]), Err(ConfigError::Zero("increment")));
        assert_eq!(parse(&["-l", "0"]), Err(ConfigError::Zero("length")));
        assert_eq!(
            parse(&["-s", "five"]),
            Err(ConfigError::NotAnInteger("five".to_string()))
        );
        assert!(matches!(parse(&["-x"]), Err(ConfigError::Usage(_))));
        assert!(matches!(parse(&["stray"]), Err(ConfigError::Usage(_))));
        assert!(matches!(parse(&["-s"]), Err(ConfigError::Usage(_))));
    }

    #[test]
    fn test_help() {
        assert!(matches!(parse(&["-h"]), Ok(Parsed::Help(_))));
    }

    #[test]
    fn test_increment_percentage() {
        let c = config(&["-i", "-10"]);
        let options = c.session_options(Size::new(300, 200));
        assert_eq!(options.increment, 20);
    }

    #[test]
    fn test_view_percentages() {
        let options = Config::default().session_options(Size::new(1920, 1080));
        assert_eq!(options.view_size, Size::new(324, 324));
        assert_eq!(options.increment, 54);

        let c = config(&["-w", "-50", "-g", "-10"]);
        let options = c.session_options(Size::new(1920, 1080));
        assert_eq!(options.view_size, Size::new(960, 108));
    }

    #[test]
    fn test_focus_timeout() {
        assert_eq!(config(&["-t", "250"]).focus_timeout, Duration::from_millis(250));
        assert!(parse(&["-t", "-1"]).is_err());
    }

    #[test]
    fn test_size_flags_last_wins() {
        assert_eq!(
            config(&["-l", "100", "-w", "50"]).view,
            ViewSpec::Rect { width: 50, height: 100 }
        );
        assert_eq!(config(&["-w", "50", "-l", "100"]).view, ViewSpec::Square(100));
        assert_eq!(
            config(&["-g", "-20", "-l", "80", "-g", "40"]).view,
            ViewSpec::Rect { width: 80, height: 40 }
        );
        assert_eq!(config(&["-l", "10", "-l", "20"]).view, ViewSpec::Square(20));
    }

    #[test]
    fn test_repeated_flags() {
        let c = config(&["-m", "-m", "-s", "3", "-s", "4"]);
        assert!(c.magnify_only);
        assert_eq!(c.zoom, 4);
    }
}
