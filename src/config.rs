use getopts::{Matches, Options};
use log::LevelFilter;
use opencv::core::Size;

use crate::board::{self, BoardSpec};
use crate::capture::{CaptureMode, DEFAULT_FRAME_MARGIN};
use crate::errors::{Error, Result};
use crate::storage::DEFAULT_CALIBRATION_FILE;

pub const DEFAULT_CAMERA_INDEX: i32 = 0;
pub const DEFAULT_CAM_WIDTH: i32 = 1280;
pub const DEFAULT_CAM_HEIGHT: i32 = 720;
pub const DEFAULT_BOARD_IMAGE: &str = "board.png";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub camera_index: i32,
    pub resolution: Size,
    pub output: String,
    pub board_image: String,
    pub board: BoardSpec,
    pub capture: CaptureMode,
    pub force: bool,
    pub preview: bool,
    pub log_level: LevelFilter,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            camera_index: DEFAULT_CAMERA_INDEX,
            resolution: Size::new(DEFAULT_CAM_WIDTH, DEFAULT_CAM_HEIGHT),
            output: DEFAULT_CALIBRATION_FILE.to_string(),
            board_image: DEFAULT_BOARD_IMAGE.to_string(),
            board: BoardSpec::default(),
            capture: CaptureMode::default(),
            force: false,
            preview: true,
            log_level: LevelFilter::Info,
        }
    }
}

pub fn options() -> Options {
    let mut opts = Options::new();
    opts.optopt("c", "camera", "camera index \n default: 0", "INDEX");
    opts.optopt(
        "r",
        "res",
        "camera resolution (width x height) \n default resolution: 1280x720",
        "WxH",
    );
    opts.optopt(
        "o",
        "output",
        "calibration file, format follows the extension \n default: camera.yml",
        "FILE",
    );
    opts.optopt(
        "b",
        "board-image",
        "where the printable board is written \n default: board.png",
        "FILE",
    );
    opts.optopt("s", "squares", "board squares \n default: 5x8", "WxH");
    opts.optopt("", "square-length", "square side in meters \n default: 0.04", "M");
    opts.optopt("", "marker-length", "marker side in meters \n default: 0.02", "M");
    opts.optopt("", "dict", "marker dictionary \n default: DICT_6X6_250", "NAME");
    opts.optopt(
        "m",
        "margin",
        "frames between automatic captures \n default: 10",
        "N",
    );
    opts.optflag("", "manual", "capture on SPACE/ENTER instead of automatically");
    opts.optflag("f", "force", "calibrate even if the calibration file exists");
    opts.optflag("n", "no-preview", "skip the pose preview after calibration");
    opts.optflagmulti("d", "", "debug execution \n -d debug logs \n -dd trace logs");
    opts.optflag("h", "help", "prints usage");
    opts
}

// Extracts the two firsts i32 separated by 'x'
fn parse_pair(s: &str) -> Option<(i32, i32)> {
    let mut parts = s.split('x').map(|s| s.trim().parse::<i32>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(w)), Some(Ok(h)), None) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    }
}

fn parse_opt<T: std::str::FromStr>(matches: &Matches, name: &str) -> Result<Option<T>> {
    match matches.opt_str(name) {
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("--{name} {s}"))),
        None => Ok(None),
    }
}

/// Log verbosity from the repeated `-d` flag.
pub fn log_level(matches: &Matches) -> LevelFilter {
    match matches.opt_count("d") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl Settings {
    pub fn from_matches(matches: &Matches) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(index) = parse_opt(matches, "camera")? {
            settings.camera_index = index;
        }
        // default resolution is used if the value is malformed
        if let Some(res) = matches.opt_str("res") {
            match parse_pair(&res) {
                Some((width, height)) => settings.resolution = Size::new(width, height),
                None => log::warn!("Ignoring resolution '{res}'"),
            }
        }
        if let Some(output) = matches.opt_str("output") {
            settings.output = output;
        }
        if let Some(path) = matches.opt_str("board-image") {
            settings.board_image = path;
        }

        if let Some(squares) = matches.opt_str("squares") {
            let (x, y) = parse_pair(&squares)
                .ok_or_else(|| Error::Config(format!("--squares {squares}")))?;
            settings.board.squares_x = x;
            settings.board.squares_y = y;
        }
        if let Some(length) = parse_opt(matches, "square-length")? {
            settings.board.square_length = length;
        }
        if let Some(length) = parse_opt(matches, "marker-length")? {
            settings.board.marker_length = length;
        }
        if let Some(dict) = parse_opt::<board::DictionaryName>(matches, "dict")? {
            settings.board.dictionary = dict;
        }
        settings.board.validate()?;

        settings.capture = if matches.opt_present("manual") {
            CaptureMode::Manual
        } else {
            let margin = parse_opt(matches, "margin")?.unwrap_or(DEFAULT_FRAME_MARGIN);
            CaptureMode::Interval {
                margin: margin.max(1),
            }
        };
        settings.force = matches.opt_present("force");
        settings.preview = !matches.opt_present("no-preview");
        settings.log_level = log_level(matches);

        Ok(settings)
    }
}
