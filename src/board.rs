use opencv::{core::*, imgcodecs::*, objdetect::*, prelude::*};
use std::str::FromStr;

use crate::errors::{Error, ErrorKind, Result};

pub const DEFAULT_SQUARES_X: i32 = 5;
pub const DEFAULT_SQUARES_Y: i32 = 8;
pub const DEFAULT_SQUARE_LENGTH: f32 = 0.04; // in meters
pub const DEFAULT_MARKER_LENGTH: f32 = 0.02; // in meters

// A4 at 300 dpi
pub const PRINT_SIZE: Size = Size {
    width: 2480,
    height: 3508,
};
pub const PRINT_MARGIN: i32 = 10;

const DICTIONARIES: [(&str, PredefinedDictionaryType); 21] = [
    ("4X4_50", PredefinedDictionaryType::DICT_4X4_50),
    ("4X4_100", PredefinedDictionaryType::DICT_4X4_100),
    ("4X4_250", PredefinedDictionaryType::DICT_4X4_250),
    ("4X4_1000", PredefinedDictionaryType::DICT_4X4_1000),
    ("5X5_50", PredefinedDictionaryType::DICT_5X5_50),
    ("5X5_100", PredefinedDictionaryType::DICT_5X5_100),
    ("5X5_250", PredefinedDictionaryType::DICT_5X5_250),
    ("5X5_1000", PredefinedDictionaryType::DICT_5X5_1000),
    ("6X6_50", PredefinedDictionaryType::DICT_6X6_50),
    ("6X6_100", PredefinedDictionaryType::DICT_6X6_100),
    ("6X6_250", PredefinedDictionaryType::DICT_6X6_250),
    ("6X6_1000", PredefinedDictionaryType::DICT_6X6_1000),
    ("7X7_50", PredefinedDictionaryType::DICT_7X7_50),
    ("7X7_100", PredefinedDictionaryType::DICT_7X7_100),
    ("7X7_250", PredefinedDictionaryType::DICT_7X7_250),
    ("7X7_1000", PredefinedDictionaryType::DICT_7X7_1000),
    ("ARUCO_ORIGINAL", PredefinedDictionaryType::DICT_ARUCO_ORIGINAL),
    ("APRILTAG_16H5", PredefinedDictionaryType::DICT_APRILTAG_16h5),
    ("APRILTAG_25H9", PredefinedDictionaryType::DICT_APRILTAG_25h9),
    ("APRILTAG_36H10", PredefinedDictionaryType::DICT_APRILTAG_36h10),
    ("APRILTAG_36H11", PredefinedDictionaryType::DICT_APRILTAG_36h11),
];

/// Name of one of OpenCV's predefined marker dictionaries.
///
/// Parsed case-insensitively, with or without the `DICT_` prefix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictionaryName(pub PredefinedDictionaryType);

impl FromStr for DictionaryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let key = upper.strip_prefix("DICT_").unwrap_or(&upper);
        DICTIONARIES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, dict)| DictionaryName(*dict))
            .ok_or_else(|| Error::Config(format!("unknown dictionary '{s}'")))
    }
}

impl Default for DictionaryName {
    fn default() -> Self {
        DictionaryName(PredefinedDictionaryType::DICT_6X6_250)
    }
}

/// Physical layout of the printed Charuco board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardSpec {
    pub squares_x: i32,
    pub squares_y: i32,
    pub square_length: f32,
    pub marker_length: f32,
    pub dictionary: DictionaryName,
}

impl Default for BoardSpec {
    fn default() -> Self {
        BoardSpec {
            squares_x: DEFAULT_SQUARES_X,
            squares_y: DEFAULT_SQUARES_Y,
            square_length: DEFAULT_SQUARE_LENGTH,
            marker_length: DEFAULT_MARKER_LENGTH,
            dictionary: DictionaryName::default(),
        }
    }
}

impl BoardSpec {
    pub fn validate(&self) -> Result<()> {
        if self.squares_x < 2 || self.squares_y < 2 {
            return Err(ErrorKind::InvalidBoard(format!(
                "need at least 2x2 squares, got {}x{}",
                self.squares_x, self.squares_y
            ))
            .into());
        }
        if !(self.marker_length > 0.0 && self.marker_length < self.square_length) {
            return Err(ErrorKind::InvalidBoard(format!(
                "marker length {} must be positive and smaller than square length {}",
                self.marker_length, self.square_length
            ))
            .into());
        }
        Ok(())
    }

    /// Number of markers printed on the board (one per white square).
    pub fn marker_count(&self) -> i32 {
        self.squares_x * self.squares_y / 2
    }

    /// Length of the drawn pose axes, half of the board's shorter side.
    pub fn axis_length(&self) -> f32 {
        0.5 * (self.squares_x.min(self.squares_y) as f32 * self.square_length)
    }
}

pub struct CalibrationBoard {
    pub spec: BoardSpec,
    pub dictionary: Dictionary,
    pub charuco: Ptr<CharucoBoard>,
    pub board: Ptr<Board>,
}

impl CalibrationBoard {
    pub fn new(spec: BoardSpec) -> Result<CalibrationBoard> {
        spec.validate()?;
        let dictionary = get_predefined_dictionary(spec.dictionary.0)?;
        let available = dictionary.bytes_list().rows();
        if available < spec.marker_count() {
            return Err(ErrorKind::InvalidBoard(format!(
                "board needs {} markers, dictionary only has {}",
                spec.marker_count(),
                available
            ))
            .into());
        }

        let charuco = CharucoBoard::new_def(
            Size::new(spec.squares_x, spec.squares_y),
            spec.square_length,
            spec.marker_length,
            &dictionary,
        )?;
        let board = Ptr::new(Board::from(charuco.clone()));
        log::debug!(
            "board {}x{} squares, {} markers",
            spec.squares_x,
            spec.squares_y,
            spec.marker_count()
        );

        Ok(CalibrationBoard {
            spec,
            dictionary,
            charuco: Ptr::new(charuco),
            board,
        })
    }

    pub fn render(&self, size: Size, margin: i32) -> Result<Mat> {
        let mut img = Mat::default();
        self.charuco.generate_image(size, &mut img, margin, 1)?;
        Ok(img)
    }

    /// Renders the board and writes it to `path` for printing.
    pub fn save_image(&self, path: &str, size: Size, margin: i32) -> Result<()> {
        let img = self.render(size, margin)?;
        if !imwrite(path, &img, &Vector::<i32>::new())? {
            return Err(ErrorKind::CannotSave(path.to_string()).into());
        }
        log::info!("Board image written to {path}");
        Ok(())
    }
}
