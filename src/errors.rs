use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error(transparent)]
    Opencv(#[from] opencv::Error),
    #[error("Calibration error: {}", .0.message())]
    Calibration(ErrorKind),
    #[error("Invalid option: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    CameraUnavailable(i32),
    EmptyFrame,
    NotEnoughCaptures,
    NotEnoughCorners,
    CannotSave(String),
    CannotOpen(String),
    MissingField(&'static str),
    InvalidBoard(String),
}

impl ErrorKind {
    pub fn message(&self) -> String {
        match self {
            ErrorKind::CameraUnavailable(index) => format!("Unable to open camera #{index}"),
            ErrorKind::EmptyFrame => "Camera returned an empty frame".to_string(),
            ErrorKind::NotEnoughCaptures => "Not enough captures for calibration".to_string(),
            ErrorKind::NotEnoughCorners => "Not enough corners for calibration".to_string(),
            ErrorKind::CannotSave(path) => format!("Cannot save output file '{path}'"),
            ErrorKind::CannotOpen(path) => format!("Cannot open calibration file '{path}'"),
            ErrorKind::MissingField(key) => format!("Calibration file has no '{key}'"),
            ErrorKind::InvalidBoard(reason) => format!("Invalid board: {reason}"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::Calibration(kind)
    }
}
