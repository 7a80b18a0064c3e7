//! Camera intrinsics calibration from a printed Charuco board.
//!
//! Marker detection, corner interpolation and the calibration itself are
//! done by OpenCV; this crate drives the camera, decides which frames to
//! keep and stores the result.

pub mod board;
pub mod calibration;
pub mod capture;
pub mod config;
pub mod detection;
pub mod errors;
pub mod pose;
pub mod storage;
pub mod utils;
