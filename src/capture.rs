use opencv::{core::*, imgproc::*, prelude::*, videoio::*};
use std::{thread, time};

use crate::board::CalibrationBoard;
use crate::detection::*;
use crate::errors::{ErrorKind, Result};
use crate::utils::*;

pub const DEFAULT_FRAME_MARGIN: i32 = 10;
const HELP_TEXT: &str = "Press 'ESC' to finish and calibrate";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureMode {
    /// Capture every frame with markers, at least `margin` frames apart.
    Interval { margin: i32 },
    /// Capture on SPACE or ENTER.
    Manual,
}

impl Default for CaptureMode {
    fn default() -> Self {
        CaptureMode::Interval {
            margin: DEFAULT_FRAME_MARGIN,
        }
    }
}

/// Decides which preview frames are kept for calibration.
#[derive(Debug)]
pub struct FrameSelector {
    mode: CaptureMode,
    frame: i32,
    last_capture: Option<i32>,
}

impl FrameSelector {
    pub fn new(mode: CaptureMode) -> FrameSelector {
        FrameSelector {
            mode,
            frame: 0,
            last_capture: None,
        }
    }

    /// Advances to the next frame and returns whether it should be captured.
    pub fn next_frame(&mut self, has_markers: bool, key: i32) -> bool {
        let i = self.frame;
        self.frame += 1;
        if !has_markers {
            return false;
        }
        let capture = match self.mode {
            CaptureMode::Interval { margin } => match self.last_capture {
                Some(prev) => i - prev >= margin,
                None => true,
            },
            CaptureMode::Manual => key == KEY_SPACE || key == KEY_ENTER || key == KEY_RETURN,
        };
        if capture {
            self.last_capture = Some(i);
        }
        capture
    }
}

/// A frame kept for calibration together with its markers.
#[derive(Debug)]
pub struct CapturedFrame {
    pub markers: Markers,
    pub image: Mat,
}

pub fn open_camera(index: i32, resolution: Size) -> Result<VideoCapture> {
    let mut cam = VideoCapture::new(index, CAP_ANY)?;
    cam.set(CAP_PROP_FRAME_WIDTH, resolution.width as f64)?;
    cam.set(CAP_PROP_FRAME_HEIGHT, resolution.height as f64)?;
    if !VideoCapture::is_opened(&cam)? {
        return Err(ErrorKind::CameraUnavailable(index).into());
    }
    thread::sleep(time::Duration::from_millis(2)); // camera warm up
    log::info!(
        "Camera #{} opened at {}x{}",
        index,
        cam.get(CAP_PROP_FRAME_WIDTH)? as i32,
        cam.get(CAP_PROP_FRAME_HEIGHT)? as i32
    );
    Ok(cam)
}

pub fn read_frame(cam: &mut VideoCapture) -> Result<Mat> {
    let mut frame = Mat::default();
    if !cam.read(&mut frame)? || frame.empty() {
        return Err(ErrorKind::EmptyFrame.into());
    }
    Ok(frame)
}

/// Runs the preview loop until ESC and returns the captured frames.
pub fn capture_frames(
    cam: &mut VideoCapture,
    board: &CalibrationBoard,
    mode: CaptureMode,
) -> Result<Vec<CapturedFrame>> {
    let detector = MarkerDetector::new(board)?;
    let mut selector = FrameSelector::new(mode);
    let mut captured = Vec::new();

    loop {
        let frame = read_frame(cam)?;
        let markers = detector.detect(&frame)?;

        let mut vis = Mat::default();
        frame.copy_to(&mut vis)?;
        draw_markers(&mut vis, &markers)?;
        put_text(
            &mut vis,
            HELP_TEXT,
            Point::new(10, 20),
            FONT_HERSHEY_SIMPLEX,
            0.4,
            Scalar::new(255.0, 255.0, 0.0, 0.0),
            1,
            LINE_AA,
            false,
        )?;
        show_frame(CALIBRATION_WINDOW, &vis)?;

        let key = poll_key(30)?;
        if key == KEY_ESC {
            break;
        }
        if selector.next_frame(!markers.is_empty(), key) {
            captured.push(CapturedFrame {
                markers,
                image: frame,
            });
            log::info!("Frame captured #{}", captured.len());
        }
    }
    destroy_frame(CALIBRATION_WINDOW)?;

    Ok(captured)
}
