use opencv::{aruco, calib3d::*, core::*, prelude::*, videoio::*};

use crate::board::CalibrationBoard;
use crate::calibration::CalibrationData;
use crate::capture::read_frame;
use crate::detection::*;
use crate::errors::Result;
use crate::utils::*;

/// Fewer interpolated corners than this leave the board pose unconstrained.
const MIN_POSE_CORNERS: usize = 4;

/// Board pose relative to the camera, as Rodrigues rotation and translation.
#[derive(Debug)]
pub struct BoardPose {
    pub rvec: Mat,
    pub tvec: Mat,
}

pub struct PoseEstimator<'a> {
    board: &'a CalibrationBoard,
    detector: MarkerDetector<'a>,
    calibration: &'a CalibrationData,
}

impl<'a> PoseEstimator<'a> {
    pub fn new(
        board: &'a CalibrationBoard,
        calibration: &'a CalibrationData,
    ) -> Result<PoseEstimator<'a>> {
        Ok(PoseEstimator {
            board,
            detector: MarkerDetector::new(board)?,
            calibration,
        })
    }

    /// Estimates the pose from interpolated corners, `None` when the
    /// corners don't constrain it.
    pub fn estimate(&self, charuco: &CharucoCorners) -> Result<Option<BoardPose>> {
        if charuco.len() < MIN_POSE_CORNERS {
            return Ok(None);
        }
        let mut rvec = Mat::default();
        let mut tvec = Mat::default();
        let valid = aruco::estimate_pose_charuco_board(
            &charuco.corners,
            &charuco.ids,
            &self.board.charuco,
            &self.calibration.camera_matrix,
            &self.calibration.distortion_coeffs,
            &mut rvec,
            &mut tvec,
            false,
        )?;
        Ok(valid.then_some(BoardPose { rvec, tvec }))
    }

    /// Detects the board on `frame` and draws its corners and pose axes.
    pub fn annotate(&self, frame: &Mat) -> Result<(Mat, Option<BoardPose>)> {
        let markers = self.detector.detect(frame)?;
        let charuco = self.detector.interpolate(
            &markers,
            frame,
            Some((
                &self.calibration.camera_matrix,
                &self.calibration.distortion_coeffs,
            )),
        )?;
        let pose = self.estimate(&charuco)?;

        let mut vis = Mat::default();
        frame.copy_to(&mut vis)?;
        draw_corners(&mut vis, &charuco)?;
        if let Some(pose) = &pose {
            draw_frame_axes(
                &mut vis,
                &self.calibration.camera_matrix,
                &self.calibration.distortion_coeffs,
                &pose.rvec,
                &pose.tvec,
                self.board.spec.axis_length(),
                3,
            )?;
        }
        Ok((vis, pose))
    }
}

/// Shows the live board pose until ESC is pressed.
pub fn run_preview(
    cam: &mut VideoCapture,
    board: &CalibrationBoard,
    calibration: &CalibrationData,
) -> Result<()> {
    let estimator = PoseEstimator::new(board, calibration)?;
    loop {
        let frame = read_frame(cam)?;
        let (vis, pose) = estimator.annotate(&frame)?;
        if let Some(pose) = pose {
            log::trace!("rvec {:?} tvec {:?}", pose.rvec, pose.tvec);
        }
        show_frame(POSE_WINDOW, &vis)?;

        let key = poll_key(10)?;
        if key == KEY_ESC {
            break;
        }
    }
    destroy_frame(POSE_WINDOW)?;
    cam.release()?;

    Ok(())
}
