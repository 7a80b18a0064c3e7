use opencv::{aruco, core::*, objdetect::*, prelude::*};

use crate::board::CalibrationBoard;
use crate::errors::Result;

pub fn marker_color() -> Scalar {
    Scalar::new(0.0, 255.0, 255.0, 0.0)
}

/// Markers found on a single frame.
#[derive(Debug, Default, Clone)]
pub struct Markers {
    pub corners: Vector<Vector<Point2f>>,
    pub ids: Vector<i32>,
}

impl Markers {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Interpolated chessboard corners of a Charuco board.
#[derive(Debug, Default, Clone)]
pub struct CharucoCorners {
    pub corners: Vector<Point2f>,
    pub ids: Vector<i32>,
}

impl CharucoCorners {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub struct MarkerDetector<'a> {
    board: &'a CalibrationBoard,
    detector: ArucoDetector,
}

impl<'a> MarkerDetector<'a> {
    pub fn new(board: &'a CalibrationBoard) -> Result<MarkerDetector<'a>> {
        let detector = ArucoDetector::new(
            &board.dictionary,
            &DetectorParameters::default()?,
            RefineParameters {
                min_rep_distance: 10.0,
                error_correction_rate: 3.0,
                check_all_orders: true,
            },
        )?;
        Ok(MarkerDetector { board, detector })
    }

    /// Detects markers, then tries to recover rejected candidates
    /// using the known board layout.
    pub fn detect(&self, frame: &Mat) -> Result<Markers> {
        let mut markers = Markers::default();
        let mut rejected = Vector::<Vector<Point2f>>::new();
        self.detector
            .detect_markers(frame, &mut markers.corners, &mut markers.ids, &mut rejected)?;
        self.detector.refine_detected_markers_def(
            frame,
            &self.board.board,
            &mut markers.corners,
            &mut markers.ids,
            &mut rejected,
        )?;
        log::trace!(
            "{} markers detected, {} rejected",
            markers.len(),
            rejected.len()
        );
        Ok(markers)
    }

    /// Interpolates chessboard corners from detected markers, projecting
    /// through the camera parameters when they are known.
    pub fn interpolate(
        &self,
        markers: &Markers,
        frame: &Mat,
        intrinsics: Option<(&Mat, &Mat)>,
    ) -> Result<CharucoCorners> {
        let mut charuco = CharucoCorners::default();
        if markers.is_empty() {
            return Ok(charuco);
        }
        let no_params = Mat::default();
        let (camera_matrix, dist_coeffs) = intrinsics.unwrap_or((&no_params, &no_params));
        aruco::interpolate_corners_charuco(
            &markers.corners,
            &markers.ids,
            frame,
            &self.board.charuco,
            &mut charuco.corners,
            &mut charuco.ids,
            camera_matrix,
            dist_coeffs,
            2,
        )?;
        Ok(charuco)
    }
}

pub fn draw_markers(img: &mut Mat, markers: &Markers) -> Result<()> {
    if !markers.is_empty() {
        draw_detected_markers(img, &markers.corners, &markers.ids, marker_color())?;
    }
    Ok(())
}

pub fn draw_corners(img: &mut Mat, charuco: &CharucoCorners) -> Result<()> {
    if !charuco.is_empty() {
        draw_detected_corners_charuco(img, &charuco.corners, &charuco.ids, marker_color())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardSpec, PRINT_MARGIN};
    use opencv::imgproc::*;

    fn rendered_board(board: &CalibrationBoard) -> Mat {
        board.render(Size::new(600, 960), PRINT_MARGIN).unwrap()
    }

    #[test]
    fn finds_markers_on_rendered_board() {
        let board = CalibrationBoard::new(BoardSpec::default()).unwrap();
        let detector = MarkerDetector::new(&board).unwrap();
        let img = rendered_board(&board);

        let markers = detector.detect(&img).unwrap();
        assert!(markers.len() > 10, "only {} markers", markers.len());
        assert_eq!(markers.corners.len(), markers.ids.len());
        for id in markers.ids.iter() {
            assert!((0..board.spec.marker_count()).contains(&id));
        }
    }

    #[test]
    fn interpolates_corners_without_intrinsics() {
        let board = CalibrationBoard::new(BoardSpec::default()).unwrap();
        let detector = MarkerDetector::new(&board).unwrap();
        let img = rendered_board(&board);

        let markers = detector.detect(&img).unwrap();
        let charuco = detector.interpolate(&markers, &img, None).unwrap();
        // inner corners of a 5x8 board
        assert!(charuco.len() > 4);
        assert!(charuco.len() <= 28);
    }

    #[test]
    fn blank_frame_yields_nothing() {
        let board = CalibrationBoard::new(BoardSpec::default()).unwrap();
        let detector = MarkerDetector::new(&board).unwrap();
        let img = Mat::new_rows_cols_with_default(480, 640, CV_8UC1, Scalar::all(255.0)).unwrap();

        let markers = detector.detect(&img).unwrap();
        assert!(markers.is_empty());
        let charuco = detector.interpolate(&markers, &img, None).unwrap();
        assert!(charuco.is_empty());
    }

    #[test]
    fn draws_on_colour_frames() {
        let board = CalibrationBoard::new(BoardSpec::default()).unwrap();
        let detector = MarkerDetector::new(&board).unwrap();
        let gray = rendered_board(&board);
        let mut vis = Mat::default();
        cvt_color_def(&gray, &mut vis, COLOR_GRAY2BGR).unwrap();

        let markers = detector.detect(&gray).unwrap();
        let charuco = detector.interpolate(&markers, &gray, None).unwrap();
        draw_markers(&mut vis, &markers).unwrap();
        draw_corners(&mut vis, &charuco).unwrap();
        assert_eq!(vis.channels(), 3);
    }
}
