use opencv::{aruco, core::*, prelude::*};

use crate::board::CalibrationBoard;
use crate::capture::CapturedFrame;
use crate::detection::*;
use crate::errors::{ErrorKind, Result};

/// Frames with this many interpolated corners or fewer are ignored.
const MIN_CORNERS_PER_FRAME: usize = 4;
const MIN_CORNER_FRAMES: usize = 4;

#[derive(Debug)]
pub struct CalibrationData {
    pub image_size: Size,
    pub camera_matrix: Mat,
    pub distortion_coeffs: Mat,
    pub avg_reprojection_error: f64,
}

/// Markers of every frame laid end to end, the layout the ArUco
/// calibration expects.
#[derive(Debug, Default)]
pub struct ConcatenatedMarkers {
    pub corners: Vector<Vector<Point2f>>,
    pub ids: Vector<i32>,
    pub counter: Vector<i32>,
}

pub fn concatenate_markers<'a, I>(frames: I) -> ConcatenatedMarkers
where
    I: IntoIterator<Item = &'a Markers>,
{
    let mut all = ConcatenatedMarkers::default();
    for markers in frames {
        all.counter.push(markers.len() as i32);
        for (corners, id) in markers.corners.iter().zip(markers.ids.iter()) {
            all.corners.push(corners);
            all.ids.push(id);
        }
    }
    all
}

/// Charuco detections kept for the final calibration.
#[derive(Debug, Default)]
pub struct CharucoSet {
    pub corners: Vector<Vector<Point2f>>,
    pub ids: Vector<Vector<i32>>,
}

impl CharucoSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Keeps the view if it has enough corners to constrain the pose.
    pub fn push(&mut self, view: CharucoCorners) -> bool {
        if view.len() > MIN_CORNERS_PER_FRAME {
            self.corners.push(view.corners);
            self.ids.push(view.ids);
            true
        } else {
            false
        }
    }
}

/// Size of the first frame, and the frames that share it. Frames of any
/// other size are dropped.
pub fn consistent_frames(frames: &[CapturedFrame]) -> Result<(Size, Vec<&CapturedFrame>)> {
    let first = match frames.first() {
        Some(frame) => frame.image.size()?,
        None => return Err(ErrorKind::NotEnoughCaptures.into()),
    };
    let mut kept = Vec::with_capacity(frames.len());
    for (i, frame) in frames.iter().enumerate() {
        let size = frame.image.size()?;
        if size == first {
            kept.push(frame);
        } else {
            log::warn!(
                "frame #{} is {}x{}, expected {}x{}, dropped",
                i + 1,
                size.width,
                size.height,
                first.width,
                first.height
            );
        }
    }
    Ok((first, kept))
}

fn criteria() -> Result<TermCriteria> {
    Ok(TermCriteria::new(
        TermCriteria_COUNT + TermCriteria_EPS,
        30,
        f64::EPSILON,
    )?)
}

/// Calibrates in two passes: an ArUco calibration over raw marker corners
/// seeds Charuco corner interpolation, and the interpolated corners feed the
/// final Charuco calibration. The image size is the one the camera actually
/// delivered, not the one requested.
pub fn camera_calibrate(
    board: &CalibrationBoard,
    frames: &[CapturedFrame],
) -> Result<CalibrationData> {
    let (image_size, frames) = consistent_frames(frames)?;

    let mut matrix = Mat::default();
    let mut dist_coeffs = Mat::default();

    let markers = concatenate_markers(frames.iter().map(|f| &f.markers));
    let aruco_error = aruco::calibrate_camera_aruco(
        &markers.corners,
        &markers.ids,
        &markers.counter,
        &board.board,
        image_size,
        &mut matrix,
        &mut dist_coeffs,
        &mut Vector::<Mat>::new(),
        &mut Vector::<Mat>::new(),
        0,
        criteria()?,
    )?;
    log::debug!(
        "ArUco calibration over {} markers in {} {}x{} frames, error {:.4}",
        markers.ids.len(),
        frames.len(),
        image_size.width,
        image_size.height,
        aruco_error
    );

    let detector = MarkerDetector::new(board)?;
    let mut views = CharucoSet::default();
    for (i, frame) in frames.iter().enumerate() {
        let charuco =
            detector.interpolate(&frame.markers, &frame.image, Some((&matrix, &dist_coeffs)))?;
        let count = charuco.len();
        if !views.push(charuco) {
            log::debug!("frame #{} dropped, {} corners", i + 1, count);
        }
    }
    if views.len() < MIN_CORNER_FRAMES {
        return Err(ErrorKind::NotEnoughCorners.into());
    }

    let mut rvecs = Vector::<Mat>::new();
    let mut tvecs = Vector::<Mat>::new();
    let rep_error = aruco::calibrate_camera_charuco(
        &views.corners,
        &views.ids,
        &board.charuco,
        image_size,
        &mut matrix,
        &mut dist_coeffs,
        &mut rvecs,
        &mut tvecs,
        0,
        criteria()?,
    )?;
    log::info!(
        "Calibrated from {} views, reprojection error {:.4}",
        views.len(),
        rep_error
    );

    Ok(CalibrationData {
        image_size,
        camera_matrix: matrix,
        distortion_coeffs: dist_coeffs,
        avg_reprojection_error: rep_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardSpec;
    use crate::errors::Error;
    use crate::storage;
    use opencv::imgproc::*;

    const IMAGE_W: i32 = 1280;
    const IMAGE_H: i32 = 960;
    const FOCAL: f64 = 900.0;

    // board rendered without margin, so render pixels map linearly onto
    // the board plane
    const RENDER_W: i32 = 500;
    const RENDER_H: i32 = 800;

    /// Projects a board-plane point through a pinhole camera rotated by
    /// `ax` around x then `ay` around y, with the board centre at `centre`.
    fn project(x: f64, y: f64, board: (f64, f64), ax: f64, ay: f64, centre: [f64; 3]) -> Point2f {
        let p = [x - board.0 / 2.0, y - board.1 / 2.0, 0.0];
        // rotate around x
        let p = [p[0], p[1] * ax.cos() - p[2] * ax.sin(), p[1] * ax.sin() + p[2] * ax.cos()];
        // rotate around y
        let p = [p[0] * ay.cos() + p[2] * ay.sin(), p[1], -p[0] * ay.sin() + p[2] * ay.cos()];
        let p = [p[0] + centre[0], p[1] + centre[1], p[2] + centre[2]];
        Point2f::new(
            (FOCAL * p[0] / p[2] + IMAGE_W as f64 / 2.0) as f32,
            (FOCAL * p[1] / p[2] + IMAGE_H as f64 / 2.0) as f32,
        )
    }

    /// Views of the rendered board as an ideal camera would see it.
    fn synthetic_frames(board: &CalibrationBoard, count: usize) -> Vec<CapturedFrame> {
        let poses = [
            (0.0, 0.0, [0.0, 0.0, 0.7]),
            (0.35, 0.0, [0.02, 0.0, 0.7]),
            (-0.35, 0.0, [-0.02, 0.01, 0.7]),
            (0.0, 0.35, [0.0, -0.02, 0.75]),
            (0.0, -0.35, [0.03, 0.0, 0.75]),
            (0.25, 0.25, [-0.03, 0.02, 0.8]),
            (-0.25, 0.3, [0.0, 0.03, 0.8]),
            (0.3, -0.25, [0.02, -0.03, 0.75]),
        ];
        let spec = board.spec;
        let extent = (
            spec.squares_x as f64 * spec.square_length as f64,
            spec.squares_y as f64 * spec.square_length as f64,
        );
        let render = board.render(Size::new(RENDER_W, RENDER_H), 0).unwrap();
        let src = Vector::from_iter([
            Point2f::new(0., 0.),
            Point2f::new(RENDER_W as f32, 0.),
            Point2f::new(RENDER_W as f32, RENDER_H as f32),
            Point2f::new(0., RENDER_H as f32),
        ]);
        let detector = MarkerDetector::new(board).unwrap();

        poses
            .iter()
            .take(count)
            .map(|&(ax, ay, centre)| {
                let dst = Vector::from_iter([
                    project(0.0, 0.0, extent, ax, ay, centre),
                    project(extent.0, 0.0, extent, ax, ay, centre),
                    project(extent.0, extent.1, extent, ax, ay, centre),
                    project(0.0, extent.1, extent, ax, ay, centre),
                ]);
                let h = get_perspective_transform(&src, &dst, DECOMP_LU).unwrap();
                let mut image = Mat::default();
                warp_perspective(
                    &render,
                    &mut image,
                    &h,
                    Size::new(IMAGE_W, IMAGE_H),
                    INTER_LINEAR,
                    BORDER_CONSTANT,
                    Scalar::all(255.0),
                )
                .unwrap();
                let markers = detector.detect(&image).unwrap();
                assert!(!markers.is_empty());
                CapturedFrame { markers, image }
            })
            .collect()
    }

    fn square(x: f32, y: f32) -> Vector<Point2f> {
        Vector::from_iter([
            Point2f::new(x, y),
            Point2f::new(x + 1., y),
            Point2f::new(x + 1., y + 1.),
            Point2f::new(x, y + 1.),
        ])
    }

    fn markers(ids: &[i32]) -> Markers {
        Markers {
            corners: ids.iter().map(|&id| square(id as f32, 0.)).collect(),
            ids: Vector::from_slice(ids),
        }
    }

    #[test]
    fn concatenation_keeps_order_and_counts() {
        let frames = [markers(&[3, 1]), markers(&[]), markers(&[7, 2, 5])];
        let all = concatenate_markers(frames.iter());

        assert_eq!(all.counter.to_vec(), vec![2, 0, 3]);
        assert_eq!(all.ids.to_vec(), vec![3, 1, 7, 2, 5]);
        assert_eq!(all.corners.len(), 5);
        assert_eq!(all.corners.get(2).unwrap().get(0).unwrap(), Point2f::new(7., 0.));
        let total: i32 = all.counter.iter().sum();
        assert_eq!(total as usize, all.ids.len());
    }

    #[test]
    fn sparse_views_are_dropped() {
        let view = |n: i32| CharucoCorners {
            corners: (0..n).map(|i| Point2f::new(i as f32, 0.)).collect(),
            ids: (0..n).collect(),
        };
        let mut set = CharucoSet::default();
        assert!(!set.push(view(4)));
        assert!(set.push(view(5)));
        assert!(!set.push(view(0)));
        assert_eq!(set.len(), 1);
        assert_eq!(set.ids.get(0).unwrap().len(), 5);
    }

    #[test]
    fn no_captures_is_an_error() {
        let board = CalibrationBoard::new(BoardSpec::default()).unwrap();
        match camera_calibrate(&board, &[]) {
            Err(Error::Calibration(ErrorKind::NotEnoughCaptures)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn calibrates_from_board_views_and_saves() {
        let board = CalibrationBoard::new(BoardSpec::default()).unwrap();
        let frames = synthetic_frames(&board, 8);

        let data = camera_calibrate(&board, &frames).unwrap();
        assert_eq!(data.image_size, Size::new(IMAGE_W, IMAGE_H));
        assert_eq!((data.camera_matrix.rows(), data.camera_matrix.cols()), (3, 3));
        assert!(data.avg_reprojection_error.is_finite());
        let fx = *data.camera_matrix.at_2d::<f64>(0, 0).unwrap();
        assert!(fx.is_finite() && fx > 0.0, "fx = {fx}");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.yml");
        let path = path.to_str().unwrap();
        storage::save(path, &data).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        for key in [
            "image_width",
            "image_height",
            "camera_matrix",
            "distortion_coefficients",
            "avg_reprojection_error",
        ] {
            assert!(text.contains(&format!("{key}:")), "missing {key}");
        }
        let loaded = storage::load(path).unwrap();
        assert_eq!(loaded.image_size, Size::new(IMAGE_W, IMAGE_H));
    }

    #[test]
    fn too_few_views_lack_corners() {
        let board = CalibrationBoard::new(BoardSpec::default()).unwrap();
        let frames = synthetic_frames(&board, 3);
        match camera_calibrate(&board, &frames) {
            Err(Error::Calibration(ErrorKind::NotEnoughCorners)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn frames_of_another_size_are_dropped() {
        let frame = |w: i32, h: i32| CapturedFrame {
            markers: markers(&[1]),
            image: Mat::new_rows_cols_with_default(h, w, CV_8UC1, Scalar::all(0.0)).unwrap(),
        };
        let frames = [frame(640, 480), frame(1280, 720), frame(640, 480)];

        let (size, kept) = consistent_frames(&frames).unwrap();
        assert_eq!(size, Size::new(640, 480));
        assert_eq!(kept.len(), 2);
    }
}
