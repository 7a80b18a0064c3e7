use opencv::{core::*, prelude::*};

use crate::calibration::CalibrationData;
use crate::errors::{ErrorKind, Result};

pub const DEFAULT_CALIBRATION_FILE: &str = "camera.yml";

const IMAGE_WIDTH: &str = "image_width";
const IMAGE_HEIGHT: &str = "image_height";
const CAMERA_MATRIX: &str = "camera_matrix";
const DISTORTION_COEFFICIENTS: &str = "distortion_coefficients";
const AVG_REPROJECTION_ERROR: &str = "avg_reprojection_error";

/// Writes the calibration as an OpenCV FileStorage document. The format
/// (YAML, XML or JSON) follows the file extension.
pub fn save(filename: &str, data: &CalibrationData) -> Result<()> {
    let mut fs = FileStorage::new(filename, FileStorage_WRITE, "")?;
    if !fs.is_opened()? {
        return Err(ErrorKind::CannotSave(filename.to_string()).into());
    }
    fs.write_i32(IMAGE_WIDTH, data.image_size.width)?;
    fs.write_i32(IMAGE_HEIGHT, data.image_size.height)?;
    fs.write_mat(CAMERA_MATRIX, &data.camera_matrix)?;
    fs.write_mat(DISTORTION_COEFFICIENTS, &data.distortion_coeffs)?;
    fs.write_f64(AVG_REPROJECTION_ERROR, data.avg_reprojection_error)?;
    fs.release()?;
    log::info!("Calibration saved to {filename}");
    Ok(())
}

pub fn load(filename: &str) -> Result<CalibrationData> {
    let mut fs = match FileStorage::new(filename, FileStorage_READ, "") {
        Ok(fs) => fs,
        Err(err) => {
            log::debug!("{err}");
            return Err(ErrorKind::CannotOpen(filename.to_string()).into());
        }
    };
    if !fs.is_opened()? {
        return Err(ErrorKind::CannotOpen(filename.to_string()).into());
    }

    let width = node(&fs, IMAGE_WIDTH)?.real()? as i32;
    let height = node(&fs, IMAGE_HEIGHT)?.real()? as i32;
    let camera_matrix = node(&fs, CAMERA_MATRIX)?.mat()?;
    let distortion_coeffs = node(&fs, DISTORTION_COEFFICIENTS)?.mat()?;
    let avg_reprojection_error = node(&fs, AVG_REPROJECTION_ERROR)?.real()?;
    fs.release()?;

    if camera_matrix.rows() != 3 || camera_matrix.cols() != 3 {
        return Err(ErrorKind::MissingField(CAMERA_MATRIX).into());
    }
    if distortion_coeffs.empty() {
        return Err(ErrorKind::MissingField(DISTORTION_COEFFICIENTS).into());
    }

    Ok(CalibrationData {
        image_size: Size::new(width, height),
        camera_matrix,
        distortion_coeffs,
        avg_reprojection_error,
    })
}

fn node(fs: &FileStorage, key: &'static str) -> Result<FileNode> {
    let node = fs.get(key)?;
    if node.empty()? {
        return Err(ErrorKind::MissingField(key).into());
    }
    Ok(node)
}
