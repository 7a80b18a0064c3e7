use opencv::prelude::*;
use std::{env, path::Path, process};

use charuco_calib::board::*;
use charuco_calib::calibration::*;
use charuco_calib::capture::*;
use charuco_calib::config::*;
use charuco_calib::errors::Result;
use charuco_calib::pose::run_preview;
use charuco_calib::storage;

fn main() {
    let args: Vec<String> = env::args().collect();

    let opts = options();
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{f}");
            print_usage(&args[0], opts);
            process::exit(2);
        }
    };
    if matches.opt_present("h") {
        print_usage(&args[0], opts);
        return;
    }

    // before building settings, so option warnings are shown
    env_logger::Builder::new()
        .filter_level(log_level(&matches))
        .parse_default_env()
        .init();

    let settings = match Settings::from_matches(&matches) {
        Ok(s) => s,
        Err(err) => {
            log::error!("{err}");
            process::exit(2);
        }
    };
    log::debug!("{:?}", settings);

    if let Err(err) = run(&settings) {
        log::error!("{err}");
        process::exit(1);
    }
}

fn print_usage(program: &str, opts: getopts::Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn calibrate(settings: &Settings, board: &CalibrationBoard) -> Result<()> {
    board.save_image(&settings.board_image, PRINT_SIZE, PRINT_MARGIN)?;

    let mut cam = open_camera(settings.camera_index, settings.resolution)?;
    let frames = capture_frames(&mut cam, board, settings.capture)?;
    cam.release()?;

    let data = camera_calibrate(board, &frames)?;
    storage::save(&settings.output, &data)
}

fn run(settings: &Settings) -> Result<()> {
    let board = CalibrationBoard::new(settings.board)?;

    if settings.force || !Path::new(&settings.output).exists() {
        calibrate(settings, &board)?;
    } else {
        log::info!("Using existing calibration {}", settings.output);
    }

    let data = storage::load(&settings.output)?;
    println!("camera_matrix: {:?}", data.camera_matrix.to_vec_2d::<f64>()?);
    println!("dist_coeffs: {:?}", data.distortion_coeffs.to_vec_2d::<f64>()?);
    println!("avg_reprojection_error: {:.4}", data.avg_reprojection_error);

    if settings.preview {
        let mut cam = open_camera(settings.camera_index, data.image_size)?;
        run_preview(&mut cam, &board, &data)?;
    }

    Ok(())
}
