use opencv::highgui::*;

pub const CALIBRATION_WINDOW: &str = "calibration";
pub const POSE_WINDOW: &str = "pose";

// wait_key codes, after masking with `key_code`
pub const KEY_NONE: i32 = 0xff;
pub const KEY_ESC: i32 = 27;
pub const KEY_SPACE: i32 = 32;
pub const KEY_ENTER: i32 = 10;
pub const KEY_RETURN: i32 = 13;

/// Drops modifier bits some highgui backends set on key codes.
pub fn key_code(raw: i32) -> i32 {
    raw & 0xff
}

/// Waits for a key like `wait_key`, returning its masked code.
pub fn poll_key(delay: i32) -> opencv::Result<i32> {
    Ok(key_code(wait_key(delay)?))
}

pub fn show_frame(name: &str, frame: &opencv::core::Mat) -> opencv::Result<()> {
    named_window(name, WINDOW_AUTOSIZE)?;
    imshow(name, frame)?;
    Ok(())
}

pub fn destroy_frame(name: &str) -> opencv::Result<()> {
    destroy_window(name)?;
    Ok(())
}
