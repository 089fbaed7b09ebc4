//! Caretaker webcam wellness monitors.
//!
//! This library backs two small desktop utilities that watch the user through the default webcam
//! and occasionally remind them to take better care of themselves:
//!
//! - `caretaker-distance` estimates the distance between viewer and camera from the iris landmarks
//!   of a face mesh and nags when the user sits closer than 60 cm.
//! - `caretaker-posture` estimates sitting posture from body keypoints and nags when the user
//!   slouches or leans back.
//!
//! Both are thin shells around the same pipeline: grab a frame, run a landmark network, reduce the
//! landmarks to a scalar metric, threshold it, and feed the resulting good/bad reading into the
//! debounce/snooze state machine in [`monitor`].
//!
//! # Environment Variables
//!
//! Some parts of Caretaker can be overridden by setting environment variables:
//!
//! * `CARETAKER_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name. If unset, the first device that supports a compatible image format will be used.
//! * `CARETAKER_MODEL_DIR`: Directory containing the `.onnx` landmark model files. Defaults to
//!   `models`.
//! * `CARETAKER_JPEG_BACKEND`: Configures the JPEG image decoder to use. Allowed values are:
//!   * `mozjpeg`: uses the [mozjpeg] library to decode JPEG images.
//!   * `image`: uses the [image] crate's pure-Rust decoder.
//!
//! [mozjpeg]: https://github.com/mozilla/mozjpeg
//! [image]: https://github.com/image-rs/image
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;

pub mod app;
pub mod body;
pub mod face;
pub mod filter;
pub mod gui;
pub mod image;
pub mod iter;
pub mod landmark;
pub mod monitor;
pub mod nn;
pub mod num;
pub mod slice;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and Caretaker will log at *debug* level, `wgpu` at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
