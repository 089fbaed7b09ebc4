//! Video input sources.

pub mod webcam;
