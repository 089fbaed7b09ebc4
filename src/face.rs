//! Face mesh landmark estimation and viewing-distance monitoring.
//!
//! This wraps a MediaPipe Face Mesh style network that predicts 468 mesh landmarks plus 5 iris
//! landmarks per eye. Only the iris centers carry decision weight here: their pixel separation
//! feeds an inverse pinhole-camera relation that estimates how far the viewer sits from the
//! camera.

use nalgebra::{distance, Point2};

use crate::app::{Analyzer, Observation};
use crate::image::{draw, Color, Image};
use crate::iter::zip_exact;
use crate::landmark::{Confidence, Estimate, Estimator, Landmark, Landmarks, Network};
use crate::nn::{self, Cnn, CnnInputShape, ColorMapper, NeuralNetwork};
use crate::num::sigmoid;
use crate::slice::SliceExt;
use crate::timer::Timer;

/// Average human iris diameter in mm. Remarkably constant across the population.
pub const IRIS_DIAMETER_MM: f32 = 11.7;

/// Assumed focal length in pixels (typical laptop webcam).
///
/// This is not calibrated per camera, so the resulting distance is an estimate with an unknown
/// constant factor close to 1. Callers must accept that.
pub const FOCAL_LENGTH_PX: f32 = 900.0;

/// Distances below this many centimeters count as sitting too close.
pub const DISTANCE_THRESHOLD_CM: f32 = 60.0;

/// Estimates the viewer-to-camera distance from the two iris center points, in cm.
///
/// Returns [`None`] when the iris separation is zero, which can only happen on degenerate
/// landmark output and means "no usable reading".
pub fn estimate_distance_cm(left_iris: Point2<f32>, right_iris: Point2<f32>) -> Option<f32> {
    let iris_pixel_dist = distance(&left_iris, &right_iris);
    if iris_pixel_dist == 0.0 {
        return None;
    }

    // d (mm) = f * D / dp
    let distance_mm = (FOCAL_LENGTH_PX * IRIS_DIAMETER_MM) / iris_pixel_dist;
    Some(distance_mm / 10.0)
}

/// Classification of an estimated viewing distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceStatus {
    /// The viewer sits closer than [`DISTANCE_THRESHOLD_CM`].
    TooClose,
    /// The viewing distance is fine.
    Comfortable,
}

impl DistanceStatus {
    pub fn classify(distance_cm: f32) -> Self {
        if distance_cm < DISTANCE_THRESHOLD_CM {
            Self::TooClose
        } else {
            Self::Comfortable
        }
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, Self::TooClose)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TooClose => "too close",
            Self::Comfortable => "ok",
        }
    }
}

/// A [`Network`] estimating face mesh and iris landmarks on an image of a face.
pub struct FaceMeshNetwork {
    cnn: Cnn,
}

impl FaceMeshNetwork {
    pub const MODEL_FILE: &'static str = "face_landmarks_detector.onnx";

    /// Loads the face mesh model from the model directory.
    pub fn load() -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(nn::model_path(Self::MODEL_FILE))?
            .with_output_selection([0, 1])
            .load()?;
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(-1.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl Network for FaceMeshNetwork {
    type Output = FaceLandmarks;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &crate::nn::Outputs, estimate: &mut Self::Output) {
        estimate.face_flag = sigmoid(outputs[1].index([0, 0, 0, 0]).as_singular());

        let landmark_coords = outputs[0].index([0, 0, 0]);
        for (&[x, y, z], out) in zip_exact(
            landmark_coords.as_slice().array_chunks_exact::<3>(),
            estimate.landmarks.positions_mut(),
        ) {
            *out = [x, y, z];
        }
    }
}

/// Face mesh and iris landmarks estimated by [`FaceMeshNetwork`].
#[derive(Clone)]
pub struct FaceLandmarks {
    landmarks: Landmarks,
    face_flag: f32,
}

impl Default for FaceLandmarks {
    fn default() -> Self {
        Self {
            landmarks: Landmarks::new(Self::NUM_LANDMARKS),
            face_flag: 0.0,
        }
    }
}

impl FaceLandmarks {
    /// 468 mesh landmarks, followed by 5 landmarks per iris.
    pub const NUM_MESH_LANDMARKS: usize = 468;
    pub const NUM_LANDMARKS: usize = Self::NUM_MESH_LANDMARKS + 2 * 5;

    #[inline]
    pub fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    /// Returns the 5 landmarks marking the left iris (from the perspective of the camera).
    ///
    /// The first landmark is the center of the iris, the 4 others surround it.
    pub fn left_iris(&self) -> impl Iterator<Item = Landmark> + '_ {
        (Self::NUM_MESH_LANDMARKS..Self::NUM_MESH_LANDMARKS + 5).map(|i| self.landmarks.get(i))
    }

    /// Returns the 5 landmarks marking the right iris (from the perspective of the camera).
    pub fn right_iris(&self) -> impl Iterator<Item = Landmark> + '_ {
        (Self::NUM_MESH_LANDMARKS + 5..Self::NUM_LANDMARKS).map(|i| self.landmarks.get(i))
    }

    /// Returns the center point of the left iris.
    pub fn left_iris_center(&self) -> Point2<f32> {
        let lm = self.landmarks.get(Self::NUM_MESH_LANDMARKS);
        Point2::new(lm.x(), lm.y())
    }

    /// Returns the center point of the right iris.
    pub fn right_iris_center(&self) -> Point2<f32> {
        let lm = self.landmarks.get(Self::NUM_MESH_LANDMARKS + 5);
        Point2::new(lm.x(), lm.y())
    }
}

impl Estimate for FaceLandmarks {
    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }
}

impl Confidence for FaceLandmarks {
    #[inline]
    fn confidence(&self) -> f32 {
        self.face_flag
    }
}

/// [`Analyzer`] that estimates the viewing distance from iris landmarks.
pub struct DistanceAnalyzer {
    estimator: Estimator<FaceLandmarks>,
}

impl DistanceAnalyzer {
    /// Loads the face mesh network; fails if the model file is missing or malformed.
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            estimator: Estimator::new(FaceMeshNetwork::load()?),
        })
    }
}

impl Analyzer for DistanceAnalyzer {
    fn name(&self) -> &'static str {
        "Eye Distance Monitor"
    }

    fn reminder(&self) -> &'static str {
        "You're sitting too close (<60 cm). Please move back"
    }

    fn analyze(&mut self, image: &mut Image) -> anyhow::Result<Option<Observation>> {
        let marks = self.estimator.estimate(&*image)?;
        if marks.confidence() < 0.5 {
            return Ok(None);
        }

        let left = marks.left_iris_center();
        let right = marks.right_iris_center();
        let Some(cm) = estimate_distance_cm(left, right) else {
            return Ok(None);
        };
        let status = DistanceStatus::classify(cm);

        let color = if status.is_bad() {
            Color::RED
        } else {
            Color::GREEN
        };
        let (left, right) = (left.map(|v| v as i32), right.map(|v| v as i32));
        draw::marker(image, left.x, left.y).color(color);
        draw::marker(image, right.x, right.y).color(color);

        Ok(Some(Observation {
            label: format!("Distance: {cm:.1} cm"),
            bad: status.is_bad(),
            color,
        }))
    }

    fn timers(&self) -> Box<dyn Iterator<Item = &Timer> + '_> {
        Box::new(self.estimator.timers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn distance_from_iris_separation() {
        // 117 px of iris separation with the assumed focal length works out to 9 cm.
        let left = Point2::new(0.0, 0.0);
        let right = Point2::new(117.0, 0.0);
        let cm = estimate_distance_cm(left, right).unwrap();
        assert_relative_eq!(cm, 9.0);

        let cm = estimate_distance_cm(Point2::new(300.0, 20.0), Point2::new(417.0, 20.0)).unwrap();
        assert_relative_eq!(cm, 9.0);
    }

    #[test]
    fn zero_separation_is_no_reading() {
        let p = Point2::new(64.0, 32.0);
        assert_eq!(estimate_distance_cm(p, p), None);
    }

    #[test]
    fn classification_threshold() {
        assert_eq!(DistanceStatus::classify(59.9), DistanceStatus::TooClose);
        assert_eq!(DistanceStatus::classify(60.0), DistanceStatus::Comfortable);
        assert!(DistanceStatus::TooClose.is_bad());
        assert!(!DistanceStatus::Comfortable.is_bad());
    }
}
