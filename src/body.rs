//! Body pose landmark estimation and sitting-posture monitoring.
//!
//! The posture metric `f2` relates the two ear-to-shoulder distances to the shoulder span:
//! hunching forward shortens the ear-shoulder distances (low `f2`), while leaning far back
//! stretches them (high `f2`). Face triangle incenters are computed as well, but only serve as
//! overlay markers.

use nalgebra::{distance, Point2};

use crate::app::{Analyzer, Observation};
use crate::image::{draw, Color, Image};
use crate::landmark::{Confidence, Estimate, Estimator, Landmark, Landmarks, Network};
use crate::nn::{self, Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};
use crate::num::sigmoid;
use crate::slice::SliceExt;
use crate::timer::Timer;

/// Posture ratios inside this band count as neutral sitting posture.
pub const BASELINE_BAND: (f32, f32) = (1.2, 1.4);

/// Margin added around [`BASELINE_BAND`] before a posture counts as bad.
pub const ERROR_MARGIN: f32 = 0.1;

/// Computes the posture ratio `f2` from ear and shoulder keypoints.
///
/// Returns `0.0` when the shoulder span is zero. That value only occurs on degenerate landmark
/// output and means "no usable reading"; callers must filter it out before classifying.
pub fn posture_ratio(
    left_ear: Point2<f32>,
    right_ear: Point2<f32>,
    left_shoulder: Point2<f32>,
    right_shoulder: Point2<f32>,
) -> f32 {
    let s1 = distance(&left_ear, &left_shoulder);
    let s2 = distance(&right_ear, &right_shoulder);
    let s3 = distance(&left_shoulder, &right_shoulder);

    if s3 > 0.0 {
        (s1 + s2) / s3
    } else {
        0.0
    }
}

/// Computes the incenter of the triangle `(a, b, c)`.
///
/// The incenter is the weighted average of the vertices, each weighted by the length of the
/// opposite side. For a fully degenerate triangle (all sides zero) `a` is returned.
pub fn incenter(a: Point2<f32>, b: Point2<f32>, c: Point2<f32>) -> Point2<f32> {
    let side_a = distance(&b, &c);
    let side_b = distance(&a, &c);
    let side_c = distance(&a, &b);
    let perimeter = side_a + side_b + side_c;
    if perimeter == 0.0 {
        return a;
    }

    Point2::new(
        (side_a * a.x + side_b * b.x + side_c * c.x) / perimeter,
        (side_a * a.y + side_b * b.y + side_c * c.y) / perimeter,
    )
}

/// Classification of a posture ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostureStatus {
    /// Hunched forward over the desk.
    Hunched,
    /// Leaning far back from the desk.
    LeaningBack,
    /// Neutral sitting posture.
    Good,
}

impl PostureStatus {
    pub fn classify(f2: f32) -> Self {
        if f2 < BASELINE_BAND.0 - ERROR_MARGIN {
            Self::Hunched
        } else if f2 > BASELINE_BAND.1 + ERROR_MARGIN {
            Self::LeaningBack
        } else {
            Self::Good
        }
    }

    pub fn is_bad(&self) -> bool {
        !matches!(self, Self::Good)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hunched => "Hunched!",
            Self::LeaningBack => "Leaning Back",
            Self::Good => "Good Posture",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Hunched => Color::RED,
            Self::LeaningBack => Color::ORANGE,
            Self::Good => Color::GREEN,
        }
    }
}

/// Indices of the named body pose landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// A [`Network`] predicting body pose landmarks on an image of a person.
pub struct PoseNetwork {
    cnn: Cnn,
}

impl PoseNetwork {
    pub const MODEL_FILE: &'static str = "pose_landmark_lite.onnx";

    /// Loads the pose landmark model from the model directory.
    pub fn load() -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(nn::model_path(Self::MODEL_FILE))?
            .with_output_selection([0, 1])
            .load()?;
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl Network for PoseNetwork {
    type Output = PoseLandmarks;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) {
        let screen_landmarks = &outputs[0];
        let pose_flag = &outputs[1];

        // 33 pose landmarks (`LandmarkIdx`), 6 auxiliary landmarks -> 39 total
        assert_eq!(screen_landmarks.shape(), &[1, 39 * 5]); // 5 values each
        assert_eq!(pose_flag.shape(), &[1, 1]);

        estimate.pose_presence = pose_flag.index([0, 0]).as_singular();

        for (i, &[x, y, z, visibility, presence]) in screen_landmarks
            .index([0])
            .as_slice()
            .array_chunks_exact::<5>()
            .enumerate()
        {
            estimate.landmarks.set(
                i,
                Landmark::new([x, y, z])
                    .with_visibility(sigmoid(visibility))
                    .with_presence(sigmoid(presence)),
            );
        }
    }
}

/// Body pose landmarks estimated by [`PoseNetwork`].
#[derive(Clone)]
pub struct PoseLandmarks {
    pose_presence: f32,
    landmarks: Landmarks,
}

impl Default for PoseLandmarks {
    fn default() -> Self {
        Self {
            pose_presence: 0.0,
            landmarks: Landmarks::new(33 + 6),
        }
    }
}

impl PoseLandmarks {
    pub fn get(&self, i: LandmarkIdx) -> Landmark {
        self.landmarks.get(i as usize)
    }

    /// Returns the named keypoint as a 2D image-space point.
    pub fn point(&self, i: LandmarkIdx) -> Point2<f32> {
        let lm = self.get(i);
        Point2::new(lm.x(), lm.y())
    }
}

impl Estimate for PoseLandmarks {
    #[inline]
    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }
}

impl Confidence for PoseLandmarks {
    #[inline]
    fn confidence(&self) -> f32 {
        self.pose_presence
    }
}

/// [`Analyzer`] that estimates sitting posture from body keypoints.
pub struct PostureAnalyzer {
    estimator: Estimator<PoseLandmarks>,
}

impl PostureAnalyzer {
    /// Loads the pose landmark network; fails if the model file is missing or malformed.
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            estimator: Estimator::new(PoseNetwork::load()?),
        })
    }
}

impl Analyzer for PostureAnalyzer {
    fn name(&self) -> &'static str {
        "Posture Monitor"
    }

    fn reminder(&self) -> &'static str {
        "You've been slouching for a while. Sit up straight"
    }

    fn analyze(&mut self, image: &mut Image) -> anyhow::Result<Option<Observation>> {
        let marks = self.estimator.estimate(&*image)?;
        if marks.confidence() < 0.5 {
            return Ok(None);
        }

        let left_ear = marks.point(LandmarkIdx::LeftEar);
        let right_ear = marks.point(LandmarkIdx::RightEar);
        let left_shoulder = marks.point(LandmarkIdx::LeftShoulder);
        let right_shoulder = marks.point(LandmarkIdx::RightShoulder);

        if distance(&left_shoulder, &right_shoulder) == 0.0 {
            // Degenerate output, no usable reading this tick.
            return Ok(None);
        }

        let f2 = posture_ratio(left_ear, right_ear, left_shoulder, right_shoulder);
        let status = PostureStatus::classify(f2);

        // Face midpoints, drawn alongside the decision keypoints.
        let nose = marks.point(LandmarkIdx::Nose);
        let left_face_mid = incenter(marks.point(LandmarkIdx::LeftEye), left_ear, nose);
        let right_face_mid = incenter(marks.point(LandmarkIdx::RightEye), right_ear, nose);

        let color = status.color();
        for point in [
            left_ear,
            right_ear,
            left_shoulder,
            right_shoulder,
            left_face_mid,
            right_face_mid,
        ] {
            draw::marker(image, point.x as i32, point.y as i32).color(color);
        }

        Ok(Some(Observation {
            label: format!("f2: {f2:.2} - {}", status.label()),
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

    /// Places ears and shoulders so that the ear-shoulder distances are `s1`/`s2` and the
    /// shoulder span is `s3`.
    fn ratio_for(s1: f32, s2: f32, s3: f32) -> f32 {
        let left_shoulder = Point2::new(0.0, 0.0);
        let right_shoulder = Point2::new(s3, 0.0);
        let left_ear = Point2::new(0.0, -s1);
        let right_ear = Point2::new(s3, -s2);
        posture_ratio(left_ear, right_ear, left_shoulder, right_shoulder)
    }

    #[test]
    fn ratio_and_classification() {
        let f2 = ratio_for(130.0, 130.0, 100.0);
        assert_relative_eq!(f2, 2.6);
        assert_eq!(PostureStatus::classify(f2), PostureStatus::LeaningBack);

        let f2 = ratio_for(60.0, 60.0, 100.0);
        assert_relative_eq!(f2, 1.2);
        assert_eq!(PostureStatus::classify(f2), PostureStatus::Good);

        let f2 = ratio_for(50.0, 50.0, 100.0);
        assert_relative_eq!(f2, 1.0);
        assert_eq!(PostureStatus::classify(f2), PostureStatus::Hunched);
    }

    #[test]
    fn zero_shoulder_span_is_sentinel() {
        // The sentinel value falls below the hunch threshold; callers must filter it out before
        // classification, but the boundary is worth pinning down.
        let f2 = ratio_for(60.0, 60.0, 0.0);
        assert_eq!(f2, 0.0);
        assert_eq!(PostureStatus::classify(f2), PostureStatus::Hunched);
    }

    #[test]
    fn band_edges() {
        assert_eq!(PostureStatus::classify(1.1), PostureStatus::Good);
        assert_eq!(PostureStatus::classify(1.5), PostureStatus::Good);
        assert_eq!(
            PostureStatus::classify(1.501),
            PostureStatus::LeaningBack
        );
        assert_eq!(PostureStatus::classify(1.099), PostureStatus::Hunched);
    }

    #[test]
    fn incenter_of_equilateral_triangle_is_centroid() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(2.0, 0.0);
        let c = Point2::new(1.0, 3.0f32.sqrt());
        let center = incenter(a, b, c);
        assert_relative_eq!(center.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(center.y, 3.0f32.sqrt() / 3.0, epsilon = 1e-5);
    }

    #[test]
    fn incenter_of_right_triangle() {
        // 3-4-5 triangle with legs on the axes has its incircle at (1, 1).
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(4.0, 0.0);
        let c = Point2::new(0.0, 3.0);
        let center = incenter(a, b, c);
        assert_relative_eq!(center.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(center.y, 1.0, epsilon = 1e-5);
    }
}
