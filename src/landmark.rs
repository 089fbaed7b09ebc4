//! Common code for visual landmark estimation.

use crate::image::{Image, Resolution};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

type Position = [f32; 3];

/// A list of landmark positions with optional per-landmark visibility and presence values.
#[derive(Clone)]
pub struct Landmarks {
    positions: Box<[Position]>,
    visibility: Option<Box<[f32]>>,
    presence: Option<Box<[f32]>>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` preallocated landmarks.
    ///
    /// All landmarks will start with all coordinates at `0.0`.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0, 0.0, 0.0]; len].into_boxed_slice(),
            visibility: None,
            presence: None,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        (0..self.positions.len()).map(|i| self.get(i))
    }

    pub fn get(&self, index: usize) -> Landmark {
        let mut lm = Landmark::new(self.positions[index]);
        if let Some(vis) = &self.visibility {
            lm = lm.with_visibility(vis[index]);
        }
        if let Some(pres) = &self.presence {
            lm = lm.with_presence(pres[index]);
        }
        lm
    }

    pub fn set(&mut self, index: usize, landmark: Landmark) {
        let len = self.positions.len();
        self.positions[index] = landmark.pos;
        if let Some(vis) = landmark.visibility {
            self.visibility.get_or_insert_with(|| vec![0.0; len].into())[index] = vis;
        }
        if let Some(pres) = landmark.presence {
            self.presence.get_or_insert_with(|| vec![0.0; len].into())[index] = pres;
        }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }
}

/// A landmark in 3D space.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Landmark {
    pos: Position,
    visibility: Option<f32>,
    presence: Option<f32>,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self {
            pos: position,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_visibility(self, visibility: f32) -> Self {
        Self {
            visibility: Some(visibility),
            ..self
        }
    }

    pub fn with_presence(self, presence: f32) -> Self {
        Self {
            presence: Some(presence),
            ..self
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }
}

/// Trait for landmark estimation results returned by [`Estimator::estimate`].
pub trait Estimate: Send + Sync + 'static {
    /// Returns the predicted [`Landmarks`].
    fn landmarks_mut(&mut self) -> &mut Landmarks;
}

/// Trait for network inference results that contain a confidence value.
///
/// The confidence value indicates whether the tracked object is in view at all. It gates whether
/// the rest of a result should be used.
pub trait Confidence {
    /// Confidence value indicating whether the tracked object is in view.
    ///
    /// By convention, this is in range 0.0 to 1.0, with anything above 0.5 indicating that the
    /// tracked object is probably in view.
    fn confidence(&self) -> f32;
}

/// Trait implemented by wrapper types around neural networks that estimate landmarks.
pub trait Network: Send + Sync + 'static {
    /// Type representing the predicted landmarks.
    type Output: Estimate;

    /// Returns the [`Cnn`] to use for landmark estimation.
    fn cnn(&self) -> &Cnn;

    /// Extracts the network outputs and writes them to `estimate`.
    ///
    /// The landmark positions are expected to be in the coordinate system of the network's input.
    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output);
}

/// Neural-network based landmark estimator.
///
/// This estimator processes an input image and yields an [`Estimate`] of type `E`, containing the
/// derived [`Landmarks`] and other data (depending on the network).
pub struct Estimator<E: Estimate> {
    network: Box<dyn Network<Output = E>>,
    estimate: E,
    t_infer: Timer,
    t_extract: Timer,
}

impl<E: Estimate + Default> Estimator<E> {
    pub fn new<N: Network<Output = E>>(network: N) -> Self {
        Self {
            network: Box::new(network),
            estimate: E::default(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
        }
    }
}

impl<E: Estimate> Estimator<E> {
    /// Returns the expected input resolution of the internal neural network.
    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    /// Returns profiling timers for this landmark estimator.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract].into_iter()
    }

    /// Performs landmark estimation on `image`, returning the [`Estimate`].
    ///
    /// If the aspect ratio of `image` does not match the aspect ratio of the network's input, an
    /// enlarged sampling rectangle of the right aspect ratio is used instead, adding black bars
    /// around the image. Landmark positions are mapped back to `image`'s coordinate system before
    /// this method returns.
    pub fn estimate(&mut self, image: &Image) -> anyhow::Result<&mut E> {
        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();

        // If the input image's aspect ratio doesn't match the CNN's input, enlarge the sampled
        // rectangle so that it does.
        let rect = image
            .rect()
            .grow_to_fit_aspect(input_res.aspect_ratio().unwrap());
        let outputs = self.t_infer.time(|| cnn.estimate(image, rect))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract
            .time(|| self.network.extract(&outputs, &mut self.estimate));

        // Map landmark coordinates back into the input image.
        let scale = rect.width() / input_res.width() as f32;
        for pos in self.estimate.landmarks_mut().positions_mut() {
            // Map all coordinates from the network's input coordinate system to `rect`'s system,
            // then remove the offset added by the oversized rectangle (this compensates for
            // "black bars" added to adjust the aspect ratio).
            *pos = pos.map(|t| t * scale);
            pos[0] += rect.x();
            pos[1] += rect.y();
        }

        Ok(&mut self.estimate)
    }
}
