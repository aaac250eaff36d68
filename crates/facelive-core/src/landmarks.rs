//! Face-mesh landmark data model.
//!
//! Landmarks arrive normalised: `x` and `y` are fractions of the frame width
//! and height, `z` is relative depth in roughly the same scale as `x`. Indices
//! follow the 468-point dense face mesh topology.

use serde::Deserialize;

use crate::geometry::PixelPoint;

/// Number of points in a dense face mesh.
pub const FACE_MESH_POINTS: usize = 468;

/// Fixed mesh indices used by the liveliness checks.
pub mod index {
    pub const RIGHT_EYE_OUTER: usize = 33;
    pub const RIGHT_EYE_INNER: usize = 133;
    pub const RIGHT_EYE_UPPER_LID: usize = 159;
    pub const RIGHT_EYE_LOWER_LID: usize = 145;

    pub const LEFT_EYE_OUTER: usize = 263;
    pub const LEFT_EYE_INNER: usize = 362;
    pub const LEFT_EYE_UPPER_LID: usize = 386;
    pub const LEFT_EYE_LOWER_LID: usize = 374;

    pub const MOUTH_RIGHT_CORNER: usize = 61;
    pub const MOUTH_LEFT_CORNER: usize = 291;
    pub const JAW_RIGHT: usize = 132;
    pub const JAW_LEFT: usize = 361;

    pub const CHIN: usize = 199;
}

/// Points fed to the head pose solve.
pub const POSE_INDICES: [usize; 5] = [
    index::RIGHT_EYE_OUTER,
    index::LEFT_EYE_OUTER,
    index::MOUTH_RIGHT_CORNER,
    index::MOUTH_LEFT_CORNER,
    index::CHIN,
];

/// Eye corner and lid points for the eye aspect ratio.
pub const EYE_INDICES: [usize; 8] = [
    index::LEFT_EYE_OUTER,
    index::LEFT_EYE_INNER,
    index::LEFT_EYE_UPPER_LID,
    index::LEFT_EYE_LOWER_LID,
    index::RIGHT_EYE_INNER,
    index::RIGHT_EYE_OUTER,
    index::RIGHT_EYE_UPPER_LID,
    index::RIGHT_EYE_LOWER_LID,
];

/// Mouth corners and jaw-width reference points.
pub const MOUTH_INDICES: [usize; 4] = [
    index::MOUTH_RIGHT_CORNER,
    index::MOUTH_LEFT_CORNER,
    index::JAW_RIGHT,
    index::JAW_LEFT,
];

/// A single normalised landmark. Deserialises from `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "[f32; 3]")]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LandmarkPoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Scale to pixel coordinates, truncating toward zero.
    pub fn to_pixel(&self, width: u32, height: u32) -> PixelPoint {
        PixelPoint {
            x: (f64::from(self.x) * f64::from(width)) as i32,
            y: (f64::from(self.y) * f64::from(height)) as i32,
        }
    }
}

impl From<[f32; 3]> for LandmarkPoint {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Ordered landmarks of one detected face.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct FaceLandmarks(pub Vec<LandmarkPoint>);

impl FaceLandmarks {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self(points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LandmarkPoint> {
        self.0.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&LandmarkPoint> {
        self.0.get(idx)
    }
}

impl From<Vec<LandmarkPoint>> for FaceLandmarks {
    fn from(points: Vec<LandmarkPoint>) -> Self {
        Self(points)
    }
}
