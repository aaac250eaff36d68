//! Per-face liveliness checks: head direction, eye openness, smile and a
//! padded face bounding box, all derived from one face-mesh landmark set.

use std::collections::BTreeMap;

use nalgebra::{Point2, Point3};
use serde::Serialize;
use thiserror::Error;

use crate::geometry::{distance, expand_box, ratio, BoundingBox, PixelPoint};
use crate::landmarks::{index, FaceLandmarks, EYE_INDICES, MOUTH_INDICES, POSE_INDICES};
use crate::pose::{Direction, PoseError, PoseEstimator};

/// Eye aspect ratio below which the eyes are considered closed.
pub const DEFAULT_BLINK_THRESHOLD: f64 = 0.19;
/// Lips-to-jaw width ratio above which the face is considered smiling.
pub const DEFAULT_SMILE_RATIO: f64 = 0.45;
/// Fractional padding applied to each side of the landmark extent.
pub const DEFAULT_BOX_MARGIN: f64 = 0.10;

/// Pixel points keyed by face-mesh index.
pub type KeyedPoints = BTreeMap<usize, PixelPoint>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("landmark {0} missing from face mesh")]
    MissingLandmark(usize),
    #[error("{0} reference distance is zero")]
    ZeroReference(&'static str),
    #[error("head pose: {0}")]
    Pose(#[from] PoseError),
}

/// Thresholds for the geometric checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivelinessConfig {
    pub blink_threshold: f64,
    pub smile_ratio: f64,
    pub box_margin: f64,
}

impl Default for LivelinessConfig {
    fn default() -> Self {
        Self {
            blink_threshold: DEFAULT_BLINK_THRESHOLD,
            smile_ratio: DEFAULT_SMILE_RATIO,
            box_margin: DEFAULT_BOX_MARGIN,
        }
    }
}

/// Liveliness attributes of a single face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceLiveliness {
    pub direction: Direction,
    /// True while the eyes are open. Sent on the wire under the `blink` key.
    #[serde(rename = "blink")]
    pub eyes_open: bool,
    pub smile: bool,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

fn point(points: &KeyedPoints, idx: usize) -> Result<PixelPoint, AnalysisError> {
    points
        .get(&idx)
        .copied()
        .ok_or(AnalysisError::MissingLandmark(idx))
}

/// Mean of the per-eye lid gap to eye width ratios.
pub fn eye_aspect_ratio(eye: &KeyedPoints) -> Result<f64, AnalysisError> {
    let right_gap = distance(
        point(eye, index::RIGHT_EYE_UPPER_LID)?,
        point(eye, index::RIGHT_EYE_LOWER_LID)?,
    );
    let right_width = distance(
        point(eye, index::RIGHT_EYE_OUTER)?,
        point(eye, index::RIGHT_EYE_INNER)?,
    );
    let right = ratio(right_gap, right_width).ok_or(AnalysisError::ZeroReference("right eye width"))?;

    let left_gap = distance(
        point(eye, index::LEFT_EYE_UPPER_LID)?,
        point(eye, index::LEFT_EYE_LOWER_LID)?,
    );
    let left_width = distance(
        point(eye, index::LEFT_EYE_OUTER)?,
        point(eye, index::LEFT_EYE_INNER)?,
    );
    let left = ratio(left_gap, left_width).ok_or(AnalysisError::ZeroReference("left eye width"))?;

    Ok((left + right) / 2.0)
}

/// `false` when the eyes are closed (aspect ratio below `threshold`),
/// `true` otherwise.
pub fn validate_blink(eye: &KeyedPoints, threshold: f64) -> Result<bool, AnalysisError> {
    Ok(eye_aspect_ratio(eye)? >= threshold)
}

/// Mouth corner distance over jaw reference width.
pub fn lips_to_jaw_ratio(mouth: &KeyedPoints) -> Result<f64, AnalysisError> {
    let lips = distance(
        point(mouth, index::MOUTH_RIGHT_CORNER)?,
        point(mouth, index::MOUTH_LEFT_CORNER)?,
    );
    let jaw = distance(point(mouth, index::JAW_RIGHT)?, point(mouth, index::JAW_LEFT)?);
    ratio(lips, jaw).ok_or(AnalysisError::ZeroReference("jaw width"))
}

/// `true` when the lips/jaw ratio is strictly above `min_ratio`.
pub fn validate_smile(mouth: &KeyedPoints, min_ratio: f64) -> Result<bool, AnalysisError> {
    Ok(lips_to_jaw_ratio(mouth)? > min_ratio)
}

/// Derives a [`FaceLiveliness`] from one face's landmarks.
///
/// Holds no per-frame state and can be shared across tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LivelinessAnalyzer {
    config: LivelinessConfig,
    pose: PoseEstimator,
}

impl LivelinessAnalyzer {
    pub fn new(config: LivelinessConfig) -> Self {
        Self {
            config,
            pose: PoseEstimator::new(),
        }
    }

    pub fn config(&self) -> &LivelinessConfig {
        &self.config
    }

    /// Analyze one face in a `width` x `height` frame.
    pub fn analyze(
        &self,
        face: &FaceLandmarks,
        width: u32,
        height: u32,
    ) -> Result<FaceLiveliness, AnalysisError> {
        let mut image_points = Vec::with_capacity(POSE_INDICES.len());
        let mut object_points = Vec::with_capacity(POSE_INDICES.len());
        let mut eye = KeyedPoints::new();
        let mut mouth = KeyedPoints::new();

        let (mut min_x, mut max_x, mut min_y, mut max_y) = (0, 0, 0, 0);
        for (idx, lm) in face.iter().enumerate() {
            let p = lm.to_pixel(width, height);

            // Zero doubles as the "not yet set" marker for the minimums.
            if min_x == 0 {
                min_x = p.x;
            }
            if min_y == 0 {
                min_y = p.y;
            }
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);

            if POSE_INDICES.contains(&idx) {
                let (x, y) = (f64::from(p.x), f64::from(p.y));
                image_points.push(Point2::new(x, y));
                object_points.push(Point3::new(x, y, f64::from(lm.z)));
            }
            if EYE_INDICES.contains(&idx) {
                eye.insert(idx, p);
            }
            if MOUTH_INDICES.contains(&idx) {
                mouth.insert(idx, p);
            }
        }

        let bbox = expand_box(
            BoundingBox::new(min_x, min_y, max_x, max_y),
            self.config.box_margin,
        );
        let direction = self
            .pose
            .direction(&image_points, &object_points, width, height)?;
        let eyes_open = validate_blink(&eye, self.config.blink_threshold)?;
        let smile = validate_smile(&mouth, self.config.smile_ratio)?;

        tracing::trace!(%direction, eyes_open, smile, ?bbox, "face analyzed");

        Ok(FaceLiveliness {
            direction,
            eyes_open,
            smile,
            bbox,
        })
    }
}
