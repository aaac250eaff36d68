//! Landmark-to-liveliness analysis for face-mesh video.
//!
//! Given the normalised landmarks of one detected face and the frame size,
//! [`LivelinessAnalyzer`] derives head direction (via a PnP head pose solve),
//! eye openness, smile and a padded bounding box. [`LivelinessVerdict`] is the
//! per-frame wire message built from that result.

pub mod geometry;
pub mod landmarks;
pub mod liveliness;
pub mod pose;
pub mod verdict;

pub use geometry::{distance, expand_box, BoundingBox, PixelPoint};
pub use landmarks::{FaceLandmarks, LandmarkPoint};
pub use liveliness::{AnalysisError, FaceLiveliness, LivelinessAnalyzer, LivelinessConfig};
pub use pose::{Direction, PoseAngles, PoseError, PoseEstimator};
pub use verdict::LivelinessVerdict;
