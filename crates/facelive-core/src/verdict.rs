//! Per-frame verdict message sent to the remote peer.
//!
//! Wire format (JSON object):
//!
//! ```text
//! {"num_face": N}                                   // N != 1
//! {"num_face": 1, "direction": "Left", "blink": true, "smile": false, "box": [x0, y0, x1, y1]}
//! ```

use serde::Serialize;

use crate::liveliness::FaceLiveliness;

/// Liveliness verdict for one analyzed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivelinessVerdict {
    #[serde(rename = "num_face")]
    pub num_faces: usize,
    /// Present only when exactly one face was detected.
    #[serde(flatten)]
    pub face: Option<FaceLiveliness>,
}

impl LivelinessVerdict {
    /// Verdict for a frame with exactly one face.
    pub fn single(face: FaceLiveliness) -> Self {
        Self {
            num_faces: 1,
            face: Some(face),
        }
    }

    /// Verdict carrying only the face count. Used for frames with zero or
    /// several faces; liveliness fields are omitted whatever the count.
    pub fn counted(num_faces: usize) -> Self {
        Self {
            num_faces,
            face: None,
        }
    }

    /// Serialize to the JSON wire message.
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::liveliness::tests::{frontal_face, HEIGHT, WIDTH};
    use crate::liveliness::LivelinessAnalyzer;
    use crate::pose::Direction;

    #[test]
    fn test_counted_verdicts_carry_only_the_count() {
        assert_eq!(LivelinessVerdict::counted(0).to_message().unwrap(), r#"{"num_face":0}"#);
        assert_eq!(LivelinessVerdict::counted(2).to_message().unwrap(), r#"{"num_face":2}"#);
    }

    #[test]
    fn test_counted_accepts_any_count() {
        let verdict = LivelinessVerdict::counted(1);
        assert_eq!(verdict.face, None);
        assert_eq!(verdict.to_message().unwrap(), r#"{"num_face":1}"#);
    }

    #[test]
    fn test_single_face_message_layout() {
        let verdict = LivelinessVerdict::single(FaceLiveliness {
            direction: Direction::Left,
            eyes_open: true,
            smile: false,
            bbox: BoundingBox::new(10, 20, 110, 140),
        });
        assert_eq!(
            verdict.to_message().unwrap(),
            r#"{"num_face":1,"direction":"Left","blink":true,"smile":false,"box":[10,20,110,140]}"#
        );
    }

    #[test]
    fn test_analyzed_face_round_trips_to_wire_keys() {
        let face = LivelinessAnalyzer::default()
            .analyze(&frontal_face(0.30, 140), WIDTH, HEIGHT)
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&LivelinessVerdict::single(face).to_message().unwrap()).unwrap();

        assert_eq!(value["num_face"], 1);
        assert_eq!(value["direction"], "Forward");
        assert_eq!(value["blink"], true);
        assert_eq!(value["smile"], true);
        assert_eq!(value["box"].as_array().map(|a| a.len()), Some(4));
        assert!(value.get("eyes_open").is_none());
    }
}
