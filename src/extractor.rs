//! Frame signal extraction
//!
//! Thin adapter over the landmark collaborator: turns a frame's blendshape
//! category list into the fixed-shape eye and expression records.

use crate::error::EngineError;
use crate::types::{ExpressionData, EyeData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blendshape category names read from the landmark collaborator.
///
/// Left-side categories stand in for the whole face; any category missing
/// from a frame reads as 0.
pub mod categories {
    pub const EYE_BLINK_LEFT: &str = "eyeBlinkLeft";
    pub const EYE_BLINK_RIGHT: &str = "eyeBlinkRight";
    pub const EYE_LOOK_DOWN: &str = "eyeLookDownLeft";
    pub const EYE_LOOK_UP: &str = "eyeLookUpLeft";
    pub const MOUTH_SMILE: &str = "mouthSmileLeft";
    pub const MOUTH_FROWN: &str = "mouthFrownLeft";
    pub const BROW_FURROW: &str = "browDownLeft";
    pub const JAW_OPEN: &str = "jawOpen";

    /// Every category the extractor reads
    pub const ALL: [&str; 8] = [
        EYE_BLINK_LEFT,
        EYE_BLINK_RIGHT,
        EYE_LOOK_DOWN,
        EYE_LOOK_UP,
        MOUTH_SMILE,
        MOUTH_FROWN,
        BROW_FURROW,
        JAW_OPEN,
    ];
}

/// A single named blendshape score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blendshape {
    #[serde(alias = "categoryName")]
    pub category_name: String,
    pub score: f64,
}

/// Encoded frame image handed to the classifier (base64 or data URL)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameImage(pub String);

impl FrameImage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One frame as delivered by the capture and landmark collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Capture time of the frame
    pub timestamp: DateTime<Utc>,
    /// Blendshapes per detected face (zero or one face per frame)
    #[serde(default)]
    pub faces: Vec<Vec<Blendshape>>,
    /// Frame image for the classifier, if the producer attached one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<FrameImage>,
}

/// Signals extracted from one frame with a detected face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSignals {
    pub eye_data: EyeData,
    pub expression_data: ExpressionData,
}

/// Extractor for blendshape categories
pub struct FrameSignalExtractor;

impl FrameSignalExtractor {
    /// Extract signals from a frame.
    ///
    /// Returns `None` when no face was detected; that frame produces no
    /// observation record.
    pub fn extract_frame(frame: &LandmarkFrame) -> Option<FrameSignals> {
        frame.faces.first().map(|face| Self::extract(face))
    }

    /// Extract the eight intensities from one face's blendshapes
    pub fn extract(blendshapes: &[Blendshape]) -> FrameSignals {
        let score = |name: &str| category_score(blendshapes, name);

        FrameSignals {
            eye_data: EyeData {
                left_eye_blink: score(categories::EYE_BLINK_LEFT),
                right_eye_blink: score(categories::EYE_BLINK_RIGHT),
                look_down: score(categories::EYE_LOOK_DOWN),
                look_up: score(categories::EYE_LOOK_UP),
            },
            expression_data: ExpressionData {
                mouth_smile: score(categories::MOUTH_SMILE),
                mouth_frown: score(categories::MOUTH_FROWN),
                brow_furrow: score(categories::BROW_FURROW),
                jaw_open: score(categories::JAW_OPEN),
            },
        }
    }
}

/// Score of a category, 0 when absent. Out-of-range or non-finite scores are
/// pulled back into [0, 1].
fn category_score(blendshapes: &[Blendshape], name: &str) -> f64 {
    blendshapes
        .iter()
        .find(|b| b.category_name == name)
        .map(|b| {
            if b.score.is_finite() {
                b.score.clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .unwrap_or(0.0)
}

/// Parse newline-delimited frame JSON, skipping blank lines
pub fn parse_frames_ndjson(input: &str) -> Result<Vec<LandmarkFrame>, EngineError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line.trim()).map_err(|e| {
                EngineError::ParseError(format!("line {}: {}", idx + 1, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shape(name: &str, score: f64) -> Blendshape {
        Blendshape {
            category_name: name.to_string(),
            score,
        }
    }

    #[test]
    fn test_every_category_maps_to_its_field() {
        let shapes: Vec<Blendshape> = categories::ALL
            .iter()
            .enumerate()
            .map(|(i, name)| shape(name, (i as f64 + 1.0) / 10.0))
            .collect();

        let signals = FrameSignalExtractor::extract(&shapes);
        assert_eq!(
            signals.eye_data,
            EyeData {
                left_eye_blink: 0.1,
                right_eye_blink: 0.2,
                look_down: 0.3,
                look_up: 0.4,
            }
        );
        assert_eq!(
            signals.expression_data,
            ExpressionData {
                mouth_smile: 0.5,
                mouth_frown: 0.6,
                brow_furrow: 0.7,
                jaw_open: 0.8,
            }
        );
    }

    #[test]
    fn test_missing_categories_default_to_zero() {
        let shapes = vec![shape("browDownLeft", 0.9), shape("cheekPuff", 0.7)];
        let signals = FrameSignalExtractor::extract(&shapes);

        assert_eq!(signals.expression_data.brow_furrow, 0.9);
        assert_eq!(signals.eye_data, EyeData::default());
        assert_eq!(signals.expression_data.mouth_frown, 0.0);
        assert_eq!(signals.expression_data.jaw_open, 0.0);
    }

    #[test]
    fn test_empty_face_is_all_zero() {
        let signals = FrameSignalExtractor::extract(&[]);
        assert_eq!(signals.eye_data, EyeData::default());
        assert_eq!(signals.expression_data, ExpressionData::default());
    }

    #[test]
    fn test_no_face_yields_nothing() {
        let frame = LandmarkFrame {
            timestamp: Utc::now(),
            faces: vec![],
            image: None,
        };
        assert!(FrameSignalExtractor::extract_frame(&frame).is_none());
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        let shapes = vec![
            shape("eyeBlinkLeft", 1.4),
            shape("eyeBlinkRight", -0.2),
            shape("jawOpen", f64::NAN),
        ];
        let signals = FrameSignalExtractor::extract(&shapes);
        assert_eq!(signals.eye_data.left_eye_blink, 1.0);
        assert_eq!(signals.eye_data.right_eye_blink, 0.0);
        assert_eq!(signals.expression_data.jaw_open, 0.0);
    }

    #[test]
    fn test_parse_frames_accepts_camel_case_categories() {
        let input = r#"
{"timestamp":"2024-01-15T14:00:00Z","faces":[[{"categoryName":"jawOpen","score":0.5}]]}

{"timestamp":"2024-01-15T14:00:01Z","faces":[],"image":"data:image/jpeg;base64,AAAA"}
"#;
        let frames = parse_frames_ndjson(input).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].faces[0][0].category_name, "jawOpen");
        assert_eq!(
            frames[1].image,
            Some(FrameImage("data:image/jpeg;base64,AAAA".to_string()))
        );
    }

    #[test]
    fn test_parse_frames_reports_line() {
        let err = parse_frames_ndjson("{\"timestamp\":\"2024-01-15T14:00:00Z\"}\nnot json")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
