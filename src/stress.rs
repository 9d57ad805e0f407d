//! Stress estimation
//!
//! Per-frame stress indicator derived from blink, brow and mouth blendshapes.

use crate::types::{ExpressionData, EyeData};

/// Weight of the mean eye-blink intensity
pub const BLINK_WEIGHT: f64 = 0.3;
/// Weight of the brow-furrow intensity
pub const BROW_FURROW_WEIGHT: f64 = 0.4;
/// Weight of the mouth-frown intensity
pub const MOUTH_FROWN_WEIGHT: f64 = 0.3;

/// Compute the stress score of one frame
///
/// Formula:
/// ```text
/// Stress = 0.3 * mean(left_eye_blink, right_eye_blink)
///        + 0.4 * brow_furrow
///        + 0.3 * mouth_frown
/// ```
///
/// The weights sum to 1, so inputs in [0, 1] give a result in [0, 1].
pub fn stress(eye: &EyeData, expression: &ExpressionData) -> f64 {
    let blink = (eye.left_eye_blink + eye.right_eye_blink) / 2.0;
    BLINK_WEIGHT * blink
        + BROW_FURROW_WEIGHT * expression.brow_furrow
        + MOUTH_FROWN_WEIGHT * expression.mouth_frown
}
