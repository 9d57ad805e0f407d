//! Core data types
//!
//! Observation records, classifier predictions and the session summary that
//! flow through the scoring pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A fixed, ordered label set produced by one classifier axis.
///
/// `ALL` is the enumeration order used for every argmax tie-break: the first
/// label holding the maximum wins.
pub trait Label: Copy + Ord + fmt::Debug + Send + Sync + 'static {
    /// Every label of the axis, in enumeration order
    const ALL: &'static [Self];

    /// Wire name of the label
    fn as_str(self) -> &'static str;

    /// Look up a label by wire name (ASCII case-insensitive)
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// Facial expression categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExpressionLabel {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl ExpressionLabel {
    /// Whether the expression counts against credibility
    pub fn is_negative(self) -> bool {
        matches!(
            self,
            ExpressionLabel::Angry
                | ExpressionLabel::Disgust
                | ExpressionLabel::Fear
                | ExpressionLabel::Sad
        )
    }
}

impl Label for ExpressionLabel {
    const ALL: &'static [Self] = &[
        ExpressionLabel::Angry,
        ExpressionLabel::Disgust,
        ExpressionLabel::Fear,
        ExpressionLabel::Happy,
        ExpressionLabel::Neutral,
        ExpressionLabel::Sad,
        ExpressionLabel::Surprise,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ExpressionLabel::Angry => "Angry",
            ExpressionLabel::Disgust => "Disgust",
            ExpressionLabel::Fear => "Fear",
            ExpressionLabel::Happy => "Happy",
            ExpressionLabel::Neutral => "Neutral",
            ExpressionLabel::Sad => "Sad",
            ExpressionLabel::Surprise => "Surprise",
        }
    }
}

/// Expression authenticity categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuthenticityLabel {
    Fake,
    Genuine,
}

impl Label for AuthenticityLabel {
    const ALL: &'static [Self] = &[AuthenticityLabel::Fake, AuthenticityLabel::Genuine];

    fn as_str(self) -> &'static str {
        match self {
            AuthenticityLabel::Fake => "Fake",
            AuthenticityLabel::Genuine => "Genuine",
        }
    }
}

/// Pick the label with the highest value, first in enumeration order on ties.
pub fn argmax<L: Label>(value_of: impl Fn(L) -> f64) -> (L, f64) {
    let mut best = L::ALL[0];
    let mut best_value = value_of(best);
    for &label in &L::ALL[1..] {
        let value = value_of(label);
        if value > best_value {
            best = label;
            best_value = value;
        }
    }
    (best, best_value)
}

/// One classifier axis output for a single frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "L: Serialize + Ord",
    deserialize = "L: Deserialize<'de> + Ord"
))]
pub struct Prediction<L> {
    /// Argmax of `probabilities`
    pub label: L,
    /// Probability of `label`
    pub confidence: f64,
    /// Per-label probability as returned by the classifier
    pub probabilities: BTreeMap<L, f64>,
}

impl<L: Label> Prediction<L> {
    /// Build a prediction whose label is the argmax of the given mapping.
    pub fn from_probabilities(probabilities: BTreeMap<L, f64>) -> Self {
        let (label, confidence) =
            argmax::<L>(|l| probabilities.get(&l).copied().unwrap_or(0.0));
        Self {
            label,
            confidence,
            probabilities,
        }
    }

    /// Probability of a label, 0 when the classifier did not report it
    pub fn probability(&self, label: L) -> f64 {
        self.probabilities.get(&label).copied().unwrap_or(0.0)
    }
}

pub type ExpressionPrediction = Prediction<ExpressionLabel>;
pub type AuthenticityPrediction = Prediction<AuthenticityLabel>;

/// Normalized classifier output for one sampled frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePredictions {
    pub expression: ExpressionPrediction,
    pub authenticity: AuthenticityPrediction,
}

/// Eye-region blendshape intensities (0-1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeData {
    pub left_eye_blink: f64,
    pub right_eye_blink: f64,
    pub look_down: f64,
    pub look_up: f64,
}

/// Mouth and brow blendshape intensities (0-1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionData {
    pub mouth_smile: f64,
    pub mouth_frown: f64,
    pub brow_furrow: f64,
    pub jaw_open: f64,
}

/// Derived behavioral signals for one recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    /// Capture time of the frame
    pub timestamp: DateTime<Utc>,
    pub eye_data: EyeData,
    pub expression_data: ExpressionData,
    /// Stress estimate in [0, 1]
    pub stress_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_prediction: Option<ExpressionPrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticity_prediction: Option<AuthenticityPrediction>,
}

impl ObservationRecord {
    /// Attach classifier output to this record
    pub fn attach(&mut self, predictions: FramePredictions) {
        self.expression_prediction = Some(predictions.expression);
        self.authenticity_prediction = Some(predictions.authenticity);
    }
}

/// Mean per-label probability over every record carrying a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "L: Serialize + Ord",
    deserialize = "L: Deserialize<'de> + Ord"
))]
pub struct LabelAggregate<L> {
    /// Argmax of the mean probabilities
    pub label: L,
    /// Mean probability of `label`
    pub probability: f64,
    /// Mean probability of every label in the axis
    pub mean_probabilities: BTreeMap<L, f64>,
    /// Number of predictions averaged
    pub samples: usize,
}

impl<L: Label> LabelAggregate<L> {
    /// Mean probability of a label (0 if the label never appeared)
    pub fn mean_probability(&self, label: L) -> f64 {
        self.mean_probabilities.get(&label).copied().unwrap_or(0.0)
    }
}

/// Last and session-average view of one classifier axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "L: Serialize + Ord",
    deserialize = "L: Deserialize<'de> + Ord"
))]
pub struct AxisSummary<L> {
    /// Prediction of the chronologically last record carrying one
    pub last: Option<Prediction<L>>,
    pub average: Option<LabelAggregate<L>>,
}

impl<L> Default for AxisSummary<L> {
    fn default() -> Self {
        Self {
            last: None,
            average: None,
        }
    }
}

/// Coarse credibility bucket for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBucket {
    High,
    Medium,
    Low,
}

impl StatusBucket {
    /// Bucket a 0-100 credibility score
    pub fn from_score(score: u8) -> Self {
        if score < 40 {
            StatusBucket::Low
        } else if score < 70 {
            StatusBucket::Medium
        } else {
            StatusBucket::High
        }
    }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusBucket::High => "High",
            StatusBucket::Medium => "Medium",
            StatusBucket::Low => "Low",
        };
        f.write_str(name)
    }
}

/// End-of-session reduction of a drained series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub average_stress: f64,
    pub max_stress: f64,
    pub min_stress: f64,
    pub expression: AxisSummary<ExpressionLabel>,
    pub authenticity: AxisSummary<AuthenticityLabel>,
    /// 0-100, higher is more credible
    pub credibility_score: u8,
    pub status: StatusBucket,
    /// Number of records the summary was computed from
    #[serde(default)]
    pub frame_count: usize,
}

impl SessionSummary {
    /// Human-readable one-liner, e.g. "High credibility (82/100)"
    pub fn summary_text(&self) -> String {
        format!("{} credibility ({}/100)", self.status, self.credibility_score)
    }
}
