//! Expression/authenticity classifier collaborator
//!
//! The classifier is an opaque data source. It is reached either in-process
//! ([`LocalClassifier`]) or over HTTP ([`RemoteClassifier`]); both sit behind
//! the [`Classifier`] trait and return the same wire shape, which
//! [`normalize_output`] turns into fixed-label predictions.

pub mod local;
pub mod remote;

pub use local::LocalClassifier;
pub use remote::RemoteClassifier;

use crate::error::ClassifierError;
use crate::extractor::FrameImage;
use crate::types::{
    AuthenticityLabel, ExpressionLabel, FramePredictions, Label, Prediction,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Health report of a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierHealth {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(alias = "modelLoaded")]
    pub model_loaded: bool,
}

/// One axis of raw classifier output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPrediction {
    /// Label reported by the classifier (informational, recomputed on normalize)
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub probabilities: HashMap<String, f64>,
}

/// Raw classifier output for one image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub expression: RawPrediction,
    pub authenticity: RawPrediction,
}

/// Capability shared by every classifier backend
pub trait Classifier: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Probe whether the classifier can serve predictions
    fn health(&self) -> Result<ClassifierHealth, ClassifierError>;

    /// Classify a single frame image
    fn predict(&self, image: &FrameImage) -> Result<ClassifierOutput, ClassifierError>;
}

/// Normalize raw classifier output into fixed-label predictions.
pub fn normalize_output(output: &ClassifierOutput) -> Result<FramePredictions, ClassifierError> {
    Ok(FramePredictions {
        expression: normalize_axis::<ExpressionLabel>("expression", &output.expression)?,
        authenticity: normalize_axis::<AuthenticityLabel>("authenticity", &output.authenticity)?,
    })
}

/// Map one axis onto its fixed label set.
///
/// Unknown keys are ignored and missing labels read as 0. Probabilities are
/// kept as given; the label is always the argmax of the mapping.
fn normalize_axis<L: Label>(
    axis: &str,
    raw: &RawPrediction,
) -> Result<Prediction<L>, ClassifierError> {
    let mut probabilities = BTreeMap::new();
    for (name, &value) in &raw.probabilities {
        let Some(label) = L::from_name(name) else {
            log::debug!("ignoring unknown {axis} label {name:?}");
            continue;
        };
        if !value.is_finite() || value < 0.0 {
            return Err(ClassifierError::Malformed(format!(
                "{axis} probability for {name} is {value}"
            )));
        }
        probabilities.insert(label, value);
    }

    if probabilities.is_empty() {
        return Err(ClassifierError::Malformed(format!(
            "{axis} output carries no known label probabilities"
        )));
    }

    let prediction = Prediction::from_probabilities(probabilities);

    if let Some(reported) = raw.label.as_deref() {
        if L::from_name(reported) != Some(prediction.label) {
            log::warn!(
                "classifier reported {axis} label {reported:?} but argmax is {}",
                prediction.label.as_str()
            );
        }
    }

    Ok(prediction)
}
