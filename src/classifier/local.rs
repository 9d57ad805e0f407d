//! In-process classifier backend

use super::{Classifier, ClassifierHealth, ClassifierOutput};
use crate::error::ClassifierError;
use crate::extractor::FrameImage;

type InferenceFn = dyn Fn(&FrameImage) -> Result<ClassifierOutput, ClassifierError> + Send + Sync;

/// Classifier backed by an inference function running in this process.
///
/// The function owns whatever model handle it needs; this type only adapts
/// it to the [`Classifier`] capability.
pub struct LocalClassifier {
    name: String,
    inference: Box<InferenceFn>,
}

impl LocalClassifier {
    pub fn new<F>(name: impl Into<String>, inference: F) -> Self
    where
        F: Fn(&FrameImage) -> Result<ClassifierOutput, ClassifierError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inference: Box::new(inference),
        }
    }
}

impl Classifier for LocalClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn health(&self) -> Result<ClassifierHealth, ClassifierError> {
        Ok(ClassifierHealth {
            status: Some("healthy".to_string()),
            model_loaded: true,
        })
    }

    fn predict(&self, image: &FrameImage) -> Result<ClassifierOutput, ClassifierError> {
        (self.inference)(image)
    }
}
