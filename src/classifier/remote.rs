//! HTTP classifier backend
//!
//! Talks to the model-serving API: `GET /health` and `POST /predict` with a
//! JSON body `{"image": "<base64 or data URL>"}`.

use super::{Classifier, ClassifierHealth, ClassifierOutput};
use crate::error::ClassifierError;
use crate::extractor::FrameImage;
use serde::Deserialize;
use std::time::Duration;

/// Error body returned by the model server on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Classifier reached over HTTP
pub struct RemoteClassifier {
    base_url: String,
    agent: ureq::Agent,
}

impl RemoteClassifier {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:5001`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { base_url, agent }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl Classifier for RemoteClassifier {
    fn name(&self) -> &str {
        "remote"
    }

    fn health(&self) -> Result<ClassifierHealth, ClassifierError> {
        let response = self.agent.get(&self.url("health")).call().map_err(map_ureq_error)?;
        response
            .into_json::<ClassifierHealth>()
            .map_err(|e| ClassifierError::Malformed(format!("health response: {e}")))
    }

    fn predict(&self, image: &FrameImage) -> Result<ClassifierOutput, ClassifierError> {
        let response = self
            .agent
            .post(&self.url("predict"))
            .send_json(serde_json::json!({ "image": image.as_str() }))
            .map_err(map_ureq_error)?;
        response
            .into_json::<ClassifierOutput>()
            .map_err(|e| ClassifierError::Malformed(format!("predict response: {e}")))
    }
}

fn map_ureq_error(err: ureq::Error) -> ClassifierError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_else(|_| "no error body".to_string());
            // The server answers 500 "Model not loaded" when it has no model
            if status == 500 && message.contains("not loaded") {
                ClassifierError::Unavailable(message)
            } else {
                ClassifierError::Status { status, message }
            }
        }
        ureq::Error::Transport(transport) => ClassifierError::Transport(transport.to_string()),
    }
}
