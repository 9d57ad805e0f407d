//! Engine configuration

use crate::error::EngineError;
use crate::live::DEFAULT_ROLLING_WINDOW;
use crate::sampler::{Dispatch, SamplingPolicy, DEFAULT_SAMPLE_EVERY_N};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Classifier connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of the model server; no remote classifier when unset
    pub endpoint: Option<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    pub dispatch: Dispatch,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 5_000,
            dispatch: Dispatch::Background,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Runtime configuration of the scoring engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Classifier cadence: every Nth recorded frame is classified.
    /// Default: 10.
    pub sample_every_n_frames: u32,

    /// Frames in the live rolling-stress window.
    /// Default: 30.
    pub rolling_window_frames: usize,

    /// How long stopping a recording waits for in-flight classifier calls.
    /// Default: 500.
    pub stop_grace_ms: u64,

    pub classifier: ClassifierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_every_n_frames: DEFAULT_SAMPLE_EVERY_N,
            rolling_window_frames: DEFAULT_ROLLING_WINDOW,
            stop_grace_ms: 500,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sample_every_n_frames < 1 {
            return Err(EngineError::Config(format!(
                "sample_every_n_frames must be >= 1, got {}",
                self.sample_every_n_frames
            )));
        }
        if self.rolling_window_frames < 1 {
            return Err(EngineError::Config(format!(
                "rolling_window_frames must be >= 1, got {}",
                self.rolling_window_frames
            )));
        }
        if self.classifier.timeout_ms == 0 {
            return Err(EngineError::Config(
                "classifier.timeout_ms must be > 0".to_string(),
            ));
        }
        if let Some(endpoint) = &self.classifier.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(EngineError::Config(format!(
                    "classifier.endpoint must be an http(s) URL, got {endpoint:?}"
                )));
            }
        }
        Ok(())
    }

    /// Load from a JSON string; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy::every(self.sample_every_n_frames)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
