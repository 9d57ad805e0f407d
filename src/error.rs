//! Error types for Credence

use thiserror::Error;

/// Errors raised by the scoring engine and the recording controller
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse frame input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No recording is active")]
    NotRecording,

    #[error("A recording is already active (session {0})")]
    AlreadyRecording(String),

    #[error("Frame at {frame} is older than the previous record at {previous}")]
    OutOfOrderFrame { frame: String, previous: String },

    #[error("Report not found for session {0}")]
    ReportNotFound(String),
}

/// Failures of the external expression/authenticity classifier.
///
/// None of these abort the frame pipeline; the sampler turns every one of
/// them into "no prediction for this frame".
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Classifier transport error: {0}")]
    Transport(String),

    #[error("Classifier returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed classifier output: {0}")]
    Malformed(String),
}

/// Failures of the transcript-analysis collaborator.
///
/// Kept apart from [`EngineError`] so a failed analysis never masks or
/// blocks the video-derived summary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("Transcript analysis failed: {0}")]
    Failed(String),

    #[error("Malformed analysis output: {0}")]
    Malformed(String),

    #[error("Transcript is empty")]
    EmptyTranscript,
}
