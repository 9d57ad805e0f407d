//! Credence - behavioral-signal aggregation and credibility scoring for recorded interviews
//!
//! Credence turns a live stream of per-frame facial blendshapes into a
//! deterministic end-of-session credibility score: frame signal extraction →
//! stress estimation → sampled expression/authenticity classification →
//! session accumulation → aggregation and scoring.
//!
//! ## Modules
//!
//! - **Live recording**: [`SessionRecorder`] drives one recording at a time and
//!   reports rolling indicators per frame
//! - **Replay**: [`replay_session`] scores a recorded frame log in one call
//! - **Reports**: [`ReportAssembler`] puts the video score next to the
//!   transcript analysis, [`ReportStore`] persists the result

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod live;
pub mod pipeline;
pub mod recorder;
pub mod report;
pub mod sampler;
pub mod series;
pub mod stress;
pub mod transcript;
pub mod types;

pub use aggregator::Aggregator;
pub use classifier::{Classifier, LocalClassifier, RemoteClassifier};
pub use config::EngineConfig;
pub use error::{AnalysisError, ClassifierError, EngineError};
pub use extractor::{FrameSignalExtractor, LandmarkFrame};
pub use live::LiveIndicators;
pub use pipeline::{replay_ndjson, replay_session};
pub use recorder::{CompletedSession, SessionRecorder};
pub use report::{JsonFileStore, MemoryStore, ReportAssembler, ReportStore, SessionReport};
pub use transcript::{spawn_analysis, Transcript, TranscriptAnalysis, TranscriptAnalyzer};
pub use types::{ObservationRecord, SessionSummary, StatusBucket};

/// Engine version recorded in every report
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in every report
pub const PRODUCER_NAME: &str = "credence";
