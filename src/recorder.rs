//! Recording controller
//!
//! [`SessionRecorder`] owns one [`SharedSession`] and the classifier sampler
//! for it. A recording runs from [`SessionRecorder::start`] to
//! [`SessionRecorder::stop`]; in between every frame goes through
//! extractor → stress → sampler → series.

use crate::aggregator::Aggregator;
use crate::classifier::{Classifier, RemoteClassifier};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::extractor::{FrameSignalExtractor, LandmarkFrame};
use crate::live::LiveIndicators;
use crate::sampler::{ClassifierSampler, SampleDecision};
use crate::series::SharedSession;
use crate::stress::stress;
use crate::types::{ObservationRecord, SessionSummary};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Result of stopping a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub summary: SessionSummary,
    /// Classifier jobs still running when the series was drained
    pub abandoned_classifier_jobs: usize,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRecording {
    session_id: Uuid,
    started_at: DateTime<Utc>,
}

/// Build the remote classifier named by the config, if any
pub fn classifier_from_config(config: &EngineConfig) -> Option<Arc<dyn Classifier>> {
    config.classifier.endpoint.as_ref().map(|endpoint| {
        Arc::new(RemoteClassifier::new(endpoint.as_str(), config.classifier.timeout()))
            as Arc<dyn Classifier>
    })
}

/// Turn a frame into an unclassified record; `None` when no face was detected
pub(crate) fn observe(frame: &LandmarkFrame) -> Option<ObservationRecord> {
    let signals = FrameSignalExtractor::extract_frame(frame)?;
    Some(ObservationRecord {
        timestamp: frame.timestamp,
        eye_data: signals.eye_data,
        expression_data: signals.expression_data,
        stress_score: stress(&signals.eye_data, &signals.expression_data),
        expression_prediction: None,
        authenticity_prediction: None,
    })
}

/// Drives recordings for one capture source
pub struct SessionRecorder {
    config: EngineConfig,
    session: SharedSession,
    sampler: ClassifierSampler,
    active: Option<ActiveRecording>,
}

impl SessionRecorder {
    /// Create a recorder. The classifier is health-checked once here.
    pub fn new(
        config: EngineConfig,
        classifier: Option<Arc<dyn Classifier>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let session = SharedSession::new(config.rolling_window_frames);
        let sampler = ClassifierSampler::new(
            config.sampling_policy(),
            classifier,
            config.classifier.dispatch,
            session.clone(),
        )?;

        Ok(Self {
            config,
            session,
            sampler,
            active: None,
        })
    }

    /// Create a recorder using the classifier endpoint from the config
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let classifier = classifier_from_config(&config);
        Self::new(config, classifier)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Whether classifier predictions will be collected
    pub fn classifier_available(&self) -> bool {
        self.sampler.is_available()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.active.map(|a| a.session_id)
    }

    /// Begin a new recording
    pub fn start(&mut self) -> Result<Uuid, EngineError> {
        if let Some(active) = &self.active {
            return Err(EngineError::AlreadyRecording(active.session_id.to_string()));
        }

        // Anything left from an aborted recording must not leak into this one
        let stale = self.session.drain();
        if !stale.is_empty() {
            log::warn!("discarding {} records left from a previous recording", stale.len());
        }

        let active = ActiveRecording {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        self.active = Some(active);
        log::info!(
            "recording {} started (sampling every {} frames, classifier {})",
            active.session_id,
            self.sampler.policy().every_n(),
            if self.sampler.is_available() { "available" } else { "unavailable" }
        );
        Ok(active.session_id)
    }

    /// Process one captured frame.
    ///
    /// Returns `Ok(None)` for frames without a detected face; nothing is
    /// recorded for them.
    pub fn process_frame(
        &mut self,
        frame: &LandmarkFrame,
    ) -> Result<Option<LiveIndicators>, EngineError> {
        if self.active.is_none() {
            return Err(EngineError::NotRecording);
        }

        let Some(mut record) = observe(frame) else {
            return Ok(None);
        };

        if let Some(previous) = self.session.last_timestamp() {
            if frame.timestamp < previous {
                return Err(EngineError::OutOfOrderFrame {
                    frame: frame.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    previous: previous.to_rfc3339_opts(SecondsFormat::Millis, true),
                });
            }
        }

        let live = if self.sampler.runs_inline() {
            let slot = self.session.next_slot();
            if let SampleDecision::Classified(predictions) =
                self.sampler.offer(slot, frame.image.as_ref())
            {
                record.attach(predictions);
            }
            self.session.append(record).1
        } else {
            let (slot, live) = self.session.append(record);
            self.sampler.offer(slot, frame.image.as_ref());
            live
        };

        Ok(Some(live))
    }

    /// Live indicators of the current recording
    pub fn live(&self) -> LiveIndicators {
        self.session.live()
    }

    /// Stop the recording, drain the series once and score it.
    ///
    /// Classifier calls still running after the configured grace period are
    /// abandoned; their results are discarded when they arrive.
    pub fn stop(&mut self) -> Result<CompletedSession, EngineError> {
        let active = self.active.take().ok_or(EngineError::NotRecording)?;

        let mut abandoned = 0;
        if !self.sampler.settle(self.config.stop_grace()) {
            abandoned = self.sampler.in_flight();
            log::warn!(
                "recording {}: {} classifier job(s) still in flight at stop, results will be discarded",
                active.session_id,
                abandoned
            );
        }

        let records = self.session.drain();
        let summary = Aggregator::summarize(&records);
        let stopped_at = Utc::now();

        log::info!(
            "recording {} stopped after {} frames: {}",
            active.session_id,
            summary.frame_count,
            summary.summary_text()
        );

        Ok(CompletedSession {
            session_id: active.session_id,
            started_at: active.started_at,
            stopped_at,
            summary,
            abandoned_classifier_jobs: abandoned,
        })
    }
}
