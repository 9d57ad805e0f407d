//! Session reports
//!
//! A [`SessionReport`] puts the video-derived [`SessionSummary`] and the
//! transcript analysis side by side. The two credibility scores measure
//! different evidence and are never combined into one number.

use crate::error::{AnalysisError, EngineError};
use crate::transcript::TranscriptAnalysis;
use crate::types::SessionSummary;
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Software that produced a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
}

impl Default for Producer {
    fn default() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
        }
    }
}

/// Outcome of the transcript analysis attached to a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TranscriptOutcome {
    Completed { analysis: TranscriptAnalysis },
    Failed { error: String },
}

impl From<Result<TranscriptAnalysis, AnalysisError>> for TranscriptOutcome {
    fn from(result: Result<TranscriptAnalysis, AnalysisError>) -> Self {
        match result {
            Ok(analysis) => TranscriptOutcome::Completed { analysis },
            Err(e) => TranscriptOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Persisted result of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub producer: Producer,
    pub summary: SessionSummary,
    pub summary_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<TranscriptOutcome>,
}

impl SessionReport {
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builds reports from the engine's outputs
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn assemble(
        session_id: Uuid,
        summary: SessionSummary,
        transcript: Option<Result<TranscriptAnalysis, AnalysisError>>,
    ) -> SessionReport {
        SessionReport {
            session_id,
            created_at: Utc::now(),
            producer: Producer::default(),
            summary_text: summary.summary_text(),
            summary,
            transcript: transcript.map(TranscriptOutcome::from),
        }
    }
}

/// Storage for reports, keyed by session id
pub trait ReportStore: Send + Sync {
    fn save(&self, report: &SessionReport) -> Result<(), EngineError>;
    fn load(&self, session_id: Uuid) -> Result<SessionReport, EngineError>;
    fn list(&self) -> Result<Vec<Uuid>, EngineError>;
}

/// One `<session id>.json` file per report in a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

impl ReportStore for JsonFileStore {
    fn save(&self, report: &SessionReport) -> Result<(), EngineError> {
        let path = self.path_for(report.session_id);
        // Write then rename so readers never see a half-written report
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, report.to_json()?)?;
        fs::rename(&tmp, &path)?;
        log::debug!("saved report {}", path.display());
        Ok(())
    }

    fn load(&self, session_id: Uuid) -> Result<SessionReport, EngineError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Err(EngineError::ReportNotFound(session_id.to_string()));
        }
        SessionReport::from_json(&fs::read_to_string(path)?)
    }

    fn list(&self) -> Result<Vec<Uuid>, EngineError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    reports: Mutex<HashMap<Uuid, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryStore {
    fn save(&self, report: &SessionReport) -> Result<(), EngineError> {
        // Stored serialized, so a load goes through the same format as on disk
        let json = report.to_json()?;
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(report.session_id, json);
        Ok(())
    }

    fn load(&self, session_id: Uuid) -> Result<SessionReport, EngineError> {
        let reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        let json = reports
            .get(&session_id)
            .ok_or_else(|| EngineError::ReportNotFound(session_id.to_string()))?;
        SessionReport::from_json(json)
    }

    fn list(&self) -> Result<Vec<Uuid>, EngineError> {
        let mut ids: Vec<Uuid> = self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::extractor::{categories, Blendshape, LandmarkFrame};
    use crate::recorder::observe;
    use crate::series::tests::{predictions, record_at};
    use crate::transcript::parse_analysis;
    use crate::transcript::tests::ANALYSIS_JSON;
    use crate::types::{
        AuthenticityLabel, ExpressionLabel, FramePredictions, Label, Prediction, StatusBucket,
    };
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    /// xorshift64, so every run builds the same sessions
    struct Rng(u64);

    impl Rng {
        fn next_unit(&mut self) -> f64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }

        fn distribution<L: Label>(&mut self) -> BTreeMap<L, f64> {
            let weights: Vec<f64> = L::ALL.iter().map(|_| self.next_unit() + 0.01).collect();
            let total: f64 = weights.iter().sum();
            L::ALL.iter().copied().zip(weights.iter().map(|w| w / total)).collect()
        }
    }

    fn recorded_session(rng: &mut Rng, frames: i64) -> SessionSummary {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
        let mut records = Vec::new();
        for i in 0..frames {
            let face = categories::ALL
                .iter()
                .map(|name| Blendshape {
                    category_name: name.to_string(),
                    score: rng.next_unit(),
                })
                .collect();
            let frame = LandmarkFrame {
                timestamp: start + Duration::milliseconds(33 * i),
                faces: vec![face],
                image: None,
            };
            let Some(mut record) = observe(&frame) else {
                continue;
            };
            if i % 3 == 0 {
                record.attach(FramePredictions {
                    expression: Prediction::from_probabilities(
                        rng.distribution::<ExpressionLabel>(),
                    ),
                    authenticity: Prediction::from_probabilities(
                        rng.distribution::<AuthenticityLabel>(),
                    ),
                });
            }
            records.push(record);
        }
        Aggregator::summarize(&records)
    }

    fn summary() -> SessionSummary {
        let mut records = vec![record_at(0, 0.25), record_at(1, 0.5), record_at(2, 0.75)];
        records[0].attach(predictions(ExpressionLabel::Fear, 0.5));
        records[2].attach(predictions(ExpressionLabel::Happy, 0.75));
        Aggregator::summarize(&records)
    }

    #[test]
    fn test_summary_roundtrip_is_field_for_field() {
        let report = ReportAssembler::assemble(Uuid::new_v4(), summary(), None);
        let restored = SessionReport::from_json(&report.to_json().unwrap()).unwrap();

        assert_eq!(restored.summary, report.summary);
        assert_eq!(restored, report);
    }

    #[test]
    fn test_report_wire_format() {
        let report = ReportAssembler::assemble(
            Uuid::nil(),
            summary(),
            Some(parse_analysis(ANALYSIS_JSON)),
        );
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["sessionId"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(value["producer"]["name"], "credence");
        assert_eq!(value["summary"]["status"], "medium");
        assert!(value["summary"]["averageStress"].is_number());
        assert_eq!(value["transcript"]["status"], "completed");
        assert_eq!(value["transcript"]["analysis"]["credibilityScore"], 0.75);
        assert_eq!(report.summary_text, report.summary.summary_text());
    }

    #[test]
    fn test_failed_analysis_keeps_video_summary() {
        let report = ReportAssembler::assemble(
            Uuid::new_v4(),
            summary(),
            Some(Err(AnalysisError::Malformed("no JSON object in model output".to_string()))),
        );
        assert_eq!(report.summary, summary());
        match &report.transcript {
            Some(TranscriptOutcome::Failed { error }) => assert!(error.contains("no JSON object")),
            other => panic!("expected a failed analysis, got {other:?}"),
        }
        assert_eq!(report.summary.status, StatusBucket::Medium);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        let report = ReportAssembler::assemble(Uuid::new_v4(), summary(), None);
        store.save(&report).unwrap();

        assert_eq!(store.load(report.session_id).unwrap(), report);
        assert_eq!(store.list().unwrap(), vec![report.session_id]);
        assert!(matches!(
            store.load(Uuid::new_v4()),
            Err(EngineError::ReportNotFound(_))
        ));
    }

    #[test]
    fn test_json_file_store() {
        let dir = std::env::temp_dir().join(format!("credence-test-{}", Uuid::new_v4()));
        let store = JsonFileStore::open(&dir).unwrap();

        assert_eq!(store.dir(), dir.as_path());

        let report = ReportAssembler::assemble(
            Uuid::new_v4(),
            summary(),
            Some(parse_analysis(ANALYSIS_JSON)),
        );
        store.save(&report).unwrap();
        assert!(dir.join(format!("{}.json", report.session_id)).exists());

        assert_eq!(store.load(report.session_id).unwrap(), report);
        assert_eq!(store.list().unwrap(), vec![report.session_id]);
        assert!(matches!(
            store.load(Uuid::new_v4()),
            Err(EngineError::ReportNotFound(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_recorded_sessions_read_back_unchanged() {
        let dir = std::env::temp_dir().join(format!("credence-test-{}", Uuid::new_v4()));
        let files = JsonFileStore::open(&dir).unwrap();
        let memory = MemoryStore::new();
        let mut rng = Rng(0x9E37_79B9_7F4A_7C15);

        for round in 0..300 {
            let summary = recorded_session(&mut rng, 2 + round % 40);
            let report = ReportAssembler::assemble(Uuid::new_v4(), summary, None);

            let restored = SessionReport::from_json(&report.to_json().unwrap()).unwrap();
            assert_eq!(restored.summary, report.summary);
            assert_eq!(restored, report);

            memory.save(&report).unwrap();
            assert_eq!(memory.load(report.session_id).unwrap(), report);
            files.save(&report).unwrap();
            assert_eq!(files.load(report.session_id).unwrap(), report);
        }
        assert_eq!(files.list().unwrap().len(), 300);

        fs::remove_dir_all(&dir).unwrap();
    }
}
