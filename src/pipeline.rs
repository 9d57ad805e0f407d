//! One-shot replay
//!
//! Runs a complete recorded frame log through the engine without a live
//! recording: extractor → stress → sampler → series → aggregator. The
//! classifier always runs inline here, so replays are deterministic.

use crate::aggregator::Aggregator;
use crate::classifier::Classifier;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::extractor::{parse_frames_ndjson, LandmarkFrame};
use crate::recorder::observe;
use crate::sampler::{ClassifierSampler, Dispatch, SampleDecision};
use crate::series::SharedSession;
use crate::types::{ObservationRecord, SessionSummary};
use std::sync::Arc;

/// Score a whole recorded session.
///
/// Frames are stably sorted by timestamp first, so a log written slightly
/// out of order still yields capture order.
///
/// # Example
/// ```ignore
/// let frames = parse_frames_ndjson(&std::fs::read_to_string("session.ndjson")?)?;
/// let summary = replay_session(frames, &EngineConfig::default(), None)?;
/// println!("{}", summary.summary_text());
/// ```
pub fn replay_session(
    frames: Vec<LandmarkFrame>,
    config: &EngineConfig,
    classifier: Option<Arc<dyn Classifier>>,
) -> Result<SessionSummary, EngineError> {
    let records = replay_records(frames, config, classifier)?;
    Ok(Aggregator::summarize(&records))
}

/// Score a session given as NDJSON frame lines
pub fn replay_ndjson(
    input: &str,
    config: &EngineConfig,
    classifier: Option<Arc<dyn Classifier>>,
) -> Result<SessionSummary, EngineError> {
    let frames = parse_frames_ndjson(input)?;
    replay_session(frames, config, classifier)
}

/// Build the observation series for a recorded session without scoring it
pub fn replay_records(
    mut frames: Vec<LandmarkFrame>,
    config: &EngineConfig,
    classifier: Option<Arc<dyn Classifier>>,
) -> Result<Vec<ObservationRecord>, EngineError> {
    config.validate()?;
    frames.sort_by_key(|f| f.timestamp);

    let session = SharedSession::new(config.rolling_window_frames);
    let sampler = ClassifierSampler::new(
        config.sampling_policy(),
        classifier,
        Dispatch::Inline,
        session.clone(),
    )?;

    let mut skipped = 0usize;
    for frame in &frames {
        let Some(mut record) = observe(frame) else {
            skipped += 1;
            continue;
        };
        if let SampleDecision::Classified(predictions) =
            sampler.offer(session.next_slot(), frame.image.as_ref())
        {
            record.attach(predictions);
        }
        session.append(record);
    }

    log::debug!(
        "replayed {} frames ({} without a face)",
        frames.len(),
        skipped
    );
    Ok(session.drain())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LocalClassifier;
    use crate::sampler::tests::happy_output;
    use crate::types::{ExpressionLabel, StatusBucket};
    use pretty_assertions::assert_eq;

    fn frame_line(second: u32, face: bool, frown: f64) -> String {
        let faces = if face {
            format!(
                r#"[[{{"categoryName":"mouthFrownLeft","score":{frown}}},{{"categoryName":"browDownLeft","score":0.5}}]]"#
            )
        } else {
            "[]".to_string()
        };
        format!(
            r#"{{"timestamp":"2024-01-15T14:00:{second:02}Z","faces":{faces},"image":"AAAA"}}"#
        )
    }

    fn happy() -> Arc<dyn Classifier> {
        Arc::new(LocalClassifier::new("happy", |_| Ok(happy_output())))
    }

    #[test]
    fn test_replay_samples_records_zero_ten_twenty() {
        let input: Vec<String> = (0..25).map(|s| frame_line(s, true, 0.0)).collect();
        let frames = parse_frames_ndjson(&input.join("\n")).unwrap();

        let records = replay_records(frames, &EngineConfig::default(), Some(happy())).unwrap();
        let sampled: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.expression_prediction.is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(sampled, vec![0, 10, 20]);
        assert!(records
            .iter()
            .all(|r| r.expression_prediction.is_some() == r.authenticity_prediction.is_some()));
    }

    #[test]
    fn test_replay_sorts_frames_by_timestamp() {
        let lines = [frame_line(2, true, 1.0), frame_line(0, true, 0.0), frame_line(1, true, 0.0)];
        let frames = parse_frames_ndjson(&lines.join("\n")).unwrap();
        let records = replay_records(frames, &EngineConfig::default(), None).unwrap();

        let seconds: Vec<u32> = records
            .iter()
            .map(|r| r.timestamp.format("%S").to_string().parse().unwrap())
            .collect();
        assert_eq!(seconds, vec![0, 1, 2]);
        assert!((records[2].stress_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_replay_ndjson_summary() {
        let mut lines: Vec<String> = (0..10).map(|s| frame_line(s, true, 0.0)).collect();
        lines.push(frame_line(10, false, 0.0));
        let summary =
            replay_ndjson(&lines.join("\n"), &EngineConfig::default(), Some(happy())).unwrap();

        assert_eq!(summary.frame_count, 10);
        // stress 0.2 everywhere; authenticity Genuine 0.8; Happy is not penalized
        // 100 - 8 - 6 = 86
        assert!((summary.average_stress - 0.2).abs() < 1e-12);
        assert_eq!(summary.credibility_score, 86);
        assert_eq!(summary.status, StatusBucket::High);
        assert_eq!(
            summary.expression.last.as_ref().map(|p| p.label),
            Some(ExpressionLabel::Happy)
        );
    }

    #[test]
    fn test_empty_log_scores_as_empty_session() {
        let config = EngineConfig::default();
        let empty = replay_ndjson("", &config, Some(happy())).unwrap();
        assert_eq!(empty.frame_count, 0);
        assert_eq!(empty.credibility_score, 100);
        assert_eq!(empty.status, StatusBucket::High);
        assert_eq!(empty.summary_text(), "High credibility (100/100)");

        assert_eq!(replay_ndjson("\n  \n", &config, None).unwrap(), empty);
        let faceless = frame_line(0, false, 0.0);
        assert_eq!(replay_ndjson(&faceless, &config, None).unwrap(), empty);
    }

    #[test]
    fn test_replay_rejects_invalid_config() {
        let config = EngineConfig {
            rolling_window_frames: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            replay_session(Vec::new(), &config, None),
            Err(EngineError::Config(_))
        ));
    }
}
