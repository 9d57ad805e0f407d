//! Session accumulation
//!
//! [`SessionSeries`] is the append-only record sequence of one recording.
//! [`SharedSession`] wraps it behind a lock together with a generation
//! counter, so classifier results that arrive after a drain can be told
//! apart from results for the current recording.

use crate::live::{LiveIndicators, LiveTracker};
use crate::types::{FramePredictions, ObservationRecord};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Ordered, append-only sequence of observation records
#[derive(Debug, Clone, Default)]
pub struct SessionSeries {
    records: Vec<ObservationRecord>,
}

impl SessionSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning its index
    pub fn append(&mut self, record: ObservationRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Take every record and leave the series empty
    pub fn drain(&mut self) -> Vec<ObservationRecord> {
        std::mem::take(&mut self.records)
    }

    /// Attach classifier output to the record at `index`
    pub fn attach(&mut self, index: usize, predictions: FramePredictions) -> bool {
        match self.records.get_mut(index) {
            Some(record) => {
                record.attach(predictions);
                true
            }
            None => false,
        }
    }

    pub fn records(&self) -> &[ObservationRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&ObservationRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Position of a record within a specific recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSlot {
    pub generation: u64,
    pub index: usize,
}

#[derive(Debug)]
struct SessionState {
    generation: u64,
    series: SessionSeries,
    live: LiveTracker,
}

/// Lock-guarded series shared between the frame loop and the classifier worker
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedSession {
    pub fn new(rolling_window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                generation: 0,
                series: SessionSeries::new(),
                live: LiveTracker::new(rolling_window),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record to the current recording
    pub fn append(&self, record: ObservationRecord) -> (RecordSlot, LiveIndicators) {
        let mut state = self.lock();
        let stress = record.stress_score;
        let predictions = match (&record.expression_prediction, &record.authenticity_prediction) {
            (Some(expression), Some(authenticity)) => Some(FramePredictions {
                expression: expression.clone(),
                authenticity: authenticity.clone(),
            }),
            _ => None,
        };

        let index = state.series.append(record);
        state.live.observe_stress(stress);
        if let Some(predictions) = predictions {
            state.live.observe_predictions(&predictions);
        }

        let slot = RecordSlot {
            generation: state.generation,
            index,
        };
        (slot, state.live.snapshot())
    }

    /// Slot the next appended record will occupy
    pub fn next_slot(&self) -> RecordSlot {
        let state = self.lock();
        RecordSlot {
            generation: state.generation,
            index: state.series.len(),
        }
    }

    /// Attach predictions to a record if its recording has not been drained.
    ///
    /// Returns `false` when the slot is stale; the predictions are dropped.
    pub fn attach_predictions(&self, slot: RecordSlot, predictions: FramePredictions) -> bool {
        let mut state = self.lock();
        if state.generation != slot.generation {
            return false;
        }
        state.live.observe_predictions(&predictions);
        state.series.attach(slot.index, predictions)
    }

    /// Hand over the whole series and start a new generation
    pub fn drain(&self) -> Vec<ObservationRecord> {
        let mut state = self.lock();
        state.generation += 1;
        state.live.reset();
        state.series.drain()
    }

    /// Whether records of `generation` are still accepted
    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn live(&self) -> LiveIndicators {
        self.lock().live.snapshot()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.lock().series.last().map(|r| r.timestamp)
    }

    pub fn len(&self) -> usize {
        self.lock().series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().series.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{
        AuthenticityLabel, ExpressionData, ExpressionLabel, EyeData, Prediction,
    };
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    pub(crate) fn record_at(second: i64, stress: f64) -> ObservationRecord {
        ObservationRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
                + Duration::seconds(second),
            eye_data: EyeData::default(),
            expression_data: ExpressionData::default(),
            stress_score: stress,
            expression_prediction: None,
            authenticity_prediction: None,
        }
    }

    pub(crate) fn predictions(expression: ExpressionLabel, genuine: f64) -> FramePredictions {
        let mut expr = BTreeMap::new();
        expr.insert(expression, 1.0);
        let mut auth = BTreeMap::new();
        auth.insert(AuthenticityLabel::Fake, 1.0 - genuine);
        auth.insert(AuthenticityLabel::Genuine, genuine);
        FramePredictions {
            expression: Prediction::from_probabilities(expr),
            authenticity: Prediction::from_probabilities(auth),
        }
    }

    #[test]
    fn test_series_preserves_order_and_drains() {
        let mut series = SessionSeries::new();
        for i in 0..5 {
            assert_eq!(series.append(record_at(i, 0.1 * i as f64)), i as usize);
        }
        assert_eq!(series.len(), 5);

        let drained = series.drain();
        assert!(series.is_empty());
        let seconds: Vec<i64> = drained.iter().map(|r| r.timestamp.timestamp() % 60).collect();
        assert_eq!(seconds, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_series_attach_out_of_range() {
        let mut series = SessionSeries::new();
        series.append(record_at(0, 0.0));
        assert!(series.attach(0, predictions(ExpressionLabel::Happy, 0.9)));
        assert!(!series.attach(3, predictions(ExpressionLabel::Happy, 0.9)));
        assert!(series.records()[0].expression_prediction.is_some());
    }

    #[test]
    fn test_shared_session_rejects_stale_attach() {
        let session = SharedSession::new(10);
        let (slot, _) = session.append(record_at(0, 0.5));
        assert_eq!(slot, RecordSlot { generation: 0, index: 0 });

        let drained = session.drain();
        assert_eq!(drained.len(), 1);
        assert!(!session.is_current(slot.generation));

        // Late prediction for the drained recording must not land anywhere
        assert!(!session.attach_predictions(slot, predictions(ExpressionLabel::Sad, 0.1)));
        assert!(session.is_empty());

        let (next, _) = session.append(record_at(1, 0.5));
        assert_eq!(next, RecordSlot { generation: 1, index: 0 });
        assert!(!session.attach_predictions(slot, predictions(ExpressionLabel::Sad, 0.1)));
        assert!(session.drain()[0].expression_prediction.is_none());
    }

    #[test]
    fn test_shared_session_live_indicators() {
        let session = SharedSession::new(2);
        session.append(record_at(0, 0.2));
        let (slot, live) = session.append(record_at(1, 0.4));
        assert_eq!(live.frames_recorded, 2);
        assert!((live.rolling_stress.unwrap() - 0.3).abs() < 1e-12);

        assert!(session.attach_predictions(slot, predictions(ExpressionLabel::Fear, 0.3)));
        let live = session.live();
        assert_eq!(live.last_expression, Some(ExpressionLabel::Fear));
        assert_eq!(live.last_authenticity, Some(AuthenticityLabel::Fake));
        assert_eq!(live.predictions_received, 1);

        session.drain();
        assert_eq!(session.live().frames_recorded, 0);
        assert_eq!(session.last_timestamp(), None);
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let session = SharedSession::new(5);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let session = session.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        session.append(record_at(t * 100 + i, 0.1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(session.len(), 200);
        assert_eq!(session.drain().len(), 200);
        assert_eq!(session.generation(), 1);
    }
}
