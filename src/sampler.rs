//! Classifier sampling
//!
//! The external classifier is expensive, so only every Nth recorded frame is
//! sent to it. Record indices are 0-based: with N = 10, records 0, 10, 20, …
//! are sampled.
//!
//! Two dispatch modes exist:
//! - `Inline`: the classifier runs on the frame path and its output is
//!   stored on the record before the record is appended.
//! - `Background`: the record is appended immediately and the job goes to a
//!   single worker thread. Calls are serialized; jobs that queue up while a
//!   call is in flight collapse to the most recent one.

use crate::classifier::{normalize_output, Classifier};
use crate::error::EngineError;
use crate::extractor::FrameImage;
use crate::series::{RecordSlot, SharedSession};
use crate::types::FramePredictions;
use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default sampling cadence
pub const DEFAULT_SAMPLE_EVERY_N: u32 = 10;

/// Fixed-cadence sampling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    every_n: u32,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_SAMPLE_EVERY_N)
    }
}

impl SamplingPolicy {
    /// Sample every `n`th record (`n` below 1 is treated as 1)
    pub fn every(n: u32) -> Self {
        Self { every_n: n.max(1) }
    }

    pub fn every_n(&self) -> u32 {
        self.every_n
    }

    /// Whether the record at 0-based `index` is sampled
    pub fn should_sample(&self, index: u64) -> bool {
        index % u64::from(self.every_n) == 0
    }
}

/// Where classifier calls run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// On the caller's thread, before the record is appended
    Inline,
    /// On a dedicated worker thread, attached to the record afterwards
    #[default]
    Background,
}

/// Outcome of offering a record to the sampler
#[derive(Debug, Clone, PartialEq)]
pub enum SampleDecision {
    /// Not a sampling frame, or no classifier
    Skip,
    /// Classified inline; store on the record
    Classified(FramePredictions),
    /// Classification was attempted inline and failed
    Failed,
    /// Handed to the background worker
    Queued,
}

/// Counter of background jobs not yet finished or dropped
#[derive(Debug, Default)]
struct PendingJobs {
    count: Mutex<usize>,
    settled: Condvar,
}

impl PendingJobs {
    fn add(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn complete(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.settled.notify_all();
        }
    }

    fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .settled
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            count = guard;
        }
        true
    }

    fn current(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ClassifierJob {
    slot: RecordSlot,
    image: FrameImage,
}

struct BackgroundWorker {
    job_tx: Sender<ClassifierJob>,
    pending: Arc<PendingJobs>,
    _thread: JoinHandle<()>,
}

/// Rate-limited front of the classifier
pub struct ClassifierSampler {
    policy: SamplingPolicy,
    classifier: Option<Arc<dyn Classifier>>,
    worker: Option<BackgroundWorker>,
}

impl ClassifierSampler {
    /// Build a sampler, probing classifier health once.
    ///
    /// An unreachable or model-less classifier disables sampling for the
    /// sampler's lifetime; frames keep flowing without predictions.
    pub fn new(
        policy: SamplingPolicy,
        classifier: Option<Arc<dyn Classifier>>,
        dispatch: Dispatch,
        session: SharedSession,
    ) -> Result<Self, EngineError> {
        let classifier = classifier.and_then(probe);

        let worker = match (&classifier, dispatch) {
            (Some(classifier), Dispatch::Background) => {
                Some(spawn_worker(Arc::clone(classifier), session)?)
            }
            _ => None,
        };

        Ok(Self {
            policy,
            classifier,
            worker,
        })
    }

    /// Sampler that never calls a classifier
    pub fn disabled(policy: SamplingPolicy) -> Self {
        Self {
            policy,
            classifier: None,
            worker: None,
        }
    }

    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    /// Whether classifier calls happen on the caller's thread
    pub fn runs_inline(&self) -> bool {
        self.worker.is_none()
    }

    /// Whether a healthy classifier is attached
    pub fn is_available(&self) -> bool {
        self.classifier.is_some()
    }

    /// Offer the record about to occupy `slot`.
    ///
    /// Inline dispatch must be called before the record is appended; the
    /// caller stores the returned predictions on the record. Background
    /// dispatch must be called after the append so the worker finds it.
    pub fn offer(&self, slot: RecordSlot, image: Option<&FrameImage>) -> SampleDecision {
        if !self.policy.should_sample(slot.index as u64) {
            return SampleDecision::Skip;
        }
        let Some(classifier) = &self.classifier else {
            return SampleDecision::Skip;
        };
        let Some(image) = image else {
            log::debug!("sampling frame {} carries no image, skipping classifier", slot.index);
            return SampleDecision::Skip;
        };

        match &self.worker {
            Some(worker) => {
                worker.pending.add();
                let job = ClassifierJob {
                    slot,
                    image: image.clone(),
                };
                if worker.job_tx.send(job).is_err() {
                    worker.pending.complete();
                    log::warn!("classifier worker is gone; frame {} left unclassified", slot.index);
                    return SampleDecision::Failed;
                }
                SampleDecision::Queued
            }
            None => match classify_once(classifier.as_ref(), image) {
                Some(predictions) => SampleDecision::Classified(predictions),
                None => SampleDecision::Failed,
            },
        }
    }

    /// Wait until queued classifier calls finish, up to `timeout`.
    ///
    /// Returns `false` if calls were still in flight at the deadline.
    pub fn settle(&self, timeout: Duration) -> bool {
        match &self.worker {
            Some(worker) => worker.pending.wait_settled(timeout),
            None => true,
        }
    }

    /// Background jobs still queued or running
    pub fn in_flight(&self) -> usize {
        self.worker.as_ref().map_or(0, |w| w.pending.current())
    }
}

fn probe(classifier: Arc<dyn Classifier>) -> Option<Arc<dyn Classifier>> {
    match classifier.health() {
        Ok(health) if health.model_loaded => {
            log::info!("classifier {} ready", classifier.name());
            Some(classifier)
        }
        Ok(_) => {
            log::warn!(
                "classifier {} reports no model loaded; predictions disabled",
                classifier.name()
            );
            None
        }
        Err(e) => {
            log::warn!(
                "classifier {} unavailable ({e}); predictions disabled",
                classifier.name()
            );
            None
        }
    }
}

/// Call the classifier once, turning any failure into "no prediction".
fn classify_once(classifier: &dyn Classifier, image: &FrameImage) -> Option<FramePredictions> {
    let output = match classifier.predict(image) {
        Ok(output) => output,
        Err(e) => {
            log::warn!("classifier {} failed: {e}", classifier.name());
            return None;
        }
    };
    match normalize_output(&output) {
        Ok(predictions) => Some(predictions),
        Err(e) => {
            log::warn!("classifier {} output rejected: {e}", classifier.name());
            None
        }
    }
}

fn spawn_worker(
    classifier: Arc<dyn Classifier>,
    session: SharedSession,
) -> Result<BackgroundWorker, EngineError> {
    let (job_tx, job_rx) = flume::unbounded::<ClassifierJob>();
    let pending = Arc::new(PendingJobs::default());
    let worker_pending = Arc::clone(&pending);

    let thread = std::thread::Builder::new()
        .name("classifier-sampler".into())
        .spawn(move || run_worker(job_rx, classifier, session, worker_pending))?;

    Ok(BackgroundWorker {
        job_tx,
        pending,
        _thread: thread,
    })
}

fn run_worker(
    job_rx: Receiver<ClassifierJob>,
    classifier: Arc<dyn Classifier>,
    session: SharedSession,
    pending: Arc<PendingJobs>,
) {
    log::debug!("classifier worker started");

    while let Ok(job) = job_rx.recv() {
        // Collapse anything queued behind this job to the latest one
        let mut latest = job;
        while let Ok(newer) = job_rx.try_recv() {
            log::debug!(
                "classifier job for frame {} superseded by frame {}",
                latest.slot.index,
                newer.slot.index
            );
            pending.complete();
            latest = newer;
        }

        if session.is_current(latest.slot.generation) {
            if let Some(predictions) = classify_once(classifier.as_ref(), &latest.image) {
                if !session.attach_predictions(latest.slot, predictions) {
                    log::debug!(
                        "discarding prediction for frame {} of a finished recording",
                        latest.slot.index
                    );
                }
            }
        } else {
            log::debug!(
                "skipping classifier job for frame {} of a finished recording",
                latest.slot.index
            );
        }
        pending.complete();
    }

    log::debug!("classifier worker stopped");
}
