//! Real-time rolling indicators
//!
//! Cheap per-frame view of the active recording for live display. Nothing
//! here feeds the end-of-session score.

use crate::types::{AuthenticityLabel, ExpressionLabel, FramePredictions};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default rolling window in frames
pub const DEFAULT_ROLLING_WINDOW: usize = 30;

/// Fixed-capacity window of the most recent values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLING_WINDOW)
    }
}

impl RollingWindow {
    /// Create a window holding at most `capacity` values (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value, evicting the oldest once full
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Mean of the values in the window
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        Some(sum / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Snapshot of the live indicators after a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveIndicators {
    /// Records appended so far in this recording
    pub frames_recorded: u64,
    pub last_stress: Option<f64>,
    /// Mean stress over the most recent `window_frames` records
    pub rolling_stress: Option<f64>,
    pub window_frames: usize,
    pub last_expression: Option<ExpressionLabel>,
    pub last_authenticity: Option<AuthenticityLabel>,
    /// Classifier predictions attached so far
    pub predictions_received: u64,
}

/// Running state behind [`LiveIndicators`]
#[derive(Debug, Clone, Default)]
pub struct LiveTracker {
    window: RollingWindow,
    frames_recorded: u64,
    last_stress: Option<f64>,
    last_expression: Option<ExpressionLabel>,
    last_authenticity: Option<AuthenticityLabel>,
    predictions_received: u64,
}

impl LiveTracker {
    pub fn new(window_frames: usize) -> Self {
        Self {
            window: RollingWindow::new(window_frames),
            ..Self::default()
        }
    }

    /// Record a new frame's stress value
    pub fn observe_stress(&mut self, stress: f64) {
        self.frames_recorded += 1;
        self.last_stress = Some(stress);
        self.window.push(stress);
    }

    /// Record classifier output for a frame
    pub fn observe_predictions(&mut self, predictions: &FramePredictions) {
        self.predictions_received += 1;
        self.last_expression = Some(predictions.expression.label);
        self.last_authenticity = Some(predictions.authenticity.label);
    }

    pub fn snapshot(&self) -> LiveIndicators {
        LiveIndicators {
            frames_recorded: self.frames_recorded,
            last_stress: self.last_stress,
            rolling_stress: self.window.mean(),
            window_frames: self.window.capacity(),
            last_expression: self.last_expression,
            last_authenticity: self.last_authenticity,
            predictions_received: self.predictions_received,
        }
    }

    /// Forget everything, keeping the window size
    pub fn reset(&mut self) {
        *self = Self::new(self.window.capacity());
    }
}
