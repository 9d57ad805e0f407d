//! Transcript analysis boundary
//!
//! The question/answer transcript is analyzed by an external language model.
//! This module owns the transcript shape, the prompt sent to the model, the
//! parsing of its reply, and running the analysis off the caller's thread
//! with an observable outcome.

use crate::error::{AnalysisError, EngineError};
use flume::{Receiver, TryRecvError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One interview question and the subject's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Ordered question/answer transcript of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    pub pairs: Vec<QaPair>,
}

impl Transcript {
    pub fn new(pairs: Vec<QaPair>) -> Self {
        Self { pairs }
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.pairs.push(QaPair {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Render as numbered `Qn:` / `An:` blocks
    pub fn to_text(&self) -> String {
        self.pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| {
                format!(
                    "Q{n}: {}\nA{n}: {}",
                    pair.question.trim(),
                    pair.answer.trim(),
                    n = i + 1
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A contradiction reported by the model, either structured or free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Contradiction {
    Detailed {
        description: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        statements: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<String>,
    },
    Text(String),
}

/// Transcript-derived assessment, reported next to the video score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptAnalysis {
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub deception_indicators: Vec<String>,
    /// 0-1, higher is more credible
    pub credibility_score: f64,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl TranscriptAnalysis {
    fn validate(&self) -> Result<(), AnalysisError> {
        if !self.credibility_score.is_finite() || !(0.0..=1.0).contains(&self.credibility_score) {
            return Err(AnalysisError::Malformed(format!(
                "credibilityScore must be within [0, 1], got {}",
                self.credibility_score
            )));
        }
        Ok(())
    }
}

/// Parse a raw model reply into an analysis.
///
/// Accepts a bare JSON object, one wrapped in a markdown code fence, or one
/// surrounded by prose.
pub fn parse_analysis(raw: &str) -> Result<TranscriptAnalysis, AnalysisError> {
    let body = strip_code_fence(raw.trim());
    let json = extract_json_object(body)
        .ok_or_else(|| AnalysisError::Malformed("no JSON object in model output".to_string()))?;

    let analysis: TranscriptAnalysis =
        serde_json::from_str(json).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    analysis.validate()?;
    Ok(analysis)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Prompt sent to the language model for a transcript
pub fn analysis_prompt(transcript: &Transcript) -> String {
    format!(
        "Analyze the following interview transcript for contradictions between answers \
         and for indicators of deception.\n\n{}\n\n\
         Respond with a single JSON object with the keys \"contradictions\" (array), \
         \"deceptionIndicators\" (array of strings), \"credibilityScore\" (number from 0 to 1), \
         \"sentiment\" (string), \"recommendations\" (array of strings) and \"summary\" (string).",
        transcript.to_text()
    )
}

/// Collaborator that analyzes a whole transcript
pub trait TranscriptAnalyzer: Send + Sync {
    fn analyze(&self, transcript: &Transcript) -> Result<TranscriptAnalysis, AnalysisError>;
}

/// Analyzer backed by a text-completion function (prompt in, raw reply out)
pub struct TextModelAnalyzer<F> {
    complete: F,
}

impl<F> TextModelAnalyzer<F>
where
    F: Fn(&str) -> Result<String, AnalysisError> + Send + Sync,
{
    pub fn new(complete: F) -> Self {
        Self { complete }
    }
}

impl<F> TranscriptAnalyzer for TextModelAnalyzer<F>
where
    F: Fn(&str) -> Result<String, AnalysisError> + Send + Sync,
{
    fn analyze(&self, transcript: &Transcript) -> Result<TranscriptAnalysis, AnalysisError> {
        if transcript.is_empty() {
            return Err(AnalysisError::EmptyTranscript);
        }
        let reply = (self.complete)(&analysis_prompt(transcript))?;
        parse_analysis(&reply)
    }
}

/// Handle to an analysis running on its own thread
pub struct AnalysisTask {
    result_rx: Receiver<Result<TranscriptAnalysis, AnalysisError>>,
    _handle: JoinHandle<()>,
}

impl AnalysisTask {
    /// Block until the analysis finishes
    pub fn wait(self) -> Result<TranscriptAnalysis, AnalysisError> {
        self.result_rx.recv().unwrap_or_else(|_| Err(worker_lost()))
    }

    /// Block up to `timeout`; `None` if the analysis is still running
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Result<TranscriptAnalysis, AnalysisError>> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(flume::RecvTimeoutError::Timeout) => None,
            Err(flume::RecvTimeoutError::Disconnected) => Some(Err(worker_lost())),
        }
    }

    /// Non-blocking poll
    pub fn try_result(&self) -> Option<Result<TranscriptAnalysis, AnalysisError>> {
        match self.result_rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_lost())),
        }
    }
}

fn worker_lost() -> AnalysisError {
    AnalysisError::Failed("analysis worker exited without a result".to_string())
}

/// Run `analyzer` on a background thread
pub fn spawn_analysis(
    analyzer: Arc<dyn TranscriptAnalyzer>,
    transcript: Transcript,
) -> Result<AnalysisTask, EngineError> {
    let (result_tx, result_rx) = flume::bounded(1);

    let handle = thread::Builder::new()
        .name("transcript-analysis".to_string())
        .spawn(move || {
            let result = if transcript.is_empty() {
                Err(AnalysisError::EmptyTranscript)
            } else {
                analyzer.analyze(&transcript)
            };
            if let Err(e) = &result {
                log::warn!("transcript analysis failed: {e}");
            }
            let _ = result_tx.send(result);
        })?;

    Ok(AnalysisTask {
        result_rx,
        _handle: handle,
    })
}
