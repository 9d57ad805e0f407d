//! Session aggregation and credibility scoring
//!
//! Reduces a drained series into a [`SessionSummary`]. The arithmetic here
//! is a compatibility contract: identical records must always produce an
//! identical score.

use crate::types::{
    argmax, AuthenticityLabel, AxisSummary, ExpressionLabel, Label, LabelAggregate,
    ObservationRecord, Prediction, SessionSummary, StatusBucket,
};
use std::collections::BTreeMap;

/// Points removed per unit of mean stress
pub const STRESS_PENALTY: f64 = 40.0;
/// Points removed per unit of mean non-genuine probability
pub const AUTHENTICITY_PENALTY: f64 = 30.0;
/// Points removed per unit of mean probability of a negative dominant expression
pub const NEGATIVE_EXPRESSION_PENALTY: f64 = 30.0;

/// Stress statistics over a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// End-of-session reducer
pub struct Aggregator;

impl Aggregator {
    /// Summarize a drained series. An empty series yields a zeroed summary
    /// with a score of 100.
    pub fn summarize(records: &[ObservationRecord]) -> SessionSummary {
        // Step 1: stress statistics
        let stress = stress_stats(records);

        // Step 2: expression axis
        let expression_predictions: Vec<&Prediction<ExpressionLabel>> = records
            .iter()
            .filter_map(|r| r.expression_prediction.as_ref())
            .collect();
        let expression = AxisSummary {
            last: expression_predictions.last().map(|p| (*p).clone()),
            average: aggregate_axis(&expression_predictions),
        };

        // Step 3: authenticity axis
        let authenticity_predictions: Vec<&Prediction<AuthenticityLabel>> = records
            .iter()
            .filter_map(|r| r.authenticity_prediction.as_ref())
            .collect();
        let authenticity = AxisSummary {
            last: authenticity_predictions.last().map(|p| (*p).clone()),
            average: aggregate_axis(&authenticity_predictions),
        };

        // Step 4: credibility score
        let credibility_score = credibility_score(
            stress.average,
            expression.average.as_ref(),
            authenticity.average.as_ref(),
        );

        // Step 5: status bucket
        let status = StatusBucket::from_score(credibility_score);

        SessionSummary {
            average_stress: stress.average,
            max_stress: stress.max,
            min_stress: stress.min,
            expression,
            authenticity,
            credibility_score,
            status,
            frame_count: records.len(),
        }
    }
}

/// Mean, min and max stress; all 0 for an empty series.
///
/// The mean is kept inside [min, max] so summation rounding can never push
/// it past the extremes.
pub fn stress_stats(records: &[ObservationRecord]) -> StressStats {
    if records.is_empty() {
        return StressStats {
            average: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }

    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for record in records {
        sum += record.stress_score;
        min = min.min(record.stress_score);
        max = max.max(record.stress_score);
    }
    let mut average = sum / records.len() as f64;
    if min <= max {
        average = average.clamp(min, max);
    }

    StressStats { average, min, max }
}

/// Mean probability per label across predictions, with the argmax label.
///
/// A label a prediction did not report counts as 0 for that prediction.
/// Ties resolve to the earlier label in enumeration order.
pub fn aggregate_axis<L: Label>(predictions: &[&Prediction<L>]) -> Option<LabelAggregate<L>> {
    if predictions.is_empty() {
        return None;
    }

    let count = predictions.len() as f64;
    let mean_probabilities: BTreeMap<L, f64> = L::ALL
        .iter()
        .map(|&label| {
            let sum: f64 = predictions.iter().map(|p| p.probability(label)).sum();
            (label, sum / count)
        })
        .collect();

    let (label, probability) =
        argmax::<L>(|l| mean_probabilities.get(&l).copied().unwrap_or(0.0));

    Some(LabelAggregate {
        label,
        probability,
        mean_probabilities,
        samples: predictions.len(),
    })
}

/// Credibility score in [0, 100]
///
/// Formula:
/// ```text
/// Score = 100
///       - 40 * average_stress
///       - 30 * (1 - mean(Genuine))             if authenticity was observed
///       - 30 * mean(dominant expression)       if it is Angry/Disgust/Fear/Sad
/// ```
/// clamped to [0, 100] and rounded to the nearest integer.
pub fn credibility_score(
    average_stress: f64,
    expression: Option<&LabelAggregate<ExpressionLabel>>,
    authenticity: Option<&LabelAggregate<AuthenticityLabel>>,
) -> u8 {
    let mut score = 100.0;

    score -= average_stress * STRESS_PENALTY;

    if let Some(authenticity) = authenticity {
        let genuine = authenticity.mean_probability(AuthenticityLabel::Genuine);
        score -= (1.0 - genuine) * AUTHENTICITY_PENALTY;
    }

    if let Some(expression) = expression {
        if expression.label.is_negative() {
            score -= expression.probability * NEGATIVE_EXPRESSION_PENALTY;
        }
    }

    if score.is_nan() {
        return 0;
    }
    score.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::tests::record_at;
    use crate::types::FramePredictions;
    use pretty_assertions::assert_eq;

    fn expression(probs: &[(ExpressionLabel, f64)]) -> Prediction<ExpressionLabel> {
        Prediction::from_probabilities(probs.iter().copied().collect())
    }

    fn authenticity(genuine: f64) -> Prediction<AuthenticityLabel> {
        Prediction::from_probabilities(
            [
                (AuthenticityLabel::Fake, 1.0 - genuine),
                (AuthenticityLabel::Genuine, genuine),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn with_predictions(
        mut record: ObservationRecord,
        expr: Prediction<ExpressionLabel>,
        genuine: f64,
    ) -> ObservationRecord {
        record.attach(FramePredictions {
            expression: expr,
            authenticity: authenticity(genuine),
        });
        record
    }

    #[test]
    fn test_empty_series_is_fully_credible() {
        let summary = Aggregator::summarize(&[]);

        assert_eq!(summary.average_stress, 0.0);
        assert_eq!(summary.min_stress, 0.0);
        assert_eq!(summary.max_stress, 0.0);
        assert_eq!(summary.expression, AxisSummary::default());
        assert_eq!(summary.authenticity, AxisSummary::default());
        assert_eq!(summary.credibility_score, 100);
        assert_eq!(summary.status, StatusBucket::High);
        assert_eq!(summary.frame_count, 0);
        assert_eq!(summary.summary_text(), "High credibility (100/100)");
    }

    #[test]
    fn test_fully_genuine_calm_session_scores_100() {
        let records: Vec<ObservationRecord> = (0..5)
            .map(|i| {
                let mut record = record_at(i, 0.0);
                record.authenticity_prediction = Some(authenticity(1.0));
                record
            })
            .collect();

        let summary = Aggregator::summarize(&records);
        assert!(summary.expression.average.is_none());
        assert_eq!(summary.credibility_score, 100);
        assert_eq!(summary.status, StatusBucket::High);
    }

    #[test]
    fn test_maximum_stress_alone_scores_60() {
        let records: Vec<ObservationRecord> = (0..8).map(|i| record_at(i, 1.0)).collect();
        let summary = Aggregator::summarize(&records);

        assert_eq!(summary.average_stress, 1.0);
        assert_eq!(summary.credibility_score, 60);
        assert_eq!(summary.status, StatusBucket::Medium);
        assert_eq!(summary.summary_text(), "Medium credibility (60/100)");
    }

    #[test]
    fn test_full_scoring_path() {
        let sad = expression(&[(ExpressionLabel::Sad, 0.75), (ExpressionLabel::Neutral, 0.25)]);
        let records = vec![
            with_predictions(record_at(0, 0.25), sad.clone(), 0.75),
            record_at(1, 0.5),
            with_predictions(record_at(2, 0.75), sad, 0.25),
        ];

        let summary = Aggregator::summarize(&records);
        // 100 - 0.5*40 - (1-0.5)*30 - 0.75*30 = 42.5 → 43
        assert_eq!(summary.average_stress, 0.5);
        assert_eq!(summary.min_stress, 0.25);
        assert_eq!(summary.max_stress, 0.75);
        assert_eq!(summary.credibility_score, 43);
        assert_eq!(summary.status, StatusBucket::Medium);

        let expr = summary.expression.average.as_ref().unwrap();
        assert_eq!(expr.label, ExpressionLabel::Sad);
        assert_eq!(expr.probability, 0.75);
        assert_eq!(expr.samples, 2);
        assert_eq!(expr.mean_probabilities.len(), 7);
        assert_eq!(expr.mean_probability(ExpressionLabel::Happy), 0.0);

        let auth = summary.authenticity.average.as_ref().unwrap();
        assert_eq!(auth.mean_probability(AuthenticityLabel::Genuine), 0.5);
        // Fake/Genuine tie goes to Fake
        assert_eq!(auth.label, AuthenticityLabel::Fake);
    }

    #[test]
    fn test_last_prediction_is_chronologically_last() {
        let records = vec![
            with_predictions(
                record_at(0, 0.1),
                expression(&[(ExpressionLabel::Happy, 1.0)]),
                0.9,
            ),
            with_predictions(
                record_at(1, 0.1),
                expression(&[(ExpressionLabel::Fear, 1.0)]),
                0.2,
            ),
            record_at(2, 0.1),
        ];
        let summary = Aggregator::summarize(&records);

        assert_eq!(summary.expression.last.unwrap().label, ExpressionLabel::Fear);
        assert_eq!(summary.authenticity.last.unwrap().label, AuthenticityLabel::Fake);
    }

    #[test]
    fn test_expression_tie_breaks_by_enumeration_order() {
        let records = vec![
            with_predictions(
                record_at(0, 0.0),
                expression(&[(ExpressionLabel::Sad, 0.75), (ExpressionLabel::Neutral, 0.25)]),
                1.0,
            ),
            with_predictions(
                record_at(1, 0.0),
                expression(&[(ExpressionLabel::Sad, 0.25), (ExpressionLabel::Neutral, 0.75)]),
                1.0,
            ),
        ];

        for _ in 0..3 {
            let summary = Aggregator::summarize(&records);
            let expr = summary.expression.average.unwrap();
            // Neutral precedes Sad, so the tie is not a negative expression
            assert_eq!(expr.label, ExpressionLabel::Neutral);
            assert_eq!(summary.credibility_score, 100);
        }
    }

    #[test]
    fn test_positive_expression_is_not_penalized() {
        let records = vec![with_predictions(
            record_at(0, 0.0),
            expression(&[(ExpressionLabel::Happy, 1.0)]),
            1.0,
        )];
        assert_eq!(Aggregator::summarize(&records).credibility_score, 100);
    }

    #[test]
    fn test_score_is_clamped_at_zero() {
        let records = vec![with_predictions(
            record_at(0, 1.0),
            expression(&[(ExpressionLabel::Angry, 1.0)]),
            0.0,
        )];
        // 100 - 40 - 30 - 30 = 0
        let summary = Aggregator::summarize(&records);
        assert_eq!(summary.credibility_score, 0);
        assert_eq!(summary.status, StatusBucket::Low);
    }

    #[test]
    fn test_mean_stays_between_extremes() {
        let records: Vec<ObservationRecord> = (0..3).map(|i| record_at(i, 0.1)).collect();
        let stats = stress_stats(&records);
        assert!(stats.min <= stats.average && stats.average <= stats.max);
        assert_eq!(stats.average, 0.1);

        let varied: Vec<ObservationRecord> = [0.9, 0.05, 0.33, 0.71, 0.2]
            .iter()
            .enumerate()
            .map(|(i, &s)| record_at(i as i64, s))
            .collect();
        let stats = stress_stats(&varied);
        assert_eq!(stats.min, 0.05);
        assert_eq!(stats.max, 0.9);
        assert!(stats.min <= stats.average && stats.average <= stats.max);
    }

    #[test]
    fn test_aggregate_axis_missing_labels_count_as_zero() {
        let a = expression(&[(ExpressionLabel::Happy, 1.0)]);
        let b = expression(&[(ExpressionLabel::Surprise, 0.5)]);
        let aggregate = aggregate_axis(&[&a, &b]).unwrap();

        assert_eq!(aggregate.mean_probability(ExpressionLabel::Happy), 0.5);
        assert_eq!(aggregate.mean_probability(ExpressionLabel::Surprise), 0.25);
        assert_eq!(aggregate.label, ExpressionLabel::Happy);
        assert!(aggregate_axis::<ExpressionLabel>(&[]).is_none());
    }
}
