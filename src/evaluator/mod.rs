//! Offline evaluation - replays reference sessions and scores the predictions
//!
//! Each reference exercise is first predicted (the next exercise is the head of
//! the coming-up list, the labels are the ones backed by history) and then
//! confirmed with its recorded labels, as the user would have done.

pub mod loader;
pub mod synthetic;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StupidLossConfig;
use crate::exercises::{ExerciseDetail, ExerciseIdentity, LabelDescriptor};
use crate::ml::rounding;
use crate::session::SessionEngine;

pub use loader::{LoaderError, ReferenceSession};
pub use synthetic::SyntheticSessions;

/// Labels closer than this count as a match
const MATCH_TOLERANCE: f64 = 0.01;

/// Duration recorded for replayed exercises
const REPLAY_DURATION_SECS: f64 = 30.0;

/// Unit of the label loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LossBasis {
    /// Difference of the raw values
    #[default]
    Raw,
    /// Taps on the +/- buttons needed to correct the prediction
    Taps,
}

/// One expected label and what was predicted for it
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    /// Index of the exercise in the replay
    pub occurrence: usize,
    pub detail: ExerciseDetail,
    pub descriptor: LabelDescriptor,
    pub expected: f64,
    pub predicted: Option<f64>,
}

impl LabelRecord {
    pub fn matches(&self) -> bool {
        self.predicted
            .is_some_and(|p| (self.expected - p).abs() < MATCH_TOLERANCE)
    }
}

/// One expected exercise and the predicted one
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseRecord {
    pub expected: ExerciseIdentity,
    pub predicted: Option<ExerciseIdentity>,
}

impl ExerciseRecord {
    pub fn matches(&self) -> bool {
        self.predicted.as_ref() == Some(&self.expected)
    }
}

/// Scores of one replayed session
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub description: String,
    pub labels: Vec<LabelRecord>,
    pub exercises: Vec<ExerciseRecord>,
    pub stupid: StupidLossConfig,
}

impl Evaluation {
    fn considered<'a>(&'a self, ignoring: &'a [LabelDescriptor]) -> impl Iterator<Item = &'a LabelRecord> {
        self.labels.iter().filter(move |r| !ignoring.contains(&r.descriptor))
    }

    /// Share of labels predicted within tolerance; missing predictions are mismatches
    pub fn labels_accuracy(&self, ignoring: &[LabelDescriptor]) -> f64 {
        let (total, mismatched) = self
            .considered(ignoring)
            .fold((0usize, 0usize), |(t, m), r| (t + 1, m + usize::from(!r.matches())));
        if total == 0 {
            return 1.0;
        }
        1.0 - mismatched as f64 / total as f64
    }

    /// Share of exercises that were the head of the coming-up list
    pub fn exercises_accuracy(&self) -> f64 {
        if self.exercises.is_empty() {
            return 1.0;
        }
        let mismatched = self.exercises.iter().filter(|r| !r.matches()).count();
        1.0 - mismatched as f64 / self.exercises.len() as f64
    }

    /// Second-largest expected value per label kind
    fn second_largest(&self) -> HashMap<LabelDescriptor, f64> {
        let mut values: HashMap<LabelDescriptor, Vec<f64>> = HashMap::new();
        for record in &self.labels {
            values.entry(record.descriptor).or_default().push(record.expected);
        }
        values
            .into_iter()
            .filter_map(|(descriptor, mut v)| {
                v.sort_by(|a, b| b.total_cmp(a));
                v.get(1).map(|second| (descriptor, *second))
            })
            .collect()
    }

    /// A prediction far enough off that the user would find it absurd
    fn is_stupid(&self, record: &LabelRecord, second_largest: &HashMap<LabelDescriptor, f64>) -> bool {
        let Some(p) = record.predicted else {
            return false;
        };
        let e = record.expected;
        let config = &self.stupid;
        if p < config.zero_epsilon && e >= config.large_expected {
            return true;
        }
        match second_largest.get(&record.descriptor) {
            Some(second) => (e - p).abs() > config.min_error && p > config.second_max_ratio * second,
            None => false,
        }
    }

    /// Squared loss normalised by the average expected magnitude, plus a fixed
    /// penalty per stupid prediction
    pub fn labels_weighted_loss(&self, basis: LossBasis, ignoring: &[LabelDescriptor]) -> f64 {
        let second_largest = self.second_largest();
        let mut count = 0usize;
        let mut total_loss = 0.0;
        let mut total_expected = 0.0;
        let mut stupid_loss = 0.0;
        for record in self.considered(ignoring) {
            count += 1;
            let Some(p) = record.predicted else {
                continue;
            };
            let kind = record.descriptor.into();
            let (loss, magnitude) = match basis {
                LossBasis::Raw => ((record.expected - p).powi(2), record.expected.abs()),
                LossBasis::Taps => (
                    rounding::taps_between(kind, p, record.expected, &record.detail).powi(2),
                    rounding::taps_between(kind, record.expected, 0.0, &record.detail),
                ),
            };
            total_loss += loss;
            total_expected += magnitude;
            if self.is_stupid(record, &second_largest) {
                stupid_loss += self.stupid.penalty;
            }
        }
        if count == 0 {
            return 0.0;
        }
        let average_loss = total_loss / count as f64;
        let average_expected = total_expected / count as f64;
        let normaliser = if average_expected > 0.0 { average_expected } else { 1.0 };
        average_loss / normaliser + stupid_loss
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.description)?;
        writeln!(f, "{:-<60}", "")?;
        let mut labels = self.labels.iter().peekable();
        for (index, exercise) in self.exercises.iter().enumerate() {
            let mark = if exercise.matches() { "✓" } else { "✗" };
            let predicted = exercise
                .predicted
                .as_ref()
                .map(|p| p.title())
                .unwrap_or_else(|| "-".to_string());
            writeln!(f, "{} {:32} predicted {}", mark, exercise.expected.title(), predicted)?;
            while let Some(label) = labels.next_if(|l| l.occurrence == index) {
                let mark = if label.matches() { "✓" } else { "✗" };
                let predicted = label
                    .predicted
                    .map(|p| format!("{p:.2}"))
                    .unwrap_or_else(|| "-".to_string());
                writeln!(
                    f,
                    "    {} {:12} expected {:>8.2} predicted {:>8}",
                    mark,
                    label.descriptor.id(),
                    label.expected,
                    predicted
                )?;
            }
        }
        writeln!(f, "{:-<60}", "")?;
        writeln!(f, "Exercises accuracy: {:.3}", self.exercises_accuracy())?;
        writeln!(f, "Labels accuracy:    {:.3}", self.labels_accuracy(&[]))?;
        write!(f, "Labels loss:        {:.3}", self.labels_weighted_loss(LossBasis::Raw, &[]))
    }
}

/// Replays a reference session through a live engine
pub struct SessionEvaluator<'a> {
    reference: &'a ReferenceSession,
    stupid: StupidLossConfig,
}

impl<'a> SessionEvaluator<'a> {
    pub fn new(reference: &'a ReferenceSession, stupid: StupidLossConfig) -> Self {
        Self { reference, stupid }
    }

    pub fn evaluate(&self, engine: &mut SessionEngine) -> Evaluation {
        self.evaluate_at(engine, Utc::now())
    }

    /// When a replay started at `start` confirms its last exercise
    pub fn finished_at(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + Duration::seconds(REPLAY_DURATION_SECS as i64 * 2 * self.reference.rows.len() as i64)
    }

    /// Replays with exercise start times beginning at `start`
    pub fn evaluate_at(&self, engine: &mut SessionEngine, start: DateTime<Utc>) -> Evaluation {
        let mut evaluation = Evaluation {
            description: self.reference.description.clone(),
            stupid: self.stupid,
            ..Default::default()
        };

        let mut at = start;
        for (detail, expected_labels) in &self.reference.rows {
            let predicted_exercise = engine.coming_up().into_iter().next().map(|d| d.identity);
            evaluation.exercises.push(ExerciseRecord {
                expected: detail.identity.clone(),
                predicted: predicted_exercise,
            });

            let prediction = engine.predict_labels(detail);
            for label in expected_labels {
                let predicted = prediction.label(label.descriptor()).map(|l| l.value());
                evaluation.labels.push(LabelRecord {
                    occurrence: evaluation.exercises.len() - 1,
                    detail: detail.clone(),
                    descriptor: label.descriptor(),
                    expected: label.value(),
                    predicted,
                });
            }

            let occurrence = engine.begin_occurrence();
            engine.confirm_exercise(occurrence, detail, expected_labels, at, REPLAY_DURATION_SECS);
            at += Duration::seconds(REPLAY_DURATION_SECS as i64 * 2);
        }

        info!(
            "Evaluated {}: exercises {:.3}, labels {:.3}",
            evaluation.description,
            evaluation.exercises_accuracy(),
            evaluation.labels_accuracy(&[])
        );
        evaluation
    }
}
