//! Labels prediction - one scalar series per label kind per exercise

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rounding::{self, ScalarKind};
use super::scalar::{ScalarBlob, ScalarPredictor};
use crate::exercises::{ExerciseDetail, ExerciseIdentity, ExerciseLabel, LabelDescriptor};

const BLOB_VERSION: u32 = 1;

/// Labels predicted for an upcoming set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelPrediction {
    /// Rounded labels backed by history
    pub predicted: Vec<ExerciseLabel>,
    /// Labels the exercise supports but nothing is known about yet
    pub missing: Vec<LabelDescriptor>,
    /// Expected duration in seconds
    pub duration: Option<f64>,
}

impl LabelPrediction {
    pub fn label(&self, descriptor: LabelDescriptor) -> Option<ExerciseLabel> {
        self.predicted.iter().copied().find(|l| l.descriptor() == descriptor)
    }

    /// Predicted labels with the gaps filled by defaults, in the detail's label order
    pub fn complete(&self, detail: &ExerciseDetail, defaults: &LabelDefaults) -> Vec<ExerciseLabel> {
        detail
            .labels
            .iter()
            .map(|d| self.label(*d).unwrap_or_else(|| defaults.label(*d)))
            .collect()
    }
}

/// Values shown for labels without history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelDefaults {
    pub weight: f64,
    pub repetitions: u32,
    pub intensity: f64,
}

impl Default for LabelDefaults {
    fn default() -> Self {
        Self { weight: 0.0, repetitions: 0, intensity: 0.0 }
    }
}

impl LabelDefaults {
    pub fn label(&self, descriptor: LabelDescriptor) -> ExerciseLabel {
        match descriptor {
            LabelDescriptor::Weight => ExerciseLabel::Weight(self.weight),
            LabelDescriptor::Repetitions => ExerciseLabel::Repetitions(self.repetitions),
            LabelDescriptor::Intensity => ExerciseLabel::Intensity(self.intensity),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LabelsBlob {
    version: u32,
    predictors: Vec<ScalarBlob>,
}

/// Aggregates the weight, repetitions, intensity and duration predictors
#[derive(Debug, Clone)]
pub struct LabelsPredictor {
    weight: ScalarPredictor,
    repetitions: ScalarPredictor,
    intensity: ScalarPredictor,
    duration: ScalarPredictor,
    max_history: usize,
}

impl LabelsPredictor {
    pub fn new(max_history: usize) -> Self {
        Self {
            weight: ScalarPredictor::new(ScalarKind::Weight, max_history),
            repetitions: ScalarPredictor::new(ScalarKind::Repetitions, max_history),
            intensity: ScalarPredictor::new(ScalarKind::Intensity, max_history),
            duration: ScalarPredictor::new(ScalarKind::Duration, max_history),
            max_history,
        }
    }

    pub fn predictor(&self, kind: ScalarKind) -> &ScalarPredictor {
        match kind {
            ScalarKind::Weight => &self.weight,
            ScalarKind::Repetitions => &self.repetitions,
            ScalarKind::Intensity => &self.intensity,
            ScalarKind::Duration => &self.duration,
        }
    }

    fn predictor_mut(&mut self, kind: ScalarKind) -> &mut ScalarPredictor {
        match kind {
            ScalarKind::Weight => &mut self.weight,
            ScalarKind::Repetitions => &mut self.repetitions,
            ScalarKind::Intensity => &mut self.intensity,
            ScalarKind::Duration => &mut self.duration,
        }
    }

    /// Predicts the labels of the set at `position` (prior occurrences in the session)
    pub fn predict(&self, detail: &ExerciseDetail, position: u32) -> LabelPrediction {
        let mut prediction = LabelPrediction::default();
        for descriptor in &detail.labels {
            let kind = ScalarKind::from(*descriptor);
            let predictor = self.predictor(kind);
            if predictor.history_len(&detail.identity) == 0 {
                prediction.missing.push(*descriptor);
                continue;
            }
            let raw = predictor.predict(&detail.identity, position);
            let rounded = rounding::round(kind, raw, detail);
            prediction.predicted.push(ExerciseLabel::from_value(*descriptor, rounded));
        }
        if self.duration.history_len(&detail.identity) > 0 {
            let raw = self.duration.predict(&detail.identity, position);
            prediction.duration = Some(rounding::round(ScalarKind::Duration, raw, detail));
        }
        debug!(
            "Predicted {} labels for {} at position {} ({} missing)",
            prediction.predicted.len(),
            detail.identity,
            position,
            prediction.missing.len()
        );
        prediction
    }

    /// Records the final labels of a finished set
    pub fn confirm(
        &mut self,
        detail: &ExerciseDetail,
        position: u32,
        labels: &[ExerciseLabel],
        duration: Option<f64>,
    ) {
        for label in labels {
            let kind = ScalarKind::from(label.descriptor());
            self.predictor_mut(kind).observe(&detail.identity, position, label.value());
        }
        if let Some(duration) = duration {
            self.duration.observe(&detail.identity, position, duration);
        }
    }

    /// Number of confirmed values for the identity and label
    pub fn history_len(&self, identity: &ExerciseIdentity, descriptor: LabelDescriptor) -> usize {
        self.predictor(descriptor.into()).history_len(identity)
    }

    pub fn merge(&mut self, other: &LabelsPredictor) {
        for kind in ScalarKind::all() {
            let theirs = other.predictor(*kind).clone();
            self.predictor_mut(*kind).merge(&theirs);
        }
    }

    /// Merges a persisted blob into this predictor
    pub fn merge_encoded(&mut self, data: &[u8]) {
        let other = Self::decode_or_default(data, self.max_history);
        self.merge(&other);
    }

    pub fn encode(&self) -> Vec<u8> {
        let blob = LabelsBlob {
            version: BLOB_VERSION,
            predictors: ScalarKind::all()
                .iter()
                .map(|kind| self.predictor(*kind).to_blob())
                .collect(),
        };
        serde_json::to_vec(&blob).unwrap_or_default()
    }

    pub fn decode(data: &[u8], max_history: usize) -> anyhow::Result<Self> {
        let blob: LabelsBlob = serde_json::from_slice(data)?;
        let mut labels = Self::new(max_history);
        for scalar in blob.predictors {
            let predictor = ScalarPredictor::from_blob(scalar, max_history);
            let kind = predictor.kind();
            *labels.predictor_mut(kind) = predictor;
        }
        Ok(labels)
    }

    /// Decodes `data`, or returns an empty predictor when it is corrupt
    pub fn decode_or_default(data: &[u8], max_history: usize) -> Self {
        Self::decode(data, max_history).unwrap_or_else(|e| {
            warn!("Corrupt labels predictor blob ({}); starting empty", e);
            Self::new(max_history)
        })
    }
}
