//! Label rounding - maps raw predictions onto values the user can actually select

use serde::{Deserialize, Serialize};

use crate::exercises::{ExerciseDetail, ExerciseLabel, LabelDescriptor};

/// Intensity is shown in 0.2 steps
const INTENSITY_LEVELS: f64 = 5.0;

/// Weight step for exercises without a weight progression
const FALLBACK_WEIGHT_STEP: f64 = 0.5;

/// Slack for regression noise before flooring repetitions
const FLOOR_EPSILON: f64 = 1e-6;

/// Scalar series kept per exercise: the three labels plus duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Weight,
    Repetitions,
    Intensity,
    Duration,
}

impl ScalarKind {
    pub fn all() -> &'static [ScalarKind] {
        &[
            ScalarKind::Weight,
            ScalarKind::Repetitions,
            ScalarKind::Intensity,
            ScalarKind::Duration,
        ]
    }
}

impl From<LabelDescriptor> for ScalarKind {
    fn from(descriptor: LabelDescriptor) -> Self {
        match descriptor {
            LabelDescriptor::Weight => ScalarKind::Weight,
            LabelDescriptor::Repetitions => ScalarKind::Repetitions,
            LabelDescriptor::Intensity => ScalarKind::Intensity,
        }
    }
}

/// Snapping grid `minimum + k * step` within `[minimum, maximum]`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Grid {
    minimum: f64,
    step: f64,
    maximum: Option<f64>,
}

impl Grid {
    fn max_index(&self) -> Option<i64> {
        self.maximum
            .map(|max| (((max - self.minimum) / self.step) + 1e-9).floor().max(0.0) as i64)
    }

    fn index_of(&self, value: f64) -> i64 {
        let k = ((value - self.minimum) / self.step).round().max(0.0) as i64;
        match self.max_index() {
            Some(max) => k.min(max),
            None => k,
        }
    }

    fn value_at(&self, k: i64) -> f64 {
        self.minimum + k as f64 * self.step
    }
}

fn weight_grid(detail: &ExerciseDetail) -> Option<Grid> {
    let (minimum, step, maximum) = detail.weight_progression()?;
    if step > 0.0 && step.is_finite() {
        Some(Grid { minimum, step, maximum })
    } else {
        None
    }
}

/// Rounds a raw value of the given kind for the exercise
pub fn round(kind: ScalarKind, value: f64, detail: &ExerciseDetail) -> f64 {
    let value = if value.is_finite() { value } else { 0.0 };
    match kind {
        ScalarKind::Repetitions => (value.max(0.0) + FLOOR_EPSILON).floor(),
        ScalarKind::Intensity => (value.clamp(0.0, 1.0) * INTENSITY_LEVELS).round() / INTENSITY_LEVELS,
        ScalarKind::Duration => value.max(0.0),
        ScalarKind::Weight => match weight_grid(detail) {
            Some(grid) => grid.value_at(grid.index_of(value)),
            // without a progression only a degenerate [minimum, maximum] may exist
            None => match detail.weight_progression() {
                Some((minimum, _, maximum)) => value.max(minimum).min(maximum.unwrap_or(f64::INFINITY)),
                None => value.max(0.0),
            },
        },
    }
}

/// The value `n` taps away from `value` on the same grid, clamped to range
pub fn step(kind: ScalarKind, value: f64, n: i64, detail: &ExerciseDetail) -> f64 {
    match kind {
        ScalarKind::Repetitions | ScalarKind::Duration => {
            (round(kind, value, detail) + n as f64).max(0.0)
        }
        ScalarKind::Intensity => {
            let k = (round(kind, value, detail) * INTENSITY_LEVELS).round() as i64 + n;
            k.clamp(0, INTENSITY_LEVELS as i64) as f64 / INTENSITY_LEVELS
        }
        ScalarKind::Weight => match weight_grid(detail) {
            Some(grid) => {
                let k = (grid.index_of(value) + n).max(0);
                let k = match grid.max_index() {
                    Some(max) => k.min(max),
                    None => k,
                };
                grid.value_at(k)
            }
            None => (round(kind, value, detail) + n as f64 * FALLBACK_WEIGHT_STEP).max(0.0),
        },
    }
}

/// Number of taps needed to walk from `from` to `to`
pub fn taps_between(kind: ScalarKind, from: f64, to: f64, detail: &ExerciseDetail) -> f64 {
    match kind {
        ScalarKind::Intensity => {
            let a = (round(kind, from, detail) * INTENSITY_LEVELS).round();
            let b = (round(kind, to, detail) * INTENSITY_LEVELS).round();
            (a - b).abs()
        }
        ScalarKind::Weight => match weight_grid(detail) {
            Some(grid) => (grid.index_of(from) - grid.index_of(to)).abs() as f64,
            None => ((from - to) / FALLBACK_WEIGHT_STEP).abs().round(),
        },
        ScalarKind::Repetitions | ScalarKind::Duration => {
            (round(kind, from, detail) - round(kind, to, detail)).abs()
        }
    }
}

/// Rounds a whole label
pub fn round_label(label: ExerciseLabel, detail: &ExerciseDetail) -> ExerciseLabel {
    let descriptor = label.descriptor();
    ExerciseLabel::from_value(descriptor, round(descriptor.into(), label.value(), detail))
}

impl ExerciseLabel {
    /// One tap up
    pub fn increment(&self, detail: &ExerciseDetail) -> ExerciseLabel {
        self.stepped(1, detail)
    }

    /// One tap down
    pub fn decrement(&self, detail: &ExerciseDetail) -> ExerciseLabel {
        self.stepped(-1, detail)
    }

    pub fn stepped(&self, n: i64, detail: &ExerciseDetail) -> ExerciseLabel {
        let descriptor = self.descriptor();
        ExerciseLabel::from_value(descriptor, step(descriptor.into(), self.value(), n, detail))
    }
}
