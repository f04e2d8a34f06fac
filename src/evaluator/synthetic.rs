//! Synthetic reference sessions with a steady progression
//!
//! Each generated session follows one routine: a few exercises of the session
//! type, three sets each, with the weights creeping up every other session and
//! the repetitions dropping within a set pyramid.

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;

use super::loader::ReferenceSession;
use crate::catalog::ExerciseCatalog;
use crate::exercises::{ExerciseDetail, ExerciseLabel, ExerciseType, LabelDescriptor};
use crate::ml::ScalarKind;
use crate::ml::rounding;

/// Exercises in a generated routine
const ROUTINE_LENGTH: usize = 4;
const SETS: u32 = 3;

/// Deterministic session generator
pub struct SyntheticSessions {
    rng: StdRng,
}

impl SyntheticSessions {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// `count` sessions of `exercise_type`, one per day ending at `until`
    pub fn generate(
        &mut self,
        catalog: &dyn ExerciseCatalog,
        exercise_type: &ExerciseType,
        count: usize,
        until: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, ReferenceSession)> {
        let mut routine = catalog.exercise_details_for(exercise_type);
        routine.shuffle(&mut self.rng);
        routine.truncate(ROUTINE_LENGTH);

        let mut sessions = Vec::with_capacity(count);
        for index in 0..count {
            let day = until - Duration::days((count - 1 - index) as i64);
            let mut rows = Vec::new();
            for detail in &routine {
                for set in 0..SETS {
                    rows.push((detail.clone(), self.labels(detail, index, set)));
                }
            }
            let session = ReferenceSession {
                description: format!("Synthetic {} #{}", exercise_type.name(), index + 1),
                exercise_type: exercise_type.clone(),
                rows,
            };
            sessions.push((day, session));
        }
        sessions
    }

    fn labels(&mut self, detail: &ExerciseDetail, session: usize, set: u32) -> Vec<ExerciseLabel> {
        let mut labels = Vec::new();
        for descriptor in &detail.labels {
            let label = match descriptor {
                LabelDescriptor::Weight => match detail.weight_progression() {
                    Some((minimum, _, _)) => {
                        let steps = 2 + (session / 2) as i64 + i64::from(set);
                        ExerciseLabel::Weight(rounding::step(ScalarKind::Weight, minimum, steps, detail))
                    }
                    // bodyweight
                    None => continue,
                },
                LabelDescriptor::Repetitions => {
                    let noise = if self.rng.gen_bool(0.2) { self.rng.gen_range(-1..=1) } else { 0 };
                    ExerciseLabel::Repetitions((12 - 2 * set as i32 + noise).max(1) as u32)
                }
                LabelDescriptor::Intensity => ExerciseLabel::Intensity(0.4 + 0.2 * f64::from(set)),
            };
            labels.push(rounding::round_label(label, detail));
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::exercises::MuscleGroup;

    #[test]
    fn test_same_seed_same_sessions() {
        let catalog = StaticCatalog::default();
        let arms = ExerciseType::targeted([MuscleGroup::Arms]);
        let until = Utc::now();
        let a = SyntheticSessions::new(42).generate(&catalog, &arms, 3, until);
        let b = SyntheticSessions::new(42).generate(&catalog, &arms, 3, until);
        assert_eq!(a, b);
        assert!(a[0].0 < a[2].0);
        assert_eq!(a[2].0, until);
    }

    #[test]
    fn test_routine_and_labels() {
        let catalog = StaticCatalog::default();
        let arms = ExerciseType::targeted([MuscleGroup::Arms]);
        let sessions = SyntheticSessions::new(1).generate(&catalog, &arms, 4, Utc::now());
        for (_, session) in &sessions {
            assert_eq!(session.rows.len(), ROUTINE_LENGTH * SETS as usize);
            for (detail, labels) in &session.rows {
                assert_eq!(detail.exercise_type, arms);
                for label in labels {
                    assert_eq!(*label, rounding::round_label(*label, detail));
                }
            }
        }

        // weights climb every other session
        let weight = |index: usize| {
            sessions[index].1.rows[0]
                .1
                .iter()
                .find(|l| l.descriptor() == LabelDescriptor::Weight)
                .map(ExerciseLabel::value)
        };
        if weight(0).is_some() {
            assert_eq!(weight(0), weight(1));
            assert!(weight(2) > weight(1));
        }
    }
}
