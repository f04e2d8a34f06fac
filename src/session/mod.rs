//! Exercise sessions - the session record and the engine that drives predictions
//!
//! The [`SessionEngine`] owns everything a running session mutates: its labels
//! predictor, its exercise plan and the per-exercise occurrence counts. The
//! state machine and the evaluator both work through it.

pub mod machine;
pub mod runner;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{ExerciseCatalog, belongs_to};
use crate::config::EngineConfig;
use crate::exercises::{
    ClassifiedExercise, Exercise, ExerciseDetail, ExerciseIdentity, ExerciseLabel, ExerciseType,
    LabelledExercise,
};
use crate::ml::{ExercisePlan, LabelPrediction, LabelsPredictor};

pub use machine::{Countdown, Outcome, SessionEvent, SessionState, SessionStateMachine};
pub use runner::{SessionCommand, SessionHandle, SessionRunner};

/// A workout session; read-only history once closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub exercise_type: ExerciseType,
    pub completed: bool,
    /// Confirmed sets in order
    pub exercises: Vec<LabelledExercise>,
    /// Sets reported by the sensor classifier
    #[serde(default)]
    pub classified: Vec<ClassifiedExercise>,
    /// Template (exercise plan) the session follows
    pub plan_id: Option<String>,
    pub plan_name: Option<String>,
    pub location: Option<String>,
}

impl Session {
    pub fn new(exercise_type: ExerciseType, start: DateTime<Utc>) -> Self {
        Self {
            id: format!("session-{:016x}", rand::random::<u64>()),
            start,
            end: None,
            exercise_type,
            completed: false,
            exercises: Vec::new(),
            classified: Vec::new(),
            plan_id: None,
            plan_name: None,
            location: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end.is_some()
    }

    /// Session length in seconds, up to `now` while still open
    pub fn duration_secs(&self, now: DateTime<Utc>) -> f64 {
        let end = self.end.unwrap_or(now);
        (end - self.start).num_milliseconds() as f64 / 1000.0
    }

    /// Confirmed and classified sets in start order
    pub fn timeline(&self) -> Vec<Exercise> {
        let start = |e: &Exercise| match e {
            Exercise::Labelled(l) => Some(l.start),
            Exercise::Classified(c) => Some(c.start),
            Exercise::Incomplete(_) => None,
        };
        let mut timeline: Vec<Exercise> = self
            .exercises
            .iter()
            .cloned()
            .map(Exercise::Labelled)
            .chain(self.classified.iter().cloned().map(Exercise::Classified))
            .collect();
        timeline.sort_by_key(start);
        timeline
    }
}

/// What the classifier should expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    /// The user is getting ready at the station
    Setup,
    /// The user is exercising
    Exercising,
}

/// Signal to the sensor pipeline about the exercise expected in a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationHint {
    pub kind: HintKind,
    pub start: DateTime<Utc>,
    /// Known once the window has a predicted or actual length
    pub duration_secs: Option<f64>,
    pub expected: ExerciseIdentity,
    pub labels: Vec<ExerciseLabel>,
}

/// Per-session prediction engine
pub struct SessionEngine {
    session: Session,
    labels: LabelsPredictor,
    plan: ExercisePlan,
    catalog: Arc<dyn ExerciseCatalog + Send + Sync>,
    config: EngineConfig,
    counts: HashMap<ExerciseIdentity, u32>,
    confirmed: HashSet<u64>,
    next_occurrence: u64,
    hint: Option<ClassificationHint>,
}

impl SessionEngine {
    pub fn new(
        session: Session,
        labels: LabelsPredictor,
        mut plan: ExercisePlan,
        catalog: Arc<dyn ExerciseCatalog + Send + Sync>,
        config: EngineConfig,
    ) -> Self {
        // a new session does not continue the previous session's last exercise
        plan.plan.reset_position();
        let mut counts: HashMap<ExerciseIdentity, u32> = HashMap::new();
        for exercise in &session.exercises {
            *counts.entry(exercise.identity.clone()).or_default() += 1;
        }
        Self {
            session,
            labels,
            plan,
            catalog,
            config,
            counts,
            confirmed: HashSet::new(),
            next_occurrence: 0,
            hint: None,
        }
    }

    /// Fresh session with empty predictors and an ad-hoc plan
    pub fn fresh(
        exercise_type: ExerciseType,
        catalog: Arc<dyn ExerciseCatalog + Send + Sync>,
        config: EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let labels = LabelsPredictor::new(config.max_history);
        let plan = ExercisePlan::ad_hoc(exercise_type.clone(), config.plan_window);
        let mut session = Session::new(exercise_type, now);
        session.plan_id = Some(plan.id.clone());
        session.plan_name = Some(plan.name.clone());
        Self::new(session, labels, plan, catalog, config)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn labels_predictor(&self) -> &LabelsPredictor {
        &self.labels
    }

    pub fn plan(&self) -> &ExercisePlan {
        &self.plan
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &(dyn ExerciseCatalog + Send + Sync) {
        self.catalog.as_ref()
    }

    /// Prior confirmed occurrences of the exercise in this session
    pub fn position(&self, identity: &ExerciseIdentity) -> u32 {
        self.counts.get(identity).copied().unwrap_or(0)
    }

    pub fn detail(&self, identity: &ExerciseIdentity) -> ExerciseDetail {
        self.catalog.detail_or_permissive(identity)
    }

    /// Candidates for the next exercise: planned ones first, then the rest of
    /// the catalog with exercises of the session's type ahead of the others
    pub fn coming_up(&self) -> Vec<ExerciseDetail> {
        let planned = self.plan.next(self.config.coming_up_limit);
        let mut details: Vec<ExerciseDetail> = planned.iter().map(|id| self.detail(id)).collect();

        let session_type = &self.session.exercise_type;
        let mut others: Vec<ExerciseDetail> = self
            .catalog
            .all_details()
            .into_iter()
            .filter(|d| !planned.contains(&d.identity))
            .collect();
        others.sort_by_cached_key(|d| {
            (
                !belongs_to(&d.exercise_type, session_type),
                d.exercise_type.to_string(),
                d.identity.title(),
            )
        });
        details.extend(others);
        details
    }

    pub fn predict_labels(&self, detail: &ExerciseDetail) -> LabelPrediction {
        self.labels.predict(detail, self.position(&detail.identity))
    }

    /// Predicted labels with defaults for the missing ones
    pub fn displayed_labels(&self, detail: &ExerciseDetail) -> Vec<ExerciseLabel> {
        self.predict_labels(detail).complete(detail, &self.config.label_defaults)
    }

    /// Countdown for the exercise: the learned duration or the configured default
    pub fn expected_duration(&self, detail: &ExerciseDetail) -> f64 {
        self.predict_labels(detail)
            .duration
            .filter(|d| *d > 0.0)
            .unwrap_or(self.config.default_exercise_duration_secs)
    }

    /// Allocates the id of an exercise occurrence about to be performed
    pub fn begin_occurrence(&mut self) -> u64 {
        self.next_occurrence += 1;
        self.next_occurrence
    }

    /// Records the final labels of an occurrence; the only path that trains
    /// the predictors and the plan. Returns false for a repeated occurrence.
    pub fn confirm_exercise(
        &mut self,
        occurrence: u64,
        detail: &ExerciseDetail,
        labels: &[ExerciseLabel],
        start: DateTime<Utc>,
        duration_secs: f64,
    ) -> bool {
        if !self.confirmed.insert(occurrence) {
            debug_assert!(false, "occurrence {occurrence} confirmed twice");
            warn!("Occurrence {} of {} confirmed twice; ignoring", occurrence, detail.identity);
            return false;
        }

        let position = self.position(&detail.identity);
        self.labels.confirm(detail, position, labels, Some(duration_secs));
        self.plan.insert(detail.identity.clone());
        *self.counts.entry(detail.identity.clone()).or_default() += 1;
        self.session.exercises.push(LabelledExercise {
            identity: detail.identity.clone(),
            start,
            duration_secs,
            labels: labels.to_vec(),
        });
        info!(
            "Confirmed {} #{} ({} labels, {:.1}s)",
            detail.identity,
            position + 1,
            labels.len(),
            duration_secs
        );
        true
    }

    /// Keeps a set reported by the classifier
    pub fn record_classified(&mut self, exercise: ClassifiedExercise) {
        debug!("Classified {} (p={:.2})", exercise.identity, exercise.confidence);
        self.session.classified.push(exercise);
    }

    pub fn hint(&self) -> Option<&ClassificationHint> {
        self.hint.as_ref()
    }

    pub fn set_hint(&mut self, hint: Option<ClassificationHint>) {
        self.hint = hint;
    }

    /// Closes the session; later calls keep the first end time
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.hint = None;
        if self.session.end.is_none() {
            self.session.end = Some(now);
            self.session.completed = !self.session.exercises.is_empty();
            info!(
                "Closed session {} with {} exercises",
                self.session.id,
                self.session.exercises.len()
            );
        }
    }

    /// Session, trained predictor and plan for persisting
    pub fn into_parts(self) -> (Session, LabelsPredictor, ExercisePlan) {
        (self.session, self.labels, self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::exercises::{LabelDescriptor, MuscleGroup};

    fn engine() -> SessionEngine {
        SessionEngine::fresh(
            ExerciseType::targeted([MuscleGroup::Arms]),
            Arc::new(StaticCatalog::default()),
            EngineConfig::default(),
            Utc::now(),
        )
    }

    fn curl(engine: &SessionEngine) -> ExerciseDetail {
        engine.detail(&ExerciseIdentity::parse("resistanceTargeted:arms/dumbbell-biceps-curl").unwrap())
    }

    fn pushdown(engine: &SessionEngine) -> ExerciseDetail {
        engine.detail(&ExerciseIdentity::parse("resistanceTargeted:arms/cable-triceps-pushdown").unwrap())
    }

    #[test]
    fn test_coming_up_favours_session_type() {
        let engine = engine();
        let coming_up = engine.coming_up();
        let first_other = coming_up
            .iter()
            .position(|d| d.exercise_type.muscle_groups() != [MuscleGroup::Arms])
            .unwrap();
        assert!(coming_up[..first_other]
            .iter()
            .all(|d| d.exercise_type == ExerciseType::targeted([MuscleGroup::Arms])));
        assert!(coming_up[first_other..]
            .iter()
            .all(|d| d.exercise_type != ExerciseType::targeted([MuscleGroup::Arms])));
    }

    #[test]
    fn test_confirm_trains_and_plans() {
        let mut engine = engine();
        let start = Utc::now();
        let curl = curl(&engine);
        let pushdown = pushdown(&engine);

        let first = engine.begin_occurrence();
        assert!(engine.confirm_exercise(first, &curl, &[ExerciseLabel::Weight(10.0)], start, 30.0));
        let second = engine.begin_occurrence();
        assert!(engine.confirm_exercise(second, &pushdown, &[ExerciseLabel::Weight(15.0)], start, 25.0));
        let third = engine.begin_occurrence();
        assert!(engine.confirm_exercise(third, &curl, &[ExerciseLabel::Weight(12.5)], start, 30.0));

        assert_eq!(engine.position(&curl.identity), 2);
        assert_eq!(engine.session().exercises.len(), 3);
        assert_eq!(engine.coming_up()[0].identity, pushdown.identity);
        assert_eq!(
            engine.labels_predictor().history_len(&curl.identity, LabelDescriptor::Weight),
            2
        );
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "confirmed twice"))]
    fn test_double_confirm_is_ignored() {
        let mut engine = engine();
        let curl = curl(&engine);
        let occurrence = engine.begin_occurrence();
        assert!(engine.confirm_exercise(occurrence, &curl, &[], Utc::now(), 30.0));
        assert!(!engine.confirm_exercise(occurrence, &curl, &[], Utc::now(), 30.0));
        assert_eq!(engine.session().exercises.len(), 1);
    }

    #[test]
    fn test_expected_duration_defaults() {
        let mut engine = engine();
        let curl = curl(&engine);
        assert_eq!(engine.expected_duration(&curl), 30.0);
        let occurrence = engine.begin_occurrence();
        engine.confirm_exercise(occurrence, &curl, &[], Utc::now(), 42.0);
        assert!((engine.expected_duration(&curl) - 42.0).abs() < 1e-6);
    }

    #[test]
    fn test_displayed_labels_fill_defaults() {
        let engine = engine();
        let curl = curl(&engine);
        let labels = engine.displayed_labels(&curl);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[0], ExerciseLabel::Weight(0.0));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut engine = engine();
        let first = Utc::now();
        engine.close(first);
        engine.close(first + chrono::Duration::seconds(30));
        assert_eq!(engine.session().end, Some(first));
        assert!(!engine.session().completed);
    }

    #[test]
    fn test_timeline_merges_sources() {
        let mut engine = engine();
        let start = Utc::now();
        let curl = curl(&engine);
        engine.record_classified(ClassifiedExercise {
            identity: pushdown(&engine).identity,
            confidence: 0.8,
            start: start + chrono::Duration::seconds(90),
            duration_secs: 20.0,
            labels: vec![],
        });
        let occurrence = engine.begin_occurrence();
        engine.confirm_exercise(occurrence, &curl, &[ExerciseLabel::Repetitions(10)], start, 30.0);

        let timeline = engine.session().timeline();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].identity(), &curl.identity);
        assert_eq!(timeline[0].confidence(), 1.0);
        assert_eq!(timeline[0].label(LabelDescriptor::Repetitions), Some(ExerciseLabel::Repetitions(10)));
        assert!(timeline[1].as_labelled().is_none());
        assert_eq!(timeline[1].confidence(), 0.8);
    }
}
