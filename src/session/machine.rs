//! Session state machine
//!
//! ComingUp -> Ready -> (Setup) -> InExercise -> Done -> ComingUp, with Idle as
//! the terminal state. The machine never reads a clock or sleeps: every event
//! carries `now`, and entering a timed state yields a [`Countdown`] tagged with
//! a generation. A `TimerElapsed` whose generation is not the current one is
//! stale and ignored, so whichever of a tap, a classifier hint or a timer
//! arrives first decides the transition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::{ClassificationHint, HintKind, SessionEngine};
use crate::exercises::{
    Exercise, ExerciseDetail, ExerciseIdentity, ExerciseLabel, IncompleteExercise, LabelledExercise,
};

/// Externally visible state, published for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    ComingUp {
        candidate: Option<ExerciseDetail>,
        /// Seconds rested before the candidate was chosen
        rest_secs: Option<f64>,
    },
    Ready {
        exercise: ExerciseDetail,
        labels: Vec<ExerciseLabel>,
        rest_secs: Option<f64>,
    },
    Setup {
        exercise: ExerciseDetail,
        labels: Vec<ExerciseLabel>,
        rest_secs: Option<f64>,
    },
    InExercise {
        exercise: ExerciseDetail,
        labels: Vec<ExerciseLabel>,
        start: DateTime<Utc>,
    },
    Done {
        exercise: ExerciseDetail,
        labels: Vec<ExerciseLabel>,
        start: DateTime<Utc>,
        duration_secs: f64,
    },
    Idle,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::ComingUp { .. } => "ComingUp",
            SessionState::Ready { .. } => "Ready",
            SessionState::Setup { .. } => "Setup",
            SessionState::InExercise { .. } => "InExercise",
            SessionState::Done { .. } => "Done",
            SessionState::Idle => "Idle",
        }
    }

    pub fn exercise(&self) -> Option<&ExerciseDetail> {
        match self {
            SessionState::ComingUp { candidate, .. } => candidate.as_ref(),
            SessionState::Ready { exercise, .. }
            | SessionState::Setup { exercise, .. }
            | SessionState::InExercise { exercise, .. }
            | SessionState::Done { exercise, .. } => Some(exercise),
            SessionState::Idle => None,
        }
    }

    pub fn labels(&self) -> &[ExerciseLabel] {
        match self {
            SessionState::Ready { labels, .. }
            | SessionState::Setup { labels, .. }
            | SessionState::InExercise { labels, .. }
            | SessionState::Done { labels, .. } => labels,
            _ => &[],
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

/// Inputs from the user, the timers and the classifier
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Tap,
    LongPress,
    Swipe,
    /// A countdown ran out
    TimerElapsed { generation: u64 },
    /// The classifier believes the user is set up for `identity`
    SetupDetected { identity: ExerciseIdentity, probability: f64 },
    /// Explicit start, e.g. from the watch
    ExerciseStarted,
    /// Explicit end, e.g. from the watch or the classifier
    ExerciseEnded,
    /// Label edits in Done
    EditLabels(Vec<ExerciseLabel>),
    /// The session is stopped from outside
    End,
}

/// Timer the driver should start; replaces any pending countdown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    pub secs: f64,
    pub generation: u64,
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outcome {
    /// False when the event was ignored
    pub changed: bool,
    pub countdown: Option<Countdown>,
    /// Hint for the classifier, set on entering Setup and InExercise
    pub hint: Option<ClassificationHint>,
    /// The exercise confirmed on this transition
    pub confirmed: Option<LabelledExercise>,
    /// The session ended on this transition
    pub ended: bool,
}

impl Outcome {
    fn ignored() -> Self {
        Self::default()
    }
}

/// Labels shown in Done and whether the user touched them
#[derive(Debug, Clone)]
struct Occurrence {
    id: u64,
    edited: bool,
}

/// Per-session control flow over a [`SessionEngine`]
pub struct SessionStateMachine {
    engine: SessionEngine,
    state: SessionState,
    coming_up: Vec<ExerciseDetail>,
    candidate_index: usize,
    generation: u64,
    entered_at: DateTime<Utc>,
    /// When Done was left, for the rest duration
    rest_since: Option<DateTime<Utc>>,
    occurrence: Option<Occurrence>,
}

impl SessionStateMachine {
    pub fn new(engine: SessionEngine, now: DateTime<Utc>) -> Self {
        let mut machine = Self {
            engine,
            state: SessionState::Idle,
            coming_up: Vec::new(),
            candidate_index: 0,
            generation: 0,
            entered_at: now,
            rest_since: None,
            occurrence: None,
        };
        machine.enter_coming_up(now);
        machine
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SessionEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> SessionEngine {
        self.engine
    }

    /// The coming-up candidates in swipe order
    pub fn coming_up(&self) -> &[ExerciseDetail] {
        &self.coming_up
    }

    /// Generation of the countdown that may still fire
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The exercise on screen, before it is confirmed
    pub fn pending_exercise(&self) -> Option<Exercise> {
        let exercise = self.state.exercise()?;
        let labels = match &self.state {
            SessionState::ComingUp { .. } => self.engine.displayed_labels(exercise),
            state => state.labels().to_vec(),
        };
        Some(Exercise::Incomplete(IncompleteExercise {
            identity: exercise.identity.clone(),
            confidence: 1.0,
            labels,
        }))
    }

    /// Handles one event; events without a transition in the current state are no-ops
    pub fn handle(&mut self, event: SessionEvent, now: DateTime<Utc>) -> Outcome {
        if let SessionEvent::TimerElapsed { generation } = &event {
            if *generation != self.generation {
                debug!(
                    "Stale timer {} in {} (current {})",
                    generation,
                    self.state.name(),
                    self.generation
                );
                return Outcome::ignored();
            }
        }

        let from = self.state.name();
        let outcome = match (&self.state, event) {
            (SessionState::Idle, event) => {
                debug!("Session is idle; ignoring {:?}", event);
                Outcome::ignored()
            }
            (_, SessionEvent::LongPress | SessionEvent::End) => self.enter_idle(now),

            // ComingUp
            (SessionState::ComingUp { candidate: Some(_), .. }, SessionEvent::Tap) => {
                self.enter_ready(now)
            }
            (SessionState::ComingUp { candidate: Some(_), .. }, SessionEvent::ExerciseStarted) => {
                self.begin_occurrence();
                let exercise = self.current_candidate();
                let labels = exercise
                    .as_ref()
                    .map(|e| self.engine.displayed_labels(e))
                    .unwrap_or_default();
                match exercise {
                    Some(exercise) => self.enter_in_exercise(exercise, labels, now),
                    None => Outcome::ignored(),
                }
            }
            (SessionState::ComingUp { .. }, SessionEvent::Swipe) => self.swipe(),

            // Ready
            (SessionState::Ready { .. }, SessionEvent::Tap) => {
                info!("Ready cancelled");
                self.occurrence = None;
                self.enter_coming_up(now)
            }
            (SessionState::Ready { exercise, labels, rest_secs }, SessionEvent::TimerElapsed { .. }) => {
                let (exercise, labels, rest_secs) = (exercise.clone(), labels.clone(), *rest_secs);
                if self.engine.config().lab_mode {
                    self.enter_setup(exercise, labels, rest_secs, now)
                } else {
                    self.enter_in_exercise(exercise, labels, now)
                }
            }
            (
                SessionState::Ready { exercise, labels, .. } | SessionState::Setup { exercise, labels, .. },
                SessionEvent::ExerciseStarted,
            ) => {
                let (exercise, labels) = (exercise.clone(), labels.clone());
                self.enter_in_exercise(exercise, labels, now)
            }

            // Setup
            (SessionState::Setup { exercise, labels, .. }, SessionEvent::TimerElapsed { .. }) => {
                let (exercise, labels) = (exercise.clone(), labels.clone());
                self.enter_in_exercise(exercise, labels, now)
            }
            (
                SessionState::Setup { exercise, labels, .. },
                SessionEvent::SetupDetected { identity, probability },
            ) => {
                let config = self.engine.config();
                let since = seconds_between(self.entered_at, now);
                if identity != exercise.identity {
                    debug!("Setup detected for {} while expecting {}", identity, exercise.identity);
                    Outcome::ignored()
                } else if probability < config.setup_probability_threshold {
                    debug!("Setup detected with p={:.2}; below threshold", probability);
                    Outcome::ignored()
                } else if since < config.setup_cooldown_secs {
                    debug!("Setup detected {:.1}s after the last transition; cooling down", since);
                    Outcome::ignored()
                } else {
                    let (exercise, labels) = (exercise.clone(), labels.clone());
                    self.enter_in_exercise(exercise, labels, now)
                }
            }

            // InExercise
            (
                SessionState::InExercise { exercise, labels, start },
                SessionEvent::Tap | SessionEvent::ExerciseEnded,
            ) => {
                let (exercise, labels, start) = (exercise.clone(), labels.clone(), *start);
                let duration_secs = seconds_between(start, now).max(0.0);
                self.enter_done(exercise, labels, start, duration_secs)
            }

            // Done
            (
                SessionState::Done { exercise, start, duration_secs, .. },
                SessionEvent::EditLabels(labels),
            ) => {
                let (exercise, start, duration_secs) = (exercise.clone(), *start, *duration_secs);
                if let Some(occurrence) = self.occurrence.as_mut() {
                    occurrence.edited = true;
                }
                self.enter_done(exercise, labels, start, duration_secs)
            }
            (SessionState::Done { .. }, SessionEvent::Tap) => {
                let confirmed = self.confirm_current();
                let mut outcome = self.enter_coming_up(now);
                outcome.confirmed = confirmed;
                outcome
            }
            (SessionState::Done { .. }, SessionEvent::TimerElapsed { .. }) => {
                let edited = self.occurrence.as_ref().is_some_and(|o| o.edited);
                let confirmed = if self.engine.config().auto_confirm_on_timeout {
                    info!("Done timed out; confirming shown labels (edited: {})", edited);
                    self.confirm_current()
                } else {
                    info!("Done timed out; discarding exercise");
                    self.occurrence = None;
                    None
                };
                let mut outcome = self.enter_coming_up(now);
                outcome.confirmed = confirmed;
                outcome
            }

            (state, event) => {
                debug!("No transition from {} on {:?}", state.name(), event);
                Outcome::ignored()
            }
        };

        if outcome.changed {
            self.entered_at = now;
            info!("Session state {} -> {}", from, self.state.name());
        }
        outcome
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn countdown(&mut self, secs: f64) -> Countdown {
        Countdown { secs, generation: self.next_generation() }
    }

    fn current_candidate(&self) -> Option<ExerciseDetail> {
        self.coming_up.get(self.candidate_index).cloned()
    }

    fn begin_occurrence(&mut self) {
        let id = self.engine.begin_occurrence();
        self.occurrence = Some(Occurrence { id, edited: false });
    }

    fn enter_coming_up(&mut self, now: DateTime<Utc>) -> Outcome {
        // invalidates whatever countdown is pending
        self.next_generation();
        self.engine.set_hint(None);
        self.coming_up = self.engine.coming_up();
        self.candidate_index = 0;
        self.rest_since = Some(now);
        self.state = SessionState::ComingUp {
            candidate: self.current_candidate(),
            rest_secs: None,
        };
        Outcome { changed: true, ..Default::default() }
    }

    fn swipe(&mut self) -> Outcome {
        if self.coming_up.len() < 2 {
            return Outcome::ignored();
        }
        self.candidate_index = (self.candidate_index + 1) % self.coming_up.len();
        let rest_secs = match &self.state {
            SessionState::ComingUp { rest_secs, .. } => *rest_secs,
            _ => None,
        };
        self.state = SessionState::ComingUp { candidate: self.current_candidate(), rest_secs };
        Outcome { changed: true, ..Default::default() }
    }

    fn enter_ready(&mut self, now: DateTime<Utc>) -> Outcome {
        let Some(exercise) = self.current_candidate() else {
            return Outcome::ignored();
        };
        self.begin_occurrence();
        let labels = self.engine.displayed_labels(&exercise);
        let rest_secs = self.rest_since.map(|since| seconds_between(since, now).max(0.0));
        let countdown = self.countdown(self.engine.config().ready_secs);
        self.state = SessionState::Ready { exercise, labels, rest_secs };
        Outcome { changed: true, countdown: Some(countdown), ..Default::default() }
    }

    fn enter_setup(
        &mut self,
        exercise: ExerciseDetail,
        labels: Vec<ExerciseLabel>,
        rest_secs: Option<f64>,
        now: DateTime<Utc>,
    ) -> Outcome {
        let countdown = self.countdown(self.engine.config().setup_secs);
        let hint = ClassificationHint {
            kind: HintKind::Setup,
            start: now,
            duration_secs: Some(countdown.secs),
            expected: exercise.identity.clone(),
            labels: labels.clone(),
        };
        self.engine.set_hint(Some(hint.clone()));
        self.state = SessionState::Setup { exercise, labels, rest_secs };
        Outcome { changed: true, countdown: Some(countdown), hint: Some(hint), ..Default::default() }
    }

    fn enter_in_exercise(
        &mut self,
        exercise: ExerciseDetail,
        labels: Vec<ExerciseLabel>,
        now: DateTime<Utc>,
    ) -> Outcome {
        let duration = self.engine.expected_duration(&exercise);
        let countdown = self.countdown(duration);
        let hint = ClassificationHint {
            kind: HintKind::Exercising,
            start: now,
            duration_secs: Some(duration),
            expected: exercise.identity.clone(),
            labels: labels.clone(),
        };
        self.engine.set_hint(Some(hint.clone()));
        self.state = SessionState::InExercise { exercise, labels, start: now };
        Outcome { changed: true, countdown: Some(countdown), hint: Some(hint), ..Default::default() }
    }

    fn enter_done(
        &mut self,
        exercise: ExerciseDetail,
        labels: Vec<ExerciseLabel>,
        start: DateTime<Utc>,
        duration_secs: f64,
    ) -> Outcome {
        self.engine.set_hint(None);
        let countdown = self.countdown(self.engine.config().done_secs);
        self.state = SessionState::Done { exercise, labels, start, duration_secs };
        Outcome { changed: true, countdown: Some(countdown), ..Default::default() }
    }

    fn enter_idle(&mut self, now: DateTime<Utc>) -> Outcome {
        self.next_generation();
        self.occurrence = None;
        self.engine.close(now);
        self.state = SessionState::Idle;
        Outcome { changed: true, ended: true, ..Default::default() }
    }

    /// Confirms the exercise shown in Done
    fn confirm_current(&mut self) -> Option<LabelledExercise> {
        let SessionState::Done { exercise, labels, start, duration_secs } = &self.state else {
            return None;
        };
        let Some(occurrence) = self.occurrence.take() else {
            debug!("Nothing to confirm in {}", self.state.name());
            return None;
        };
        let (exercise, labels, start, duration_secs) =
            (exercise.clone(), labels.clone(), *start, *duration_secs);
        if self
            .engine
            .confirm_exercise(occurrence.id, &exercise, &labels, start, duration_secs)
        {
            self.engine.session().exercises.last().cloned()
        } else {
            None
        }
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::config::EngineConfig;
    use crate::exercises::{ExerciseType, MuscleGroup};

    fn machine(config: EngineConfig) -> (SessionStateMachine, DateTime<Utc>) {
        let now = Utc::now();
        let engine = SessionEngine::fresh(
            ExerciseType::targeted([MuscleGroup::Arms]),
            Arc::new(StaticCatalog::default()),
            config,
            now,
        );
        (SessionStateMachine::new(engine, now), now)
    }

    fn secs(s: f64) -> Duration {
        Duration::milliseconds((s * 1000.0) as i64)
    }

    /// Taps through to InExercise, returning the time InExercise was entered
    fn start_exercise(m: &mut SessionStateMachine, now: DateTime<Utc>) -> DateTime<Utc> {
        let ready = m.handle(SessionEvent::Tap, now);
        let countdown = ready.countdown.unwrap();
        let at = now + secs(countdown.secs);
        m.handle(SessionEvent::TimerElapsed { generation: countdown.generation }, at);
        at
    }

    #[test]
    fn test_starts_coming_up_with_candidate() {
        let (m, _) = machine(EngineConfig::default());
        assert_eq!(m.state().name(), "ComingUp");
        assert!(m.state().exercise().is_some());
    }

    #[test]
    fn test_full_cycle() {
        let (mut m, now) = machine(EngineConfig::default());
        let ready = m.handle(SessionEvent::Tap, now);
        assert_eq!(m.state().name(), "Ready");
        assert_eq!(ready.countdown.unwrap().secs, 5.0);

        let started = start_exercise_from_ready(&mut m, ready.countdown.unwrap(), now);
        assert_eq!(m.state().name(), "InExercise");

        let ended = started + secs(12.3);
        let done = m.handle(SessionEvent::Tap, ended);
        assert_eq!(done.countdown.unwrap().secs, 15.0);
        match m.state() {
            SessionState::Done { duration_secs, .. } => assert!((duration_secs - 12.3).abs() < 0.1),
            other => panic!("Expected Done, got {:?}", other),
        }

        let confirmed = m.handle(SessionEvent::Tap, ended + secs(2.0));
        assert_eq!(m.state().name(), "ComingUp");
        assert!(confirmed.confirmed.is_some());
        assert_eq!(m.engine().session().exercises.len(), 1);
    }

    fn start_exercise_from_ready(
        m: &mut SessionStateMachine,
        countdown: Countdown,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let at = now + secs(countdown.secs);
        let outcome = m.handle(SessionEvent::TimerElapsed { generation: countdown.generation }, at);
        assert_eq!(outcome.hint.as_ref().map(|h| h.kind), Some(HintKind::Exercising));
        at
    }

    #[test]
    fn test_ready_tap_cancels() {
        let (mut m, now) = machine(EngineConfig::default());
        let ready = m.handle(SessionEvent::Tap, now);
        m.handle(SessionEvent::Tap, now + secs(1.0));
        assert_eq!(m.state().name(), "ComingUp");

        // the cancelled countdown is stale now
        let stale = m.handle(
            SessionEvent::TimerElapsed { generation: ready.countdown.unwrap().generation },
            now + secs(5.0),
        );
        assert!(!stale.changed);
        assert_eq!(m.state().name(), "ComingUp");
    }

    #[test]
    fn test_swipe_cycles_candidates() {
        let (mut m, now) = machine(EngineConfig::default());
        let first = m.state().exercise().cloned().unwrap();
        m.handle(SessionEvent::Swipe, now);
        let second = m.state().exercise().cloned().unwrap();
        assert_ne!(first.identity, second.identity);
        for _ in 1..m.coming_up().len() {
            m.handle(SessionEvent::Swipe, now);
        }
        assert_eq!(m.state().exercise().unwrap().identity, first.identity);
    }

    #[test]
    fn test_lab_mode_setup() {
        let config = EngineConfig { lab_mode: true, ..Default::default() };
        let (mut m, now) = machine(config);
        let ready = m.handle(SessionEvent::Tap, now).countdown.unwrap();
        let at = now + secs(5.0);
        let setup = m.handle(SessionEvent::TimerElapsed { generation: ready.generation }, at);
        assert_eq!(m.state().name(), "Setup");
        assert_eq!(setup.hint.unwrap().kind, HintKind::Setup);

        // tapping in setup does nothing
        assert!(!m.handle(SessionEvent::Tap, at + secs(1.0)).changed);

        let expected = m.state().exercise().unwrap().identity.clone();
        // too early
        let early = m.handle(
            SessionEvent::SetupDetected { identity: expected.clone(), probability: 0.9 },
            at + secs(2.0),
        );
        assert!(!early.changed);
        // too unsure
        let unsure = m.handle(
            SessionEvent::SetupDetected { identity: expected.clone(), probability: 0.5 },
            at + secs(6.0),
        );
        assert!(!unsure.changed);

        let detected = m.handle(
            SessionEvent::SetupDetected { identity: expected, probability: 0.8 },
            at + secs(6.0),
        );
        assert!(detected.changed);
        assert_eq!(m.state().name(), "InExercise");

        // the setup countdown lost the race
        let late = m.handle(
            SessionEvent::TimerElapsed { generation: setup.countdown.unwrap().generation },
            at + secs(7.0),
        );
        assert!(!late.changed);
        assert_eq!(m.state().name(), "InExercise");
    }

    #[test]
    fn test_setup_detected_for_other_exercise_ignored() {
        let config = EngineConfig { lab_mode: true, ..Default::default() };
        let (mut m, now) = machine(config);
        let ready = m.handle(SessionEvent::Tap, now).countdown.unwrap();
        m.handle(SessionEvent::TimerElapsed { generation: ready.generation }, now + secs(5.0));
        let other = ExerciseIdentity::parse("resistanceTargeted:legs/leg-press").unwrap();
        let outcome = m.handle(
            SessionEvent::SetupDetected { identity: other, probability: 1.0 },
            now + secs(20.0),
        );
        assert!(!outcome.changed);
        assert_eq!(m.state().name(), "Setup");
    }

    #[test]
    fn test_edit_then_confirm_uses_edits() {
        let (mut m, now) = machine(EngineConfig::default());
        let started = start_exercise(&mut m, now);
        m.handle(SessionEvent::ExerciseEnded, started + secs(20.0));
        let edited = vec![ExerciseLabel::Weight(12.5), ExerciseLabel::Repetitions(10)];
        let outcome = m.handle(SessionEvent::EditLabels(edited.clone()), started + secs(21.0));
        assert!(outcome.countdown.is_some());
        assert_eq!(m.state().labels(), edited.as_slice());
        // nothing trained yet
        assert!(m.engine().session().exercises.is_empty());

        let confirmed = m.handle(SessionEvent::Tap, started + secs(22.0)).confirmed.unwrap();
        assert_eq!(confirmed.labels, edited);
    }

    #[test]
    fn test_done_timeout_auto_confirms() {
        let (mut m, now) = machine(EngineConfig::default());
        let started = start_exercise(&mut m, now);
        let done = m.handle(SessionEvent::Tap, started + secs(10.0)).countdown.unwrap();
        let outcome = m.handle(
            SessionEvent::TimerElapsed { generation: done.generation },
            started + secs(25.0),
        );
        assert!(outcome.confirmed.is_some());
        assert_eq!(m.state().name(), "ComingUp");
        assert_eq!(m.engine().session().exercises.len(), 1);
    }

    #[test]
    fn test_done_timeout_discards_when_configured() {
        let config = EngineConfig { auto_confirm_on_timeout: false, ..Default::default() };
        let (mut m, now) = machine(config);
        let started = start_exercise(&mut m, now);
        let done = m.handle(SessionEvent::Tap, started + secs(10.0)).countdown.unwrap();
        let outcome = m.handle(
            SessionEvent::TimerElapsed { generation: done.generation },
            started + secs(25.0),
        );
        assert!(outcome.confirmed.is_none());
        assert_eq!(m.state().name(), "ComingUp");
        assert!(m.engine().session().exercises.is_empty());
    }

    #[test]
    fn test_exercise_timer_does_not_end_exercise() {
        let (mut m, now) = machine(EngineConfig::default());
        start_exercise(&mut m, now);
        let generation = m.generation();
        let outcome = m.handle(SessionEvent::TimerElapsed { generation }, now + secs(60.0));
        assert!(!outcome.changed);
        assert_eq!(m.state().name(), "InExercise");
    }

    #[test]
    fn test_long_press_ends_session() {
        let (mut m, now) = machine(EngineConfig::default());
        let outcome = m.handle(SessionEvent::LongPress, now + secs(1.0));
        assert!(outcome.ended);
        assert!(m.state().is_idle());
        assert!(m.engine().session().is_closed());
        assert!(m.engine().hint().is_none());

        // terminal
        assert!(!m.handle(SessionEvent::Tap, now + secs(2.0)).changed);
        assert!(m.state().is_idle());
    }

    #[test]
    fn test_end_during_exercise_discards_hint() {
        let (mut m, now) = machine(EngineConfig::default());
        start_exercise(&mut m, now);
        assert!(m.engine().hint().is_some());
        m.handle(SessionEvent::End, now + secs(8.0));
        assert!(m.engine().hint().is_none());
        assert!(m.engine().session().exercises.is_empty());
    }

    #[test]
    fn test_explicit_start_skips_countdown() {
        let (mut m, now) = machine(EngineConfig::default());
        m.handle(SessionEvent::Tap, now);
        let outcome = m.handle(SessionEvent::ExerciseStarted, now + secs(1.0));
        assert!(outcome.changed);
        assert_eq!(m.state().name(), "InExercise");

        m.handle(SessionEvent::ExerciseEnded, now + secs(20.0));
        m.handle(SessionEvent::Tap, now + secs(21.0));

        // straight from ComingUp too
        m.handle(SessionEvent::ExerciseStarted, now + secs(30.0));
        assert_eq!(m.state().name(), "InExercise");
    }

    #[test]
    fn test_rest_duration_measured_from_done() {
        let (mut m, now) = machine(EngineConfig::default());
        let started = start_exercise(&mut m, now);
        m.handle(SessionEvent::Tap, started + secs(10.0));
        let left_done = started + secs(12.0);
        m.handle(SessionEvent::Tap, left_done);
        m.handle(SessionEvent::Tap, left_done + secs(45.0));
        match m.state() {
            SessionState::Ready { rest_secs: Some(rest), .. } => assert!((rest - 45.0).abs() < 0.01),
            other => panic!("Expected Ready with rest, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_exercise_follows_state() {
        let (mut m, now) = machine(EngineConfig::default());
        let pending = m.pending_exercise().unwrap();
        let candidate = m.state().exercise().unwrap().identity.clone();
        assert_eq!(pending.identity(), &candidate);
        assert_eq!(pending.labels().len(), 3);
        assert!(pending.as_labelled().is_none());

        m.handle(SessionEvent::LongPress, now);
        assert!(m.pending_exercise().is_none());
    }
}
