//! Coach - starts and ends sessions against a store
//!
//! Loads the trained predictors and plans when a session starts and writes
//! them back, together with the closed session and any achievement, when it
//! ends. Events in between go to the session's state machine.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::achievements::{Achievement, AchievementAppraiser};
use crate::catalog::ExerciseCatalog;
use crate::config::EngineConfig;
use crate::db::Store;
use crate::evaluator::{Evaluation, ReferenceSession, SessionEvaluator};
use crate::exercises::{ExerciseLabel, ExerciseType, LabelledExercise};
use crate::ml::{ExercisePlan, LabelsPredictor, SessionPlan};
use crate::session::{Outcome, Session, SessionEngine, SessionEvent, SessionState, SessionStateMachine};

/// How far back sessions count towards an achievement
const SIMILAR_SESSIONS_DAYS: i64 = 7;

/// What a session follows
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStart {
    /// Free session of a type; reuses the type's latest plan
    AdHoc(ExerciseType),
    /// Stored exercise plan, by id
    Template(String),
}

/// A session that has been ended and persisted
#[derive(Debug, Clone)]
pub struct EndedSession {
    pub session: Session,
    pub achievement: Option<Achievement>,
}

pub struct Coach<S: Store> {
    store: S,
    catalog: Arc<dyn ExerciseCatalog + Send + Sync>,
    config: EngineConfig,
    session_plan: SessionPlan,
    appraiser: AchievementAppraiser,
    active: Option<SessionStateMachine>,
}

impl<S: Store> Coach<S> {
    pub fn new(store: S, catalog: Arc<dyn ExerciseCatalog + Send + Sync>, config: EngineConfig) -> Result<Self> {
        let session_plan = match store.load_session_plan()? {
            Some(data) => SessionPlan::decode_or_default(&data, config.plan_window),
            None => SessionPlan::new(config.plan_window),
        };
        Ok(Self {
            store,
            catalog,
            config,
            session_plan,
            appraiser: AchievementAppraiser,
            active: None,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Templates likely to follow the last session
    pub fn suggested_templates(&self, limit: usize) -> Vec<String> {
        self.session_plan.next(limit)
    }

    /// History of the type and its more general types, the most specific
    /// type and the location winning conflicts
    fn load_predictor(&self, exercise_type: &ExerciseType, location: Option<&str>) -> Result<LabelsPredictor> {
        let mut types = vec![exercise_type.clone()];
        while let Some(general) = types.last().and_then(ExerciseType::more_general) {
            types.push(general);
        }

        let mut labels = LabelsPredictor::new(self.config.max_history);
        for ty in types.iter().rev() {
            let locations = if location.is_some() { vec![None, location] } else { vec![None] };
            for at in locations {
                if let Some(data) = self.store.load_labels_predictor(ty, at)? {
                    debug!("Merging predictor of {} at {}", ty, at.unwrap_or("-"));
                    labels.merge_encoded(&data);
                }
            }
        }
        Ok(labels)
    }

    fn load_plan(&self, start: &SessionStart, location: Option<&str>) -> Result<ExercisePlan> {
        let window = self.config.plan_window;
        match start {
            SessionStart::Template(id) => {
                let data = self
                    .store
                    .load_exercise_plan(id)?
                    .with_context(|| format!("no exercise plan {}", id))?;
                ExercisePlan::decode(&data, window).with_context(|| format!("corrupt exercise plan {}", id))
            }
            SessionStart::AdHoc(exercise_type) => Ok(match self.store.latest_exercise_plan(exercise_type, location)? {
                Some(data) => ExercisePlan::decode_or_default(&data, exercise_type, window),
                None => ExercisePlan::ad_hoc(exercise_type.clone(), window),
            }),
        }
    }

    /// Starts a session and returns its id
    pub fn start_session(&mut self, start: SessionStart, location: Option<&str>, now: DateTime<Utc>) -> Result<String> {
        if let Some(active) = &self.active {
            bail!("session {} is still running", active.engine().session().id);
        }

        let plan = self.load_plan(&start, location)?;
        let labels = self.load_predictor(&plan.exercise_type, location)?;
        let mut session = Session::new(plan.exercise_type.clone(), now);
        session.plan_id = Some(plan.id.clone());
        session.plan_name = Some(plan.name.clone());
        session.location = location.map(str::to_string);
        let id = session.id.clone();

        info!("Starting session {} with plan {} ({})", id, plan.name, plan.id);
        let engine = SessionEngine::new(session, labels, plan, self.catalog.clone(), self.config.clone());
        self.active = Some(SessionStateMachine::new(engine, now));
        Ok(id)
    }

    pub fn active(&self) -> Option<&SessionStateMachine> {
        self.active.as_ref()
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.active.as_ref().map(|m| m.state())
    }

    fn machine(&mut self) -> Result<&mut SessionStateMachine> {
        self.active.as_mut().context("no session is running")
    }

    /// Passes an event to the running session
    pub fn handle(&mut self, event: SessionEvent, now: DateTime<Utc>) -> Result<Outcome> {
        Ok(self.machine()?.handle(event, now))
    }

    /// Explicit hint that the user started exercising
    pub fn begin_exercising(&mut self, now: DateTime<Utc>) -> Result<Outcome> {
        self.handle(SessionEvent::ExerciseStarted, now)
    }

    /// Explicit hint that the user stopped exercising
    pub fn end_exercising(&mut self, now: DateTime<Utc>) -> Result<Outcome> {
        self.handle(SessionEvent::ExerciseEnded, now)
    }

    /// Confirms the finished exercise with the user's labels
    pub fn confirm_exercise(&mut self, labels: Vec<ExerciseLabel>, now: DateTime<Utc>) -> Result<LabelledExercise> {
        let machine = self.machine()?;
        if !matches!(machine.state(), SessionState::Done { .. }) {
            bail!("nothing to confirm in state {}", machine.state().name());
        }
        machine.handle(SessionEvent::EditLabels(labels), now);
        machine
            .handle(SessionEvent::Tap, now)
            .confirmed
            .context("exercise was not confirmed")
    }

    /// Ends the running session and persists everything it trained
    pub fn end_session(&mut self, now: DateTime<Utc>) -> Result<EndedSession> {
        let mut machine = self.active.take().context("no session is running")?;
        machine.handle(SessionEvent::End, now);
        let mut engine = machine.into_engine();
        engine.close(now);
        let (session, labels, plan) = engine.into_parts();
        let location = session.location.as_deref();

        self.store
            .save_labels_predictor(&plan.exercise_type, location, &labels.encode())?;
        self.store.save_exercise_plan(&plan, location)?;
        self.store.save_session(&session)?;
        self.session_plan.insert(plan.id.clone());
        self.store.save_session_plan(&self.session_plan.encode())?;

        let achievement = self.appraise(&plan, now)?;
        info!(
            "Ended session {} ({} exercises{})",
            session.id,
            session.exercises.len(),
            if achievement.is_some() { ", achievement awarded" } else { "" }
        );
        Ok(EndedSession { session, achievement })
    }

    /// Runs a recorded session through an ad-hoc session of its type, scoring
    /// each prediction before confirming the recorded labels, then ends and
    /// persists it like a live session
    pub fn replay(
        &mut self,
        reference: &ReferenceSession,
        location: Option<&str>,
        start: DateTime<Utc>,
    ) -> Result<(Evaluation, EndedSession)> {
        self.start_session(SessionStart::AdHoc(reference.exercise_type.clone()), location, start)?;
        let evaluator = SessionEvaluator::new(reference, self.config.stupid_loss);
        let evaluation = evaluator.evaluate_at(self.machine()?.engine_mut(), start);
        let ended = self.end_session(evaluator.finished_at(start))?;
        Ok((evaluation, ended))
    }

    fn appraise(&mut self, plan: &ExercisePlan, now: DateTime<Utc>) -> Result<Option<Achievement>> {
        let since = (now - Duration::days(SIMILAR_SESSIONS_DAYS))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);
        let sessions = self.store.fetch_similar_sessions(&plan.id, since)?;
        let Some(name) = self.appraiser.appraise(&sessions, plan) else {
            debug!("No achievement for plan {} ({} sessions)", plan.id, sessions.len());
            return Ok(None);
        };
        let existing = self.store.achievements(Some(&plan.id))?;
        match self.appraiser.award(&existing, name, plan, now) {
            Some(achievement) if self.store.insert_achievement(&achievement)? => {
                info!("Awarded {} for {}", achievement.name, achievement.plan_name);
                Ok(Some(achievement))
            }
            _ => Ok(None),
        }
    }

    /// Names of the achievements earned with a template
    pub fn achievements_for(&self, plan_id: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .achievements(Some(plan_id))?
            .into_iter()
            .map(|a| a.name)
            .collect())
    }
}
