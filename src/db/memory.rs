//! In-memory store for tests, simulation and evaluation runs

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{Store, predictor_key};
use crate::achievements::Achievement;
use crate::exercises::ExerciseType;
use crate::ml::ExercisePlan;
use crate::session::Session;

struct StoredPlan {
    key: String,
    data: Vec<u8>,
    saved: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    predictors: HashMap<String, Vec<u8>>,
    plans: HashMap<String, StoredPlan>,
    session_plan: Option<Vec<u8>>,
    sessions: Vec<Session>,
    achievements: Vec<Achievement>,
    saves: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load_labels_predictor(&self, exercise_type: &ExerciseType, location: Option<&str>) -> Result<Option<Vec<u8>>> {
        Ok(self.predictors.get(&predictor_key(exercise_type, location)).cloned())
    }

    fn save_labels_predictor(&mut self, exercise_type: &ExerciseType, location: Option<&str>, data: &[u8]) -> Result<()> {
        self.predictors.insert(predictor_key(exercise_type, location), data.to_vec());
        Ok(())
    }

    fn load_exercise_plan(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.plans.get(id).map(|p| p.data.clone()))
    }

    fn latest_exercise_plan(&self, exercise_type: &ExerciseType, location: Option<&str>) -> Result<Option<Vec<u8>>> {
        let key = predictor_key(exercise_type, location);
        Ok(self
            .plans
            .values()
            .filter(|p| p.key == key)
            .max_by_key(|p| p.saved)
            .map(|p| p.data.clone()))
    }

    fn save_exercise_plan(&mut self, plan: &ExercisePlan, location: Option<&str>) -> Result<()> {
        self.saves += 1;
        self.plans.insert(
            plan.id.clone(),
            StoredPlan {
                key: predictor_key(&plan.exercise_type, location),
                data: plan.encode(),
                saved: self.saves,
            },
        );
        Ok(())
    }

    fn load_session_plan(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.session_plan.clone())
    }

    fn save_session_plan(&mut self, data: &[u8]) -> Result<()> {
        self.session_plan = Some(data.to_vec());
        Ok(())
    }

    fn save_session(&mut self, session: &Session) -> Result<()> {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => self.sessions.push(session.clone()),
        }
        Ok(())
    }

    fn sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let mut sessions = self.sessions.clone();
        sessions.sort_by(|a, b| b.start.cmp(&a.start));
        sessions.truncate(limit);
        Ok(sessions)
    }

    fn fetch_similar_sessions(&self, plan_id: &str, since: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut similar: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.is_closed() && s.start >= since && s.plan_id.as_deref() == Some(plan_id))
            .cloned()
            .collect();
        similar.sort_by(|a, b| b.start.cmp(&a.start));
        Ok(similar)
    }

    fn insert_achievement(&mut self, achievement: &Achievement) -> Result<bool> {
        if self
            .achievements
            .iter()
            .any(|a| a.plan_id == achievement.plan_id && a.name == achievement.name)
        {
            return Ok(false);
        }
        self.achievements.push(achievement.clone());
        Ok(true)
    }

    fn achievements(&self, plan_id: Option<&str>) -> Result<Vec<Achievement>> {
        let mut achievements: Vec<Achievement> = self
            .achievements
            .iter()
            .filter(|a| plan_id.is_none_or(|id| a.plan_id == id))
            .cloned()
            .collect();
        achievements.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(achievements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::MuscleGroup;

    #[test]
    fn test_latest_plan_per_type() {
        let arms = ExerciseType::targeted([MuscleGroup::Arms]);
        let mut store = MemoryStore::new();
        let first = ExercisePlan::new("a", "First", arms.clone(), 8);
        let mut second = ExercisePlan::new("b", "Second", arms.clone(), 8);
        second.insert("resistanceTargeted:arms/curl".parse().unwrap());
        store.save_exercise_plan(&first, None).unwrap();
        store.save_exercise_plan(&second, None).unwrap();

        let data = store.latest_exercise_plan(&arms, None).unwrap().unwrap();
        assert_eq!(ExercisePlan::decode(&data, 8).unwrap().id, "b");
        assert!(store.latest_exercise_plan(&arms, Some("gym")).unwrap().is_none());
        assert!(store.load_exercise_plan("a").unwrap().is_some());
    }
}
