//! Achievements - badges for repeating the same workout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ml::ExercisePlan;
use crate::session::Session;

/// Awarded for completing the same template twice
pub const STAR: &str = "star";

/// Sessions of one template needed for a star
const STAR_THRESHOLD: usize = 2;

/// An awarded badge; never changes once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub name: String,
    pub plan_id: String,
    pub plan_name: String,
    pub date: DateTime<Utc>,
}

/// Decides whether the user deserves an achievement for a template
#[derive(Debug, Default, Clone, Copy)]
pub struct AchievementAppraiser;

impl AchievementAppraiser {
    /// Name of the achievement earned by `sessions` for `plan`, if any
    pub fn appraise(&self, sessions: &[Session], plan: &ExercisePlan) -> Option<&'static str> {
        let matching = sessions
            .iter()
            .filter(|s| s.is_closed() && s.plan_id.as_deref() == Some(plan.id.as_str()))
            .count();
        (matching >= STAR_THRESHOLD).then_some(STAR)
    }

    /// A new achievement unless `existing` already holds one with the same plan and name
    pub fn award(
        &self,
        existing: &[Achievement],
        name: &str,
        plan: &ExercisePlan,
        now: DateTime<Utc>,
    ) -> Option<Achievement> {
        if existing.iter().any(|a| a.plan_id == plan.id && a.name == name) {
            return None;
        }
        Some(Achievement {
            name: name.to_string(),
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            date: now,
        })
    }
}
