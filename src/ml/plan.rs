//! Markov plans - first-order transition models over exercises or templates

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::exercises::{ExerciseIdentity, ExerciseType};

const BLOB_VERSION: u32 = 1;

/// Observed transition statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transition {
    pub count: u64,
    /// Sequence number of the latest insert that produced this transition
    pub last_seen: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransitionRecord<S> {
    from: S,
    to: S,
    count: u64,
    last_seen: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: DeserializeOwned"))]
struct PlanBlob<S> {
    version: u32,
    sequence: u64,
    last: Option<S>,
    #[serde(default)]
    recent: Vec<S>,
    #[serde(default)]
    transitions: Vec<TransitionRecord<S>>,
}

/// Order-1 Markov chain over states `S`
///
/// Counts are maintained incrementally on insert and equal a full recount of
/// the insert log. Only a bounded window of recent states is kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkovPlan<S: Ord> {
    transitions: BTreeMap<S, BTreeMap<S, Transition>>,
    last: Option<S>,
    recent: VecDeque<S>,
    window: usize,
    sequence: u64,
}

impl<S> MarkovPlan<S>
where
    S: Clone + Ord + Debug + Serialize + DeserializeOwned,
{
    pub fn new(window: usize) -> Self {
        Self {
            transitions: BTreeMap::new(),
            last: None,
            recent: VecDeque::new(),
            window: window.max(1),
            sequence: 0,
        }
    }

    /// Appends a state, counting the transition from the previous one
    pub fn insert(&mut self, state: S) {
        self.sequence += 1;
        if let Some(previous) = self.last.take() {
            let transition = self
                .transitions
                .entry(previous)
                .or_default()
                .entry(state.clone())
                .or_default();
            transition.count += 1;
            transition.last_seen = self.sequence;
        }
        self.recent.push_back(state.clone());
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        self.last = Some(state);
    }

    /// Likely successors of the last inserted state
    pub fn next(&self, limit: usize) -> Vec<S> {
        match &self.last {
            Some(last) => self.next_after(last, limit),
            None => Vec::new(),
        }
    }

    /// Successors of `state`, most frequent first, ties by most recent
    pub fn next_after(&self, state: &S, limit: usize) -> Vec<S> {
        let Some(successors) = self.transitions.get(state) else {
            return Vec::new();
        };
        let mut ranked: Vec<(&S, &Transition)> = successors.iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.count.cmp(&a.count).then(b.last_seen.cmp(&a.last_seen))
        });
        ranked.into_iter().take(limit).map(|(s, _)| s.clone()).collect()
    }

    pub fn transition(&self, from: &S, to: &S) -> Option<Transition> {
        self.transitions.get(from).and_then(|m| m.get(to)).copied()
    }

    pub fn last(&self) -> Option<&S> {
        self.last.as_ref()
    }

    /// Most recent states, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &S> {
        self.recent.iter()
    }

    /// Total number of inserts ever made
    pub fn len(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.sequence == 0
    }

    /// Forgets the current predecessor, e.g. when a new session starts
    pub fn reset_position(&mut self) {
        self.last = None;
    }

    pub fn encode(&self) -> Vec<u8> {
        let transitions = self
            .transitions
            .iter()
            .flat_map(|(from, successors)| {
                successors.iter().map(move |(to, t)| TransitionRecord {
                    from: from.clone(),
                    to: to.clone(),
                    count: t.count,
                    last_seen: t.last_seen,
                })
            })
            .collect();
        let blob = PlanBlob {
            version: BLOB_VERSION,
            sequence: self.sequence,
            last: self.last.clone(),
            recent: self.recent.iter().cloned().collect(),
            transitions,
        };
        serde_json::to_vec(&blob).unwrap_or_default()
    }

    pub fn decode(data: &[u8], window: usize) -> anyhow::Result<Self> {
        let blob: PlanBlob<S> = serde_json::from_slice(data)?;
        if blob.version > BLOB_VERSION {
            debug!("Reading plan blob version {} with reader {}", blob.version, BLOB_VERSION);
        }
        let mut plan = Self::new(window);
        plan.sequence = blob.sequence;
        plan.last = blob.last;
        plan.recent = blob.recent.into_iter().collect();
        while plan.recent.len() > plan.window {
            plan.recent.pop_front();
        }
        for record in blob.transitions {
            plan.transitions.entry(record.from).or_default().insert(
                record.to,
                Transition { count: record.count, last_seen: record.last_seen },
            );
        }
        Ok(plan)
    }

    /// Decodes `data`, or returns an empty plan when it is corrupt
    pub fn decode_or_default(data: &[u8], window: usize) -> Self {
        Self::decode(data, window).unwrap_or_else(|e| {
            warn!("Corrupt plan blob ({}); starting empty", e);
            Self::new(window)
        })
    }
}

/// Learns which template the user picks after which, across sessions
pub type SessionPlan = MarkovPlan<String>;

#[derive(Debug, Serialize, Deserialize)]
struct ExercisePlanBlob {
    id: String,
    name: String,
    exercise_type: ExerciseType,
    #[serde(default)]
    plan: Vec<u8>,
}

/// Exercise sequence model with its template metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ExercisePlan {
    pub id: String,
    pub name: String,
    pub exercise_type: ExerciseType,
    pub plan: MarkovPlan<ExerciseIdentity>,
}

impl ExercisePlan {
    pub fn new(id: impl Into<String>, name: impl Into<String>, exercise_type: ExerciseType, window: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            exercise_type,
            plan: MarkovPlan::new(window),
        }
    }

    /// Plan for a session started without a template
    pub fn ad_hoc(exercise_type: ExerciseType, window: usize) -> Self {
        let id = format!("adhoc-{:016x}", rand::random::<u64>());
        let name = exercise_type.name();
        Self::new(id, name, exercise_type, window)
    }

    pub fn insert(&mut self, identity: ExerciseIdentity) {
        self.plan.insert(identity);
    }

    pub fn next(&self, limit: usize) -> Vec<ExerciseIdentity> {
        self.plan.next(limit)
    }

    pub fn encode(&self) -> Vec<u8> {
        let blob = ExercisePlanBlob {
            id: self.id.clone(),
            name: self.name.clone(),
            exercise_type: self.exercise_type.clone(),
            plan: self.plan.encode(),
        };
        serde_json::to_vec(&blob).unwrap_or_default()
    }

    pub fn decode(data: &[u8], window: usize) -> anyhow::Result<Self> {
        let blob: ExercisePlanBlob = serde_json::from_slice(data)?;
        Ok(Self {
            id: blob.id,
            name: blob.name,
            exercise_type: blob.exercise_type,
            plan: MarkovPlan::decode_or_default(&blob.plan, window),
        })
    }

    /// Decodes `data`, or starts an ad-hoc plan for `exercise_type` when it is corrupt
    pub fn decode_or_default(data: &[u8], exercise_type: &ExerciseType, window: usize) -> Self {
        Self::decode(data, window).unwrap_or_else(|e| {
            warn!("Corrupt exercise plan blob ({}); starting ad hoc", e);
            Self::ad_hoc(exercise_type.clone(), window)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::MuscleGroup;

    fn id(name: &str) -> ExerciseIdentity {
        ExerciseIdentity::parse(format!("resistanceTargeted:arms/{name}")).unwrap()
    }

    #[test]
    fn test_fresh_plan_predicts_nothing() {
        let plan: MarkovPlan<String> = MarkovPlan::new(16);
        assert!(plan.next(5).is_empty());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_ranked_by_count_then_recency() {
        let mut plan = MarkovPlan::new(16);
        for s in ["a", "b", "a", "c", "a", "b", "a", "d"] {
            plan.insert(s.to_string());
        }
        // a -> b twice, a -> c once, a -> d once (most recent)
        assert_eq!(plan.next_after(&"a".to_string(), 5), vec!["b", "d", "c"]);
        assert_eq!(plan.next_after(&"a".to_string(), 1), vec!["b"]);
        // last is d, never seen as a predecessor
        assert!(plan.next(5).is_empty());
    }

    #[test]
    fn test_no_self_loop_unless_observed() {
        let mut plan = MarkovPlan::new(16);
        plan.insert("a".to_string());
        plan.insert("b".to_string());
        plan.insert("a".to_string());
        assert_eq!(plan.next(5), vec!["b"]);
        plan.insert("a".to_string());
        // a -> a just observed, tied on count with a -> b but more recent
        assert_eq!(plan.next(5), vec!["a", "b"]);
    }

    #[test]
    fn test_prediction_uses_only_earlier_inserts() {
        let mut plan = MarkovPlan::new(16);
        plan.insert("a".to_string());
        let before = plan.next(5);
        plan.insert("b".to_string());
        assert!(before.is_empty());
        assert_eq!(plan.next_after(&"a".to_string(), 5), vec!["b"]);
    }

    #[test]
    fn test_window_bounds_recent_but_not_counts() {
        let mut plan = MarkovPlan::new(2);
        for _ in 0..10 {
            plan.insert("a".to_string());
            plan.insert("b".to_string());
        }
        assert_eq!(plan.recent().count(), 2);
        assert_eq!(plan.transition(&"a".to_string(), &"b".to_string()).unwrap().count, 10);
        assert_eq!(plan.len(), 20);
    }

    #[test]
    fn test_encode_preserves_counts() {
        let mut plan = MarkovPlan::new(2);
        for s in ["a", "b", "a", "b", "c", "a"] {
            plan.insert(s.to_string());
        }
        let restored = MarkovPlan::<String>::decode(&plan.encode(), 2).unwrap();
        assert_eq!(restored, plan);
        assert_eq!(restored.next(5), plan.next(5));
    }

    #[test]
    fn test_corrupt_plan_starts_empty() {
        let plan = MarkovPlan::<String>::decode_or_default(b"[1,2", 8);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_exercise_plan_ad_hoc() {
        let ty = ExerciseType::targeted([MuscleGroup::Arms]);
        let first = ExercisePlan::ad_hoc(ty.clone(), 16);
        let second = ExercisePlan::ad_hoc(ty.clone(), 16);
        assert_ne!(first.id, second.id);
        assert_eq!(first.name, "arms");
        assert_eq!(first.exercise_type, ty);
    }

    #[test]
    fn test_exercise_plan_round_trip() {
        let mut plan = ExercisePlan::new("t1", "Arms day", ExerciseType::targeted([MuscleGroup::Arms]), 16);
        plan.insert(id("biceps-curl"));
        plan.insert(id("triceps-extension"));
        plan.insert(id("biceps-curl"));

        let restored = ExercisePlan::decode(&plan.encode(), 16).unwrap();
        assert_eq!(restored, plan);
        assert_eq!(restored.next(3), vec![id("triceps-extension")]);
    }
}
