//! Exercise definitions - identities, types, labels and details
//!
//! An exercise identity is a string key shaped like
//! `type:muscle,groups/exercise-name[@station]`, for example
//! `resistanceTargeted:arms/biceps-curl` or `resistanceWholeBody:burpee@mat`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing identities and types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("exercise identity `{0}` has no type prefix")]
    MissingType(String),
    #[error("unknown exercise type `{0}`")]
    UnknownType(String),
    #[error("targeted exercise `{0}` names no known muscle group")]
    NoMuscleGroups(String),
    #[error("exercise identity `{0}` has an empty name")]
    EmptyName(String),
}

/// Muscle groups addressed by targeted resistance exercises
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MuscleGroup {
    Arms,
    Back,
    Chest,
    Core,
    Legs,
    Shoulders,
}

impl MuscleGroup {
    pub fn id(&self) -> &'static str {
        match self {
            MuscleGroup::Arms => "arms",
            MuscleGroup::Back => "back",
            MuscleGroup::Chest => "chest",
            MuscleGroup::Core => "core",
            MuscleGroup::Legs => "legs",
            MuscleGroup::Shoulders => "shoulders",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|mg| mg.id() == id)
    }

    /// All muscle groups for iteration
    pub fn all() -> &'static [MuscleGroup] {
        &[
            MuscleGroup::Arms,
            MuscleGroup::Back,
            MuscleGroup::Chest,
            MuscleGroup::Core,
            MuscleGroup::Legs,
            MuscleGroup::Shoulders,
        ]
    }
}

/// Individual muscles, finer than [`MuscleGroup`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Muscle {
    Biceps,
    Triceps,
    Forearm,
    Deltoid,
    Trapezius,
    Pectoralis,
    Lats,
    Abs,
    Quadriceps,
    Hamstrings,
    Glutes,
    Calves,
}

/// The exercise type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ExerciseType {
    /// Treadmill, cross-trainer, spinning
    IndoorsCardio,
    /// Targets all muscle groups
    ResistanceWholeBody,
    /// Targets the listed muscle groups (kept sorted and unique)
    ResistanceTargeted { muscle_groups: Vec<MuscleGroup> },
}

impl ExerciseType {
    pub const INDOORS_CARDIO: &'static str = "indoorsCardio";
    pub const RESISTANCE_WHOLE_BODY: &'static str = "resistanceWholeBody";
    pub const RESISTANCE_TARGETED: &'static str = "resistanceTargeted";

    /// Targeted type with normalised muscle groups
    pub fn targeted(muscle_groups: impl IntoIterator<Item = MuscleGroup>) -> Self {
        let mut muscle_groups: Vec<_> = muscle_groups.into_iter().collect();
        muscle_groups.sort();
        muscle_groups.dedup();
        ExerciseType::ResistanceTargeted { muscle_groups }
    }

    /// Type identity, the part before the colon in an exercise identity
    pub fn id(&self) -> &'static str {
        match self {
            ExerciseType::IndoorsCardio => Self::INDOORS_CARDIO,
            ExerciseType::ResistanceWholeBody => Self::RESISTANCE_WHOLE_BODY,
            ExerciseType::ResistanceTargeted { .. } => Self::RESISTANCE_TARGETED,
        }
    }

    pub fn muscle_groups(&self) -> &[MuscleGroup] {
        match self {
            ExerciseType::ResistanceTargeted { muscle_groups } => muscle_groups,
            _ => &[],
        }
    }

    /// Display name used for ad-hoc plans
    pub fn name(&self) -> String {
        match self {
            ExerciseType::IndoorsCardio => "Cardio".to_string(),
            ExerciseType::ResistanceWholeBody => "Whole body".to_string(),
            ExerciseType::ResistanceTargeted { muscle_groups } => muscle_groups
                .iter()
                .map(|mg| mg.id())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// A less specific type: `[a, b, c]` becomes `[a, b]`
    pub fn more_general(&self) -> Option<ExerciseType> {
        match self {
            ExerciseType::ResistanceTargeted { muscle_groups } if muscle_groups.len() > 1 => {
                Some(ExerciseType::ResistanceTargeted {
                    muscle_groups: muscle_groups[..muscle_groups.len() - 1].to_vec(),
                })
            }
            _ => None,
        }
    }

    /// True when every muscle group of `self` is also covered by `other`
    pub fn is_covered_by(&self, other: &ExerciseType) -> bool {
        match (self, other) {
            (
                ExerciseType::ResistanceTargeted { muscle_groups: left },
                ExerciseType::ResistanceTargeted { muscle_groups: right },
            ) => left.iter().all(|mg| right.contains(mg)),
            _ => self == other,
        }
    }

    /// The labels an exercise of this type reports by default
    pub fn label_descriptors(&self) -> Vec<LabelDescriptor> {
        match self {
            ExerciseType::IndoorsCardio => vec![LabelDescriptor::Intensity],
            _ => vec![
                LabelDescriptor::Weight,
                LabelDescriptor::Repetitions,
                LabelDescriptor::Intensity,
            ],
        }
    }

    /// Prefix shared by the identities of this type, e.g. `resistanceTargeted:arms,chest`
    pub fn identity_prefix(&self) -> String {
        match self {
            ExerciseType::ResistanceTargeted { muscle_groups } => {
                let groups: Vec<_> = muscle_groups.iter().map(|mg| mg.id()).collect();
                format!("{}:{}", self.id(), groups.join(","))
            }
            _ => format!("{}:", self.id()),
        }
    }
}

impl FromStr for ExerciseType {
    type Err = IdentityError;

    /// Parses `indoorsCardio`, `resistanceWholeBody` or `resistanceTargeted:arms,chest`.
    /// Anything after a `/` is ignored, so full identities parse too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ty, rest) = s.split_once(':').unwrap_or((s, ""));
        match ty {
            Self::INDOORS_CARDIO => Ok(ExerciseType::IndoorsCardio),
            Self::RESISTANCE_WHOLE_BODY => Ok(ExerciseType::ResistanceWholeBody),
            Self::RESISTANCE_TARGETED => {
                let groups = rest.split('/').next().unwrap_or_default();
                let muscle_groups: Vec<_> = groups
                    .split(',')
                    .filter_map(|g| MuscleGroup::from_id(g.trim()))
                    .collect();
                if muscle_groups.is_empty() {
                    return Err(IdentityError::NoMuscleGroups(s.to_string()));
                }
                Ok(ExerciseType::targeted(muscle_groups))
            }
            other => Err(IdentityError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExerciseType::ResistanceTargeted { .. } => f.write_str(&self.identity_prefix()),
            _ => f.write_str(self.id()),
        }
    }
}

/// Components of a parsed exercise identity
#[derive(Debug, Clone, PartialEq, Eq)]
struct Components<'a> {
    ty: &'a str,
    groups: Option<&'a str>,
    name: &'a str,
    station: Option<&'a str>,
}

fn components(id: &str) -> Result<Components<'_>, IdentityError> {
    let (ty, rest) = id
        .split_once(':')
        .ok_or_else(|| IdentityError::MissingType(id.to_string()))?;
    let (groups, named) = match rest.rsplit_once('/') {
        Some((groups, named)) => (Some(groups), named),
        None => (None, rest),
    };
    let (name, station) = match named.split_once('@') {
        Some((name, station)) => (name, Some(station)),
        None => (named, None),
    };
    if name.is_empty() {
        return Err(IdentityError::EmptyName(id.to_string()));
    }
    Ok(Components { ty, groups, name, station })
}

fn type_of(id: &str) -> Result<ExerciseType, IdentityError> {
    let parts = components(id)?;
    match parts.groups {
        Some(groups) => format!("{}:{}", parts.ty, groups).parse(),
        None => parts.ty.parse(),
    }
}

/// Opaque exercise key; equality is exact string match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExerciseIdentity {
    id: String,
    exercise_type: ExerciseType,
}

impl ExerciseIdentity {
    /// Parse and validate an identity; every valid identity has exactly one type
    pub fn parse(id: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        let exercise_type = type_of(&id)?;
        Ok(Self { id, exercise_type })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn exercise_type(&self) -> ExerciseType {
        self.exercise_type.clone()
    }

    pub fn muscle_groups(&self) -> Vec<MuscleGroup> {
        self.exercise_type().muscle_groups().to_vec()
    }

    /// The exercise name without type, muscle groups or station
    pub fn name(&self) -> &str {
        components(&self.id).map(|c| c.name).unwrap_or(&self.id)
    }

    pub fn station(&self) -> Option<&str> {
        components(&self.id).ok().and_then(|c| c.station)
    }

    /// Human readable title: `biceps-curl` becomes `Biceps curl`
    pub fn title(&self) -> String {
        let spaced = self.name().replace(['-', '_'], " ");
        let mut chars = spaced.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl FromStr for ExerciseIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ExerciseIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ExerciseIdentity> for String {
    fn from(value: ExerciseIdentity) -> Self {
        value.id
    }
}

impl PartialEq for ExerciseIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExerciseIdentity {}

impl Hash for ExerciseIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ExerciseIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExerciseIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for ExerciseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// The kind of a label, independent of its value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LabelDescriptor {
    Weight,
    Repetitions,
    Intensity,
}

impl LabelDescriptor {
    pub fn id(&self) -> &'static str {
        match self {
            LabelDescriptor::Weight => "weight",
            LabelDescriptor::Repetitions => "repetitions",
            LabelDescriptor::Intensity => "intensity",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|d| d.id() == id)
    }

    pub fn all() -> &'static [LabelDescriptor] {
        &[
            LabelDescriptor::Weight,
            LabelDescriptor::Repetitions,
            LabelDescriptor::Intensity,
        ]
    }
}

impl FromStr for LabelDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| format!("unknown label `{s}`"))
    }
}

/// A user-facing numeric attribute of a completed set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ExerciseLabel {
    Weight(f64),
    Repetitions(u32),
    /// 0..=1
    Intensity(f64),
}

impl ExerciseLabel {
    pub fn descriptor(&self) -> LabelDescriptor {
        match self {
            ExerciseLabel::Weight(_) => LabelDescriptor::Weight,
            ExerciseLabel::Repetitions(_) => LabelDescriptor::Repetitions,
            ExerciseLabel::Intensity(_) => LabelDescriptor::Intensity,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            ExerciseLabel::Weight(w) => *w,
            ExerciseLabel::Repetitions(r) => f64::from(*r),
            ExerciseLabel::Intensity(i) => *i,
        }
    }

    /// Builds a label of the given kind from a raw scalar
    pub fn from_value(descriptor: LabelDescriptor, value: f64) -> Self {
        match descriptor {
            LabelDescriptor::Weight => ExerciseLabel::Weight(value.max(0.0)),
            LabelDescriptor::Repetitions => ExerciseLabel::Repetitions(value.max(0.0).floor() as u32),
            LabelDescriptor::Intensity => ExerciseLabel::Intensity(value.clamp(0.0, 1.0)),
        }
    }
}

impl fmt::Display for ExerciseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExerciseLabel::Weight(w) => write!(f, "{w:.1} kg"),
            ExerciseLabel::Repetitions(r) => write!(f, "{r} reps"),
            ExerciseLabel::Intensity(i) => write!(f, "{:.0}% intensity", i * 100.0),
        }
    }
}

/// Properties that parameterise an exercise
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ExerciseProperty {
    /// Weights available from `minimum` by `step` up to `maximum`
    WeightProgression {
        minimum: f64,
        step: f64,
        maximum: Option<f64>,
    },
}

/// Everything the engine knows about one exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDetail {
    pub identity: ExerciseIdentity,
    pub exercise_type: ExerciseType,
    pub muscle: Option<Muscle>,
    pub labels: Vec<LabelDescriptor>,
    pub properties: Vec<ExerciseProperty>,
}

impl ExerciseDetail {
    /// Detail with the default labels of the identity's type and no properties
    pub fn permissive(identity: ExerciseIdentity) -> Self {
        let exercise_type = identity.exercise_type();
        Self {
            labels: exercise_type.label_descriptors(),
            identity,
            exercise_type,
            muscle: None,
            properties: Vec::new(),
        }
    }

    pub fn weight_progression(&self) -> Option<(f64, f64, Option<f64>)> {
        self.properties.iter().find_map(|p| match p {
            ExerciseProperty::WeightProgression { minimum, step, maximum } => {
                Some((*minimum, *step, *maximum))
            }
        })
    }

    /// Two exercises are alternatives when they target the same muscle,
    /// or share the type for cardio and whole-body exercises
    pub fn is_alternative_of(&self, other: &ExerciseDetail) -> bool {
        match self.exercise_type {
            ExerciseType::ResistanceTargeted { .. } => {
                self.muscle.is_some() && self.muscle == other.muscle
            }
            _ => self.exercise_type == other.exercise_type,
        }
    }
}

/// Exercise recognised by the sensor classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedExercise {
    pub identity: ExerciseIdentity,
    pub confidence: f64,
    pub start: DateTime<Utc>,
    pub duration_secs: f64,
    pub labels: Vec<ExerciseLabel>,
}

/// Exercise the user confirmed, with its final labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledExercise {
    pub identity: ExerciseIdentity,
    pub start: DateTime<Utc>,
    pub duration_secs: f64,
    pub labels: Vec<ExerciseLabel>,
}

/// Exercise the user is about to perform, with predicted labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteExercise {
    pub identity: ExerciseIdentity,
    pub confidence: f64,
    pub labels: Vec<ExerciseLabel>,
}

/// Any exercise-like record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Exercise {
    Classified(ClassifiedExercise),
    Labelled(LabelledExercise),
    Incomplete(IncompleteExercise),
}

impl Exercise {
    pub fn identity(&self) -> &ExerciseIdentity {
        match self {
            Exercise::Classified(e) => &e.identity,
            Exercise::Labelled(e) => &e.identity,
            Exercise::Incomplete(e) => &e.identity,
        }
    }

    pub fn labels(&self) -> &[ExerciseLabel] {
        match self {
            Exercise::Classified(e) => &e.labels,
            Exercise::Labelled(e) => &e.labels,
            Exercise::Incomplete(e) => &e.labels,
        }
    }

    /// User-confirmed exercises are certain
    pub fn confidence(&self) -> f64 {
        match self {
            Exercise::Classified(e) => e.confidence,
            Exercise::Labelled(_) => 1.0,
            Exercise::Incomplete(e) => e.confidence,
        }
    }

    pub fn label(&self, descriptor: LabelDescriptor) -> Option<ExerciseLabel> {
        self.labels().iter().copied().find(|l| l.descriptor() == descriptor)
    }

    pub fn as_labelled(&self) -> Option<&LabelledExercise> {
        match self {
            Exercise::Labelled(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_serialises_as_its_key() {
        let id = ExerciseIdentity::parse("resistanceTargeted:arms/biceps-curl@cable").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"resistanceTargeted:arms/biceps-curl@cable\"");

        let restored: ExerciseIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, id);
        assert_eq!(restored.exercise_type(), ExerciseType::targeted([MuscleGroup::Arms]));
        assert!(serde_json::from_str::<ExerciseIdentity>("\"curl\"").is_err());

        let other = ExerciseIdentity::parse("resistanceTargeted:arms/biceps-curl").unwrap();
        assert!(other < id);
    }

    #[test]
    fn test_parse_targeted_identity() {
        let id = ExerciseIdentity::parse("resistanceTargeted:arms/biceps-curl").unwrap();
        assert_eq!(id.exercise_type(), ExerciseType::targeted([MuscleGroup::Arms]));
        assert_eq!(id.name(), "biceps-curl");
        assert_eq!(id.station(), None);
        assert_eq!(id.title(), "Biceps curl");
    }

    #[test]
    fn test_parse_identity_with_station() {
        let id = ExerciseIdentity::parse("resistanceTargeted:chest,arms/bench-press@rack-2").unwrap();
        assert_eq!(id.muscle_groups(), vec![MuscleGroup::Arms, MuscleGroup::Chest]);
        assert_eq!(id.name(), "bench-press");
        assert_eq!(id.station(), Some("rack-2"));
    }

    #[test]
    fn test_parse_untargeted_identities() {
        let cardio = ExerciseIdentity::parse("indoorsCardio:treadmill").unwrap();
        assert_eq!(cardio.exercise_type(), ExerciseType::IndoorsCardio);
        let whole = ExerciseIdentity::parse("resistanceWholeBody:burpee@mat").unwrap();
        assert_eq!(whole.exercise_type(), ExerciseType::ResistanceWholeBody);
        assert_eq!(whole.station(), Some("mat"));
    }

    #[test]
    fn test_parse_rejects_bad_identities() {
        assert!(matches!(
            ExerciseIdentity::parse("biceps-curl"),
            Err(IdentityError::MissingType(_))
        ));
        assert!(matches!(
            ExerciseIdentity::parse("yoga:arms/pose"),
            Err(IdentityError::UnknownType(_))
        ));
        assert!(matches!(
            ExerciseIdentity::parse("resistanceTargeted:wings/flap"),
            Err(IdentityError::NoMuscleGroups(_))
        ));
        assert!(matches!(
            ExerciseIdentity::parse("resistanceTargeted:arms/"),
            Err(IdentityError::EmptyName(_))
        ));
    }

    #[test]
    fn test_identity_serde_validates() {
        let ok: ExerciseIdentity = serde_json::from_str("\"indoorsCardio:bike\"").unwrap();
        assert_eq!(ok.as_str(), "indoorsCardio:bike");
        assert!(serde_json::from_str::<ExerciseIdentity>("\"nope\"").is_err());
    }

    #[test]
    fn test_exercise_type_round_trip_through_prefix() {
        let ty = ExerciseType::targeted([MuscleGroup::Chest, MuscleGroup::Arms]);
        assert_eq!(ty.identity_prefix(), "resistanceTargeted:arms,chest");
        assert_eq!(ty.identity_prefix().parse::<ExerciseType>().unwrap(), ty);
        assert_eq!(ty.name(), "arms, chest");
    }

    #[test]
    fn test_more_general_and_coverage() {
        let ty = ExerciseType::targeted([MuscleGroup::Arms, MuscleGroup::Back, MuscleGroup::Chest]);
        let general = ty.more_general().unwrap();
        assert_eq!(general, ExerciseType::targeted([MuscleGroup::Arms, MuscleGroup::Back]));
        assert!(general.is_covered_by(&ty));
        assert!(!ty.is_covered_by(&general));
        assert!(ExerciseType::IndoorsCardio.more_general().is_none());
    }

    #[test]
    fn test_label_values() {
        assert_eq!(ExerciseLabel::Repetitions(12).value(), 12.0);
        assert_eq!(ExerciseLabel::from_value(LabelDescriptor::Repetitions, 9.7), ExerciseLabel::Repetitions(9));
        assert_eq!(ExerciseLabel::from_value(LabelDescriptor::Intensity, 1.3), ExerciseLabel::Intensity(1.0));
        assert_eq!(ExerciseLabel::Weight(20.0).descriptor(), LabelDescriptor::Weight);
    }

    #[test]
    fn test_exercise_accessors() {
        let identity = ExerciseIdentity::parse("resistanceTargeted:arms/biceps-curl").unwrap();
        let exercise = Exercise::Incomplete(IncompleteExercise {
            identity: identity.clone(),
            confidence: 0.4,
            labels: vec![ExerciseLabel::Weight(12.5)],
        });
        assert_eq!(exercise.identity(), &identity);
        assert_eq!(exercise.confidence(), 0.4);
        assert_eq!(exercise.label(LabelDescriptor::Weight), Some(ExerciseLabel::Weight(12.5)));
        assert!(exercise.label(LabelDescriptor::Repetitions).is_none());
        assert!(exercise.as_labelled().is_none());
    }
}
