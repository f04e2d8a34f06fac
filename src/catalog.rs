//! Exercise catalog - the exercises a location offers

use crate::exercises::{ExerciseDetail, ExerciseIdentity, ExerciseProperty, ExerciseType, Muscle};

/// Lookup of exercise details by type or identity
pub trait ExerciseCatalog {
    /// Details for the exercises of a session type, in catalog order
    fn exercise_details_for(&self, exercise_type: &ExerciseType) -> Vec<ExerciseDetail>;

    fn detail(&self, identity: &ExerciseIdentity) -> Option<ExerciseDetail>;

    /// Every exercise at the location
    fn all_details(&self) -> Vec<ExerciseDetail>;

    /// Catalog detail, or a permissive one for identities the catalog does not know
    fn detail_or_permissive(&self, identity: &ExerciseIdentity) -> ExerciseDetail {
        self.detail(identity)
            .unwrap_or_else(|| ExerciseDetail::permissive(identity.clone()))
    }
}

/// Static catalog row
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub muscle: Option<Muscle>,
    /// (minimum, step, maximum)
    pub weights: Option<(f64, f64, Option<f64>)>,
}

const DUMBBELLS: Option<(f64, f64, Option<f64>)> = Some((2.5, 2.5, Some(50.0)));
const BARBELL: Option<(f64, f64, Option<f64>)> = Some((20.0, 2.5, Some(200.0)));
const CABLE: Option<(f64, f64, Option<f64>)> = Some((5.0, 5.0, Some(100.0)));
const MACHINE: Option<(f64, f64, Option<f64>)> = Some((10.0, 5.0, Some(250.0)));

/// Default gym catalog
pub const EXERCISES: &[CatalogEntry] = &[
    // Arms
    CatalogEntry { id: "resistanceTargeted:arms/dumbbell-biceps-curl", muscle: Some(Muscle::Biceps), weights: DUMBBELLS },
    CatalogEntry { id: "resistanceTargeted:arms/cable-biceps-curl", muscle: Some(Muscle::Biceps), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:arms/cable-hammer-curl", muscle: Some(Muscle::Biceps), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:arms/overhead-cable-curl", muscle: Some(Muscle::Biceps), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:arms/reverse-cable-curl", muscle: Some(Muscle::Forearm), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:arms/cable-triceps-pushdown", muscle: Some(Muscle::Triceps), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:arms/trx-biceps-curl", muscle: Some(Muscle::Biceps), weights: None },
    CatalogEntry { id: "resistanceTargeted:arms/trx-triceps-press", muscle: Some(Muscle::Triceps), weights: None },
    // Chest
    CatalogEntry { id: "resistanceTargeted:chest/barbell-bench-press", muscle: Some(Muscle::Pectoralis), weights: BARBELL },
    CatalogEntry { id: "resistanceTargeted:chest/dumbbell-flyes", muscle: Some(Muscle::Pectoralis), weights: DUMBBELLS },
    CatalogEntry { id: "resistanceTargeted:chest/cable-crossover", muscle: Some(Muscle::Pectoralis), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:chest/trx-chest-press", muscle: Some(Muscle::Pectoralis), weights: None },
    // Shoulders
    CatalogEntry { id: "resistanceTargeted:shoulders/dumbbell-shoulder-press", muscle: Some(Muscle::Deltoid), weights: DUMBBELLS },
    CatalogEntry { id: "resistanceTargeted:shoulders/cable-standing-row", muscle: Some(Muscle::Trapezius), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:shoulders/trx-y-deltoid-raises", muscle: Some(Muscle::Deltoid), weights: None },
    // Back
    CatalogEntry { id: "resistanceTargeted:back/cable-row", muscle: Some(Muscle::Lats), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:back/lat-pulldown", muscle: Some(Muscle::Lats), weights: MACHINE },
    // Core
    CatalogEntry { id: "resistanceTargeted:core/crunches", muscle: Some(Muscle::Abs), weights: None },
    CatalogEntry { id: "resistanceTargeted:core/russian-twist", muscle: Some(Muscle::Abs), weights: DUMBBELLS },
    CatalogEntry { id: "resistanceTargeted:core/cable-wood-chop", muscle: Some(Muscle::Abs), weights: CABLE },
    CatalogEntry { id: "resistanceTargeted:core/dragonfly", muscle: Some(Muscle::Abs), weights: None },
    CatalogEntry { id: "resistanceTargeted:core/trx-side-plank", muscle: Some(Muscle::Abs), weights: None },
    // Legs
    CatalogEntry { id: "resistanceTargeted:legs/barbell-squat", muscle: Some(Muscle::Quadriceps), weights: BARBELL },
    CatalogEntry { id: "resistanceTargeted:legs/barbell-deadlift", muscle: Some(Muscle::Hamstrings), weights: BARBELL },
    CatalogEntry { id: "resistanceTargeted:legs/leg-press", muscle: Some(Muscle::Quadriceps), weights: MACHINE },
    CatalogEntry { id: "resistanceTargeted:legs/lunges", muscle: Some(Muscle::Glutes), weights: DUMBBELLS },
    CatalogEntry { id: "resistanceTargeted:legs/sumo-squat", muscle: Some(Muscle::Glutes), weights: DUMBBELLS },
    CatalogEntry { id: "resistanceTargeted:legs/dumbbell-calf-raise", muscle: Some(Muscle::Calves), weights: DUMBBELLS },
    CatalogEntry { id: "resistanceTargeted:legs/trx-hamstring-curl", muscle: Some(Muscle::Hamstrings), weights: None },
    // Whole body
    CatalogEntry { id: "resistanceWholeBody:burpee", muscle: None, weights: None },
    CatalogEntry { id: "resistanceWholeBody:kettlebell-swing", muscle: None, weights: Some((8.0, 4.0, Some(48.0))) },
    // Cardio
    CatalogEntry { id: "indoorsCardio:treadmill", muscle: None, weights: None },
    CatalogEntry { id: "indoorsCardio:cross-trainer", muscle: None, weights: None },
    CatalogEntry { id: "indoorsCardio:spinning", muscle: None, weights: None },
];

impl CatalogEntry {
    pub fn to_detail(&self) -> Option<ExerciseDetail> {
        let identity = ExerciseIdentity::parse(self.id).ok()?;
        let mut detail = ExerciseDetail::permissive(identity);
        detail.muscle = self.muscle;
        if let Some((minimum, step, maximum)) = self.weights {
            detail.properties.push(ExerciseProperty::WeightProgression { minimum, step, maximum });
        }
        Some(detail)
    }
}

/// Whether an exercise of `detail_type` belongs in a session of `session_type`
pub fn belongs_to(detail_type: &ExerciseType, session_type: &ExerciseType) -> bool {
    match session_type {
        // whole-body sessions take any resistance exercise
        ExerciseType::ResistanceWholeBody => !matches!(detail_type, ExerciseType::IndoorsCardio),
        ExerciseType::IndoorsCardio => matches!(detail_type, ExerciseType::IndoorsCardio),
        ExerciseType::ResistanceTargeted { muscle_groups } => detail_type
            .muscle_groups()
            .iter()
            .any(|mg| muscle_groups.contains(mg)),
    }
}

/// Catalog over a list of details, [`EXERCISES`] by default
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    details: Vec<ExerciseDetail>,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(EXERCISES.iter().filter_map(CatalogEntry::to_detail).collect())
    }
}

impl StaticCatalog {
    pub fn new(details: Vec<ExerciseDetail>) -> Self {
        Self { details }
    }

    pub fn all(&self) -> &[ExerciseDetail] {
        &self.details
    }

    /// Alternatives of an exercise within the catalog
    pub fn alternatives(&self, detail: &ExerciseDetail) -> Vec<&ExerciseDetail> {
        self.details
            .iter()
            .filter(|d| d.identity != detail.identity && d.is_alternative_of(detail))
            .collect()
    }
}

impl ExerciseCatalog for StaticCatalog {
    fn exercise_details_for(&self, exercise_type: &ExerciseType) -> Vec<ExerciseDetail> {
        self.details
            .iter()
            .filter(|d| belongs_to(&d.exercise_type, exercise_type))
            .cloned()
            .collect()
    }

    fn detail(&self, identity: &ExerciseIdentity) -> Option<ExerciseDetail> {
        self.details.iter().find(|d| &d.identity == identity).cloned()
    }

    fn all_details(&self) -> Vec<ExerciseDetail> {
        self.details.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::MuscleGroup;

    #[test]
    fn test_all_entries_parse() {
        let catalog = StaticCatalog::default();
        assert_eq!(catalog.all().len(), EXERCISES.len());
    }

    #[test]
    fn test_targeted_details() {
        let catalog = StaticCatalog::default();
        let arms = catalog.exercise_details_for(&ExerciseType::targeted([MuscleGroup::Arms]));
        assert!(!arms.is_empty());
        assert!(arms.iter().all(|d| d.exercise_type.muscle_groups() == [MuscleGroup::Arms]));

        let upper = catalog.exercise_details_for(&ExerciseType::targeted([MuscleGroup::Arms, MuscleGroup::Chest]));
        assert!(upper.len() > arms.len());
    }

    #[test]
    fn test_cardio_and_whole_body() {
        let catalog = StaticCatalog::default();
        let cardio = catalog.exercise_details_for(&ExerciseType::IndoorsCardio);
        assert_eq!(cardio.len(), 3);
        assert!(cardio.iter().all(|d| d.labels == vec![crate::exercises::LabelDescriptor::Intensity]));

        let whole = catalog.exercise_details_for(&ExerciseType::ResistanceWholeBody);
        assert_eq!(whole.len(), EXERCISES.len() - 3);
    }

    #[test]
    fn test_detail_lookup() {
        let catalog = StaticCatalog::default();
        let squat = ExerciseIdentity::parse("resistanceTargeted:legs/barbell-squat").unwrap();
        let detail = catalog.detail(&squat).unwrap();
        assert_eq!(detail.weight_progression(), Some((20.0, 2.5, Some(200.0))));

        let unknown = ExerciseIdentity::parse("resistanceTargeted:legs/pistol-squat").unwrap();
        assert!(catalog.detail(&unknown).is_none());
        let permissive = catalog.detail_or_permissive(&unknown);
        assert!(permissive.properties.is_empty());
        assert_eq!(permissive.labels.len(), 3);
    }

    #[test]
    fn test_alternatives_share_muscle() {
        let catalog = StaticCatalog::default();
        let curl = catalog
            .detail(&ExerciseIdentity::parse("resistanceTargeted:arms/dumbbell-biceps-curl").unwrap())
            .unwrap();
        let alternatives = catalog.alternatives(&curl);
        assert!(!alternatives.is_empty());
        assert!(alternatives.iter().all(|d| d.muscle == Some(Muscle::Biceps)));
    }
}
