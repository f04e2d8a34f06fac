//! ML module - Label and sequence predictions
//!
//! Features:
//! - Per-exercise scalar regression using polynomial least squares (linfa)
//! - Rounding onto the values the user can select
//! - Markov plans for the next exercise and the next template

pub mod labels;
pub mod plan;
pub mod rounding;
pub mod scalar;

pub use labels::{LabelDefaults, LabelPrediction, LabelsPredictor};
pub use plan::{ExercisePlan, MarkovPlan, SessionPlan};
pub use rounding::ScalarKind;
pub use scalar::ScalarPredictor;
