//! setwise - adaptive exercise session engine
//!
//! Predicts the next exercise of a workout and the labels (weight,
//! repetitions, intensity) the user is likely to enter, and learns from every
//! confirmed set.

pub mod achievements;
pub mod catalog;
pub mod coach;
pub mod config;
pub mod db;
pub mod evaluator;
pub mod exercises;
pub mod ml;
pub mod session;

pub use catalog::{ExerciseCatalog, StaticCatalog};
pub use coach::{Coach, SessionStart};
pub use config::EngineConfig;
pub use db::{Database, MemoryStore, Store};
pub use exercises::{ExerciseDetail, ExerciseIdentity, ExerciseLabel, ExerciseType};
pub use session::{SessionEngine, SessionEvent, SessionState, SessionStateMachine};
