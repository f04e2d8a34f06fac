use std::sync::Arc;

use chrono::{Duration, Utc};

use setwise::achievements::STAR;
use setwise::catalog::StaticCatalog;
use setwise::coach::{Coach, SessionStart};
use setwise::config::EngineConfig;
use setwise::db::{Database, Store};
use setwise::exercises::{ExerciseLabel, ExerciseType, LabelDescriptor, MuscleGroup};
use setwise::ml::LabelsPredictor;

fn open(path: &std::path::Path) -> Coach<Database> {
    let db = Database::open(path.to_str().unwrap()).unwrap();
    Coach::new(db, Arc::new(StaticCatalog::default()), EngineConfig::default()).unwrap()
}

#[test]
fn test_sessions_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("setwise.db");
    let arms = ExerciseType::targeted([MuscleGroup::Arms]);
    let now = Utc::now();

    let plan_id = {
        let mut coach = open(&path);
        coach.start_session(SessionStart::AdHoc(arms.clone()), Some("gym"), now).unwrap();
        coach.begin_exercising(now).unwrap();
        coach.end_exercising(now + Duration::seconds(30)).unwrap();
        let confirmed = coach
            .confirm_exercise(vec![ExerciseLabel::Weight(15.0), ExerciseLabel::Repetitions(10)], now + Duration::seconds(35))
            .unwrap();
        let ended = coach.end_session(now + Duration::minutes(10)).unwrap();
        assert_eq!(ended.session.exercises, vec![confirmed]);
        ended.session.plan_id.unwrap()
    };

    let mut coach = open(&path);
    let history = coach.store().sessions(10).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].completed);

    // the stored predictor remembers the confirmed set
    let blob = coach.store().load_labels_predictor(&arms, Some("gym")).unwrap().unwrap();
    let labels = LabelsPredictor::decode(&blob, 64).unwrap();
    let identity = &history[0].exercises[0].identity;
    assert_eq!(labels.history_len(identity, LabelDescriptor::Weight), 1);

    let later = now + Duration::hours(2);
    coach.start_session(SessionStart::Template(plan_id.clone()), Some("gym"), later).unwrap();
    let second = coach.end_session(later + Duration::minutes(1)).unwrap();
    assert_eq!(second.achievement.unwrap().name, STAR);
    assert_eq!(coach.achievements_for(&plan_id).unwrap(), vec![STAR.to_string()]);
    assert_eq!(coach.suggested_templates(3), vec![plan_id]);
}

#[test]
fn test_corrupt_blobs_start_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("setwise.db");
    let arms = ExerciseType::targeted([MuscleGroup::Arms]);
    {
        let mut db = Database::open(path.to_str().unwrap()).unwrap();
        db.save_labels_predictor(&arms, None, b"not a predictor").unwrap();
        db.save_session_plan(b"{").unwrap();
    }

    let mut coach = open(&path);
    assert!(coach.suggested_templates(3).is_empty());
    coach.start_session(SessionStart::AdHoc(arms), None, Utc::now()).unwrap();
    let machine = coach.active().unwrap();
    let candidate = machine.state().exercise().cloned().unwrap();
    assert!(machine.engine().predict_labels(&candidate).predicted.is_empty());
}
