//! Database module - persistence of predictors, plans, sessions and achievements
//!
//! Predictor and plan blobs are opaque bytes here; their encoding belongs to
//! the `ml` module.

mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::achievements::Achievement;
use crate::exercises::ExerciseType;
use crate::ml::ExercisePlan;
use crate::session::Session;

pub use memory::MemoryStore;

/// Key of a labels predictor: session type at an optional location
pub fn predictor_key(exercise_type: &ExerciseType, location: Option<&str>) -> String {
    format!("{}@{}", exercise_type, location.unwrap_or_default())
}

/// Persistence used by the coach
pub trait Store {
    fn load_labels_predictor(&self, exercise_type: &ExerciseType, location: Option<&str>) -> Result<Option<Vec<u8>>>;

    fn save_labels_predictor(&mut self, exercise_type: &ExerciseType, location: Option<&str>, data: &[u8]) -> Result<()>;

    fn load_exercise_plan(&self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Most recently saved plan for the type and location
    fn latest_exercise_plan(&self, exercise_type: &ExerciseType, location: Option<&str>) -> Result<Option<Vec<u8>>>;

    fn save_exercise_plan(&mut self, plan: &ExercisePlan, location: Option<&str>) -> Result<()>;

    fn load_session_plan(&self) -> Result<Option<Vec<u8>>>;

    fn save_session_plan(&mut self, data: &[u8]) -> Result<()>;

    fn save_session(&mut self, session: &Session) -> Result<()>;

    /// Sessions, newest first
    fn sessions(&self, limit: usize) -> Result<Vec<Session>>;

    /// Closed sessions of the plan started at or after `since`
    fn fetch_similar_sessions(&self, plan_id: &str, since: DateTime<Utc>) -> Result<Vec<Session>>;

    /// Stores the achievement unless one with the same plan and name exists;
    /// returns whether it was inserted
    fn insert_achievement(&mut self, achievement: &Achievement) -> Result<bool>;

    /// Achievements, newest first; only the plan's when `plan_id` is given
    fn achievements(&self, plan_id: Option<&str>) -> Result<Vec<Achievement>>;
}

/// SQLite store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self { conn: Connection::open_in_memory()? };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS predictors (
                key TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                updated TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS exercise_plans (
                id TEXT PRIMARY KEY,
                exercise_type TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                data BLOB NOT NULL,
                updated TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS session_plan (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                start TEXT NOT NULL,
                end TEXT,
                plan_id TEXT,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS achievements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                plan_id TEXT NOT NULL,
                plan_name TEXT NOT NULL,
                date TEXT NOT NULL,
                UNIQUE (plan_id, name)
            );",
        )?;
        Ok(())
    }

    fn parse_sessions(rows: Vec<String>) -> Result<Vec<Session>> {
        rows.iter()
            .map(|json| Ok(serde_json::from_str(json)?))
            .collect()
    }
}

fn parse_date(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Store for Database {
    fn load_labels_predictor(&self, exercise_type: &ExerciseType, location: Option<&str>) -> Result<Option<Vec<u8>>> {
        let key = predictor_key(exercise_type, location);
        let data = self
            .conn
            .query_row("SELECT data FROM predictors WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        debug!("Loaded predictor {} ({})", key, if data.is_some() { "found" } else { "none" });
        Ok(data)
    }

    fn save_labels_predictor(&mut self, exercise_type: &ExerciseType, location: Option<&str>, data: &[u8]) -> Result<()> {
        let key = predictor_key(exercise_type, location);
        self.conn.execute(
            "INSERT INTO predictors (key, data, updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated = excluded.updated",
            params![key, data, Utc::now().to_rfc3339()],
        )?;
        debug!("Saved predictor {} ({} bytes)", key, data.len());
        Ok(())
    }

    fn load_exercise_plan(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row("SELECT data FROM exercise_plans WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?)
    }

    fn latest_exercise_plan(&self, exercise_type: &ExerciseType, location: Option<&str>) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT data FROM exercise_plans WHERE exercise_type = ?1 AND location = ?2
                 ORDER BY updated DESC LIMIT 1",
                params![exercise_type.to_string(), location.unwrap_or_default()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn save_exercise_plan(&mut self, plan: &ExercisePlan, location: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO exercise_plans (id, exercise_type, location, name, data, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 exercise_type = excluded.exercise_type, location = excluded.location,
                 name = excluded.name, data = excluded.data, updated = excluded.updated",
            params![
                plan.id,
                plan.exercise_type.to_string(),
                location.unwrap_or_default(),
                plan.name,
                plan.encode(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!("Saved plan {} ({})", plan.id, plan.name);
        Ok(())
    }

    fn load_session_plan(&self) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row("SELECT data FROM session_plan WHERE id = 1", [], |row| row.get(0))
            .optional()?)
    }

    fn save_session_plan(&mut self, data: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO session_plan (id, data) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            params![data],
        )?;
        Ok(())
    }

    fn save_session(&mut self, session: &Session) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, start, end, plan_id, data) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET end = excluded.end, data = excluded.data",
            params![
                session.id,
                session.start.to_rfc3339(),
                session.end.map(|e| e.to_rfc3339()),
                session.plan_id,
                serde_json::to_string(session)?,
            ],
        )?;
        debug!("Saved session {} ({} exercises)", session.id, session.exercises.len());
        Ok(())
    }

    fn sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM sessions ORDER BY start DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Self::parse_sessions(rows)
    }

    fn fetch_similar_sessions(&self, plan_id: &str, since: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM sessions WHERE plan_id = ?1 AND end IS NOT NULL AND start >= ?2
             ORDER BY start DESC",
        )?;
        let rows = stmt
            .query_map(params![plan_id, since.to_rfc3339()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Self::parse_sessions(rows)
    }

    fn insert_achievement(&mut self, achievement: &Achievement) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO achievements (name, plan_id, plan_name, date) VALUES (?1, ?2, ?3, ?4)",
            params![
                achievement.name,
                achievement.plan_id,
                achievement.plan_name,
                achievement.date.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn achievements(&self, plan_id: Option<&str>) -> Result<Vec<Achievement>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, plan_id, plan_name, date FROM achievements
             WHERE ?1 IS NULL OR plan_id = ?1 ORDER BY date DESC",
        )?;
        let achievements = stmt
            .query_map(params![plan_id], |row| {
                let date: String = row.get(3)?;
                Ok(Achievement {
                    name: row.get(0)?,
                    plan_id: row.get(1)?,
                    plan_name: row.get(2)?,
                    date: parse_date(&date),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(achievements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::MuscleGroup;

    fn arms() -> ExerciseType {
        ExerciseType::targeted([MuscleGroup::Arms])
    }

    #[test]
    fn test_predictor_blobs_by_location() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.load_labels_predictor(&arms(), None).unwrap().is_none());

        db.save_labels_predictor(&arms(), Some("gym"), b"one").unwrap();
        db.save_labels_predictor(&arms(), Some("gym"), b"two").unwrap();
        db.save_labels_predictor(&arms(), None, b"home").unwrap();

        assert_eq!(db.load_labels_predictor(&arms(), Some("gym")).unwrap().unwrap(), b"two");
        assert_eq!(db.load_labels_predictor(&arms(), None).unwrap().unwrap(), b"home");
    }

    #[test]
    fn test_plan_follows_its_latest_location() {
        let mut db = Database::open_in_memory().unwrap();
        let plan = ExercisePlan::ad_hoc(arms(), 8);
        db.save_exercise_plan(&plan, None).unwrap();
        db.save_exercise_plan(&plan, Some("gym")).unwrap();

        let data = db.latest_exercise_plan(&arms(), Some("gym")).unwrap().unwrap();
        assert_eq!(ExercisePlan::decode(&data, 8).unwrap().id, plan.id);
        assert!(db.latest_exercise_plan(&arms(), None).unwrap().is_none());
        assert!(db.load_exercise_plan(&plan.id).unwrap().is_some());
    }

    #[test]
    fn test_achievements_deduplicated() {
        let mut db = Database::open_in_memory().unwrap();
        let star = Achievement {
            name: "star".to_string(),
            plan_id: "p1".to_string(),
            plan_name: "Arms".to_string(),
            date: Utc::now(),
        };
        assert!(db.insert_achievement(&star).unwrap());
        assert!(!db.insert_achievement(&star).unwrap());
        assert_eq!(db.achievements(None).unwrap().len(), 1);
        assert_eq!(db.achievements(Some("p1")).unwrap().len(), 1);
        assert!(db.achievements(Some("p2")).unwrap().is_empty());
    }

    #[test]
    fn test_similar_sessions_only_closed() {
        let mut db = Database::open_in_memory().unwrap();
        let since = Utc::now() - chrono::Duration::days(1);
        let mut closed = Session::new(arms(), Utc::now());
        closed.plan_id = Some("p1".to_string());
        closed.end = Some(Utc::now());
        let mut open = Session::new(arms(), Utc::now());
        open.plan_id = Some("p1".to_string());
        db.save_session(&closed).unwrap();
        db.save_session(&open).unwrap();

        let similar = db.fetch_similar_sessions("p1", since).unwrap();
        assert_eq!(similar, vec![closed]);
        assert_eq!(db.sessions(10).unwrap().len(), 2);
    }
}
