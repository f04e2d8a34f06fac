//! setwise - adaptive exercise session engine
//!
//! Command line front end: catalog listing, offline evaluation of reference
//! sessions, synthetic simulation and the stored history. Evaluations and
//! simulations train in memory unless `--save` writes them to the database.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use setwise::catalog::{ExerciseCatalog, StaticCatalog};
use setwise::coach::Coach;
use setwise::config::EngineConfig;
use setwise::db::{Database, MemoryStore, Store};
use setwise::evaluator::{Evaluation, LossBasis, ReferenceSession, SyntheticSessions};
use setwise::exercises::{ExerciseType, LabelDescriptor, MuscleGroup};

const DB_PATH: &str = "setwise.db";

#[derive(Parser)]
#[command(name = "setwise")]
#[command(author, version, about = "Adaptive exercise session engine")]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "SETWISE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database file
    #[arg(long, env = "SETWISE_DB", default_value = DB_PATH, global = true)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog exercises and their weight progressions
    Catalog {
        /// Session type, e.g. "resistanceTargeted:arms" or "indoorsCardio"
        exercise_type: Option<ExerciseType>,
    },

    /// Replay reference sessions in order and score the predictions
    Evaluate {
        /// Reference session files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Labels left out of the scores
        #[arg(short, long)]
        ignore: Vec<LabelDescriptor>,

        /// Unit of the label loss
        #[arg(short, long, value_enum, default_value_t = LossBasis::Raw)]
        basis: LossBasis,

        /// Location the sessions were recorded at
        #[arg(short, long)]
        location: Option<String>,

        /// Store the replayed sessions in the database
        #[arg(long)]
        save: bool,
    },

    /// Train on synthetic sessions and evaluate on the last one
    Simulate {
        /// Number of sessions to generate
        #[arg(short, long, default_value = "8")]
        sessions: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Session type to simulate
        #[arg(short = 't', long = "type")]
        exercise_type: Option<ExerciseType>,

        /// Store the simulated sessions in the database
        #[arg(long)]
        save: bool,
    },

    /// List stored sessions
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List awarded achievements
    Achievements,
}

fn print_catalog(catalog: &StaticCatalog, exercise_type: Option<&ExerciseType>) {
    let details = match exercise_type {
        Some(t) => catalog.exercise_details_for(t),
        None => catalog.all_details(),
    };
    println!("{:<48} | {:<12} | Weights", "Exercise", "Muscle");
    println!("{:-<80}", "");
    for d in details {
        let muscle = d.muscle.map(|m| format!("{:?}", m)).unwrap_or_else(|| "-".to_string());
        let weights = match d.weight_progression() {
            Some((min, step, Some(max))) => format!("{}..{} by {}", min, max, step),
            Some((min, step, None)) => format!("{}.. by {}", min, step),
            None => "-".to_string(),
        };
        println!("{:<48} | {:<12} | {}", d.identity, muscle, weights);
    }
}

/// Replays the references in order through a coach, persisting each session
fn replay<S: Store>(
    mut coach: Coach<S>,
    references: &[(DateTime<Utc>, ReferenceSession)],
    location: Option<&str>,
) -> Result<Vec<Evaluation>> {
    let mut evaluations = Vec::with_capacity(references.len());
    for (start, reference) in references {
        let (evaluation, ended) = coach.replay(reference, location, *start)?;
        if let Some(achievement) = ended.achievement {
            println!("Achievement: {} for {}", achievement.name, achievement.plan_name);
        }
        evaluations.push(evaluation);
    }
    Ok(evaluations)
}

/// Replays into the database when saving, otherwise into a throwaway store
fn replay_with(
    save: bool,
    db: &str,
    catalog: Arc<StaticCatalog>,
    config: EngineConfig,
    references: &[(DateTime<Utc>, ReferenceSession)],
    location: Option<&str>,
) -> Result<Vec<Evaluation>> {
    if save {
        info!("Saving replayed sessions to {}", db);
        replay(Coach::new(Database::open(db)?, catalog, config)?, references, location)
    } else {
        replay(Coach::new(MemoryStore::new(), catalog, config)?, references, location)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let catalog = Arc::new(StaticCatalog::default());

    match cli.command {
        Commands::Catalog { exercise_type } => {
            print_catalog(&catalog, exercise_type.as_ref());
        }

        Commands::Evaluate { files, ignore, basis, location, save } => {
            let start = Utc::now() - Duration::days(files.len() as i64);
            let references = files
                .iter()
                .enumerate()
                .map(|(i, path)| {
                    let reference = ReferenceSession::load(path, catalog.as_ref())
                        .with_context(|| format!("loading {}", path.display()))?;
                    Ok((start + Duration::days(i as i64), reference))
                })
                .collect::<Result<Vec<_>>>()?;

            let evaluations = replay_with(save, &cli.db, catalog, config, &references, location.as_deref())?;
            for evaluation in &evaluations {
                println!("{}", evaluation);
                println!(
                    "Labels ({:?}):      {:.3} accuracy, {:.3} loss",
                    basis,
                    evaluation.labels_accuracy(&ignore),
                    evaluation.labels_weighted_loss(basis, &ignore)
                );
                println!();
            }
        }

        Commands::Simulate { sessions, seed, exercise_type, save } => {
            let exercise_type = exercise_type.unwrap_or_else(|| ExerciseType::targeted([MuscleGroup::Arms]));
            let references =
                SyntheticSessions::new(seed).generate(catalog.as_ref(), &exercise_type, sessions.max(1), Utc::now());
            info!("Simulating {} sessions of {} (seed {})", references.len(), exercise_type, seed);

            let evaluations = replay_with(save, &cli.db, catalog, config, &references, None)?;
            if let Some(last) = evaluations.last() {
                println!("{}", last);
                println!("Trained on {} sessions", evaluations.len() - 1);
            }
        }

        Commands::History { limit } => {
            let db = Database::open(&cli.db)?;
            let sessions = db.sessions(limit)?;
            println!("Recent sessions:");
            println!("{:-<72}", "");
            for s in &sessions {
                println!(
                    "{} | {:28} | {:3} sets | {:>6.0}s | {}",
                    s.start.format("%Y-%m-%d %H:%M"),
                    s.plan_name.as_deref().unwrap_or("-"),
                    s.exercises.len(),
                    s.duration_secs(Utc::now()),
                    s.location.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Achievements => {
            let db = Database::open(&cli.db)?;
            for a in db.achievements(None)? {
                println!("{} | {:8} | {}", a.date.format("%Y-%m-%d"), a.name, a.plan_name);
            }
        }
    }

    Ok(())
}
